//! The Knative `PodAutoscaler` (`autoscaling.internal.knative.dev/v1alpha1`).
//!
//! Most of the autoscaling intent is carried in annotations rather than in the spec. The
//! accessors on [`PodAutoscaler`] resolve these annotations the same way the rest of the platform
//! does, so that all components agree on the effective metric, target and bounds.

use std::time::Duration;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{config::AutoscalerConfig, duration, kvp::keys, status::condition::Condition};

/// Class of PodAutoscalers handled by this adapter.
pub const HPA_CLASS: &str = "hpa.autoscaling.knative.dev";

/// Class the platform assumes when no class annotation is present.
pub const KPA_CLASS: &str = "kpa.autoscaling.knative.dev";

pub const CPU_METRIC: &str = "cpu";
pub const MEMORY_METRIC: &str = "memory";
pub const CONCURRENCY_METRIC: &str = "concurrency";

#[derive(Clone, CustomResource, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "autoscaling.internal.knative.dev",
    version = "v1alpha1",
    kind = "PodAutoscaler",
    plural = "podautoscalers",
    shortname = "kpa",
    shortname = "pa",
    status = "PodAutoscalerStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PodAutoscalerSpec {
    /// Maximum number of requests a single replica processes at once. `0` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_concurrency: Option<i64>,

    /// The workload (usually a Deployment) to scale.
    pub scale_target_ref: ObjectReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachability: Option<Reachability>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol_type: String,
}

/// Whether the revision behind the PodAutoscaler is routable.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum Reachability {
    Reachable,
    Unreachable,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodAutoscalerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Name of the public service of the revision.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,

    /// Name of the service scraped for metrics.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metrics_service_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_scale: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_scale: Option<i32>,
}

impl PodAutoscaler {
    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations().get(key).map(String::as_str)
    }

    /// The first of `candidates` that is present wins, even if its value does not parse.
    fn annotation_i32(&self, candidates: &[&str]) -> Option<i32> {
        candidates
            .iter()
            .find_map(|key| self.annotation(key))
            .and_then(|value| value.parse().ok())
    }

    pub fn class(&self) -> &str {
        self.annotation(keys::CLASS).unwrap_or(KPA_CLASS)
    }

    /// The metric to scale on, defaulting per autoscaler class.
    pub fn metric(&self) -> &str {
        match self.annotation(keys::METRIC) {
            Some(metric) => metric,
            None if self.class() == HPA_CLASS => CPU_METRIC,
            None => CONCURRENCY_METRIC,
        }
    }

    /// The explicitly configured target value of [`Self::metric`], if any.
    pub fn target(&self) -> Option<f64> {
        self.annotation(keys::TARGET)
            .and_then(|value| value.parse().ok())
    }

    /// The stabilization window, if configured.
    pub fn window(&self) -> Option<Duration> {
        self.annotation(keys::WINDOW)
            .and_then(|value| duration::parse_duration(value).ok())
    }

    /// The per-revision initial scale, if configured.
    pub fn initial_scale(&self) -> Option<i32> {
        self.annotation_i32(&[keys::INITIAL_SCALE, keys::INITIAL_SCALE_LEGACY])
    }

    /// Resolves the effective `(min, max)` scale of this PodAutoscaler.
    ///
    /// Annotations take precedence over the cluster wide defaults. Unreachable revisions are
    /// allowed to scale to zero regardless of any configured minimum. A `max` of `0` means
    /// unbounded.
    pub fn scale_bounds(&self, config: &AutoscalerConfig) -> (i32, i32) {
        let min = if self.spec.reachability == Some(Reachability::Unreachable) {
            0
        } else {
            self.annotation_i32(&[keys::MIN_SCALE, keys::MIN_SCALE_LEGACY])
                .unwrap_or(config.min_scale)
        };
        let max = self
            .annotation_i32(&[keys::MAX_SCALE, keys::MAX_SCALE_LEGACY])
            .unwrap_or(config.max_scale);

        (min, max)
    }
}
