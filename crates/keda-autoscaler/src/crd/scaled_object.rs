//! The KEDA `ScaledObject` (`keda.sh/v1alpha1`).
//!
//! Field names and `omitempty` semantics follow the upstream KEDA API types, so that a spec written by
//! this crate serializes to exactly what KEDA itself would write back. String fields which are
//! optional upstream are plain [`String`]s that are skipped when empty.

use std::{borrow::Cow, collections::BTreeMap};

use k8s_openapi::{
    api::autoscaling::v2::{HPAScalingRules, HorizontalPodAutoscalerBehavior},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::CustomResource;
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Name of the trigger generated for the `cpu` metric.
pub const DEFAULT_CPU_TRIGGER_NAME: &str = "default-trigger-cpu";

/// Name of the trigger generated for the `memory` metric.
pub const DEFAULT_MEMORY_TRIGGER_NAME: &str = "default-trigger-memory";

/// Name of the trigger generated for custom (Prometheus) metrics, unless overridden.
pub const DEFAULT_CUSTOM_TRIGGER_NAME: &str = "default-trigger-custom";

#[derive(Clone, CustomResource, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "keda.sh",
    version = "v1alpha1",
    kind = "ScaledObject",
    plural = "scaledobjects",
    shortname = "so",
    status = "ScaledObjectStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_target_ref: Option<ScaleTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_cooldown_period: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_period: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_replica_count: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replica_count: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replica_count: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced: Option<AdvancedConfig>,

    #[serde(default)]
    pub triggers: Vec<ScaleTrigger>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Fallback>,

    /// Fields of newer KEDA releases that are not modelled here, passed through untouched.
    #[serde(flatten)]
    #[schemars(skip)]
    pub unknown_fields: BTreeMap<String, serde_json::Value>,
}

/// The workload KEDA scales.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTarget {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub env_source_container_name: String,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedConfig {
    #[serde(
        default,
        rename = "horizontalPodAutoscalerConfig",
        skip_serializing_if = "Option::is_none"
    )]
    pub hpa_config: Option<HorizontalPodAutoscalerConfig>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub restore_to_original_replica_count: bool,

    #[serde(default, skip_serializing_if = "ScalingModifiers::is_empty")]
    pub scaling_modifiers: ScalingModifiers,
}

impl AdvancedConfig {
    /// Returns the HPA behavior, creating the intermediate blocks if needed.
    pub fn behavior_mut(&mut self) -> &mut HorizontalPodAutoscalerBehavior {
        self.hpa_config
            .get_or_insert_with(HorizontalPodAutoscalerConfig::default)
            .behavior
            .get_or_insert_with(HorizontalPodAutoscalerBehavior::default)
    }

    /// Sets the same stabilization window on both scaling directions.
    pub fn set_stabilization_window(&mut self, window_seconds: i32) {
        let rules = HPAScalingRules {
            stabilization_window_seconds: Some(window_seconds),
            ..HPAScalingRules::default()
        };

        let behavior = self.behavior_mut();
        behavior.scale_up = Some(rules.clone());
        behavior.scale_down = Some(rules);
    }
}

/// Configures the `HorizontalPodAutoscaler` KEDA manages on behalf of the `ScaledObject`.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscalerConfig {
    /// Name of the generated HPA. KEDA falls back to `keda-hpa-{name}` when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<HorizontalPodAutoscalerBehavior>,
}

/// Combines the metrics of all triggers into a single composite metric.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingModifiers {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub formula: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub activation_target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<MetricTargetType>,
}

impl ScalingModifiers {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// One metric source of a [`ScaledObject`].
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTrigger {
    #[serde(rename = "type")]
    pub type_: TriggerType,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub use_cached_metrics: bool,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_ref: Option<AuthenticationRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<MetricTargetType>,
}

/// The scaler backing a [`ScaleTrigger`].
///
/// Triggers generated by this crate are always one of the named variants. Triggers passed in
/// verbatim (extra triggers or full overrides) may use any scaler KEDA knows about, which are kept
/// as [`TriggerType::Other`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    #[default]
    Cpu,
    Memory,
    Prometheus,
    Other(String),
}

impl From<String> for TriggerType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "cpu" => Self::Cpu,
            "memory" => Self::Memory,
            "prometheus" => Self::Prometheus,
            _ => Self::Other(value),
        }
    }
}

impl JsonSchema for TriggerType {
    fn schema_name() -> Cow<'static, str> {
        "TriggerType".into()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

impl From<TriggerType> for String {
    fn from(value: TriggerType) -> Self {
        match value {
            TriggerType::Cpu => "cpu".to_owned(),
            TriggerType::Memory => "memory".to_owned(),
            TriggerType::Prometheus => "prometheus".to_owned(),
            TriggerType::Other(other) => other,
        }
    }
}

/// How the trigger value is compared against the target.
#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumString,
    Eq,
    Hash,
    JsonSchema,
    PartialEq,
    Serialize,
)]
pub enum MetricTargetType {
    Utilization,
    AverageValue,
    Value,
}

/// Points a trigger to a (Cluster)TriggerAuthentication holding its credentials.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AuthenticationKind>,
}

#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumString,
    Eq,
    Hash,
    JsonSchema,
    PartialEq,
    Serialize,
)]
pub enum AuthenticationKind {
    TriggerAuthentication,
    ClusterTriggerAuthentication,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fallback {
    pub failure_threshold: i32,
    pub replicas: i32,

    /// One of `static`, `currentReplicas`, `currentReplicasIfHigher` or `currentReplicasIfLower`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub behavior: String,
}

/// The parts of the status KEDA writes that are of interest to this crate.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hpa_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_replica_count: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_replica_count: Option<i32>,
}

/// A complete `ScaledObject` document as supplied by the override annotation.
///
/// Unlike [`ScaledObject`] this accepts documents without `apiVersion`, `kind` or `metadata`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ScaledObjectOverride {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: ScaledObjectSpec,
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn trigger_type_round_trips_unknown_scalers() {
        let trigger: ScaleTrigger = serde_yaml::from_str(indoc! {"
            type: kafka
            metadata:
              topic: orders
        "})
        .expect("valid trigger");

        assert_eq!(trigger.type_, TriggerType::Other("kafka".to_owned()));
        assert_eq!(
            serde_json::to_value(&trigger).expect("serializable")["type"],
            "kafka"
        );
    }

    #[test]
    fn empty_fields_are_omitted() {
        let spec = ScaledObjectSpec {
            advanced: Some(AdvancedConfig::default()),
            triggers: vec![ScaleTrigger {
                type_: TriggerType::Cpu,
                metric_type: Some(MetricTargetType::Utilization),
                ..ScaleTrigger::default()
            }],
            ..ScaledObjectSpec::default()
        };

        assert_eq!(
            serde_json::to_value(&spec).expect("serializable"),
            serde_json::json!({
                "advanced": {},
                "triggers": [{"type": "cpu", "metadata": {}, "metricType": "Utilization"}],
            })
        );
    }

    #[test]
    fn stabilization_window_applies_to_both_directions() {
        let mut advanced = AdvancedConfig::default();
        advanced.set_stabilization_window(30);

        let behavior = advanced
            .hpa_config
            .and_then(|config| config.behavior)
            .expect("behavior is set");

        for rules in [behavior.scale_up, behavior.scale_down] {
            assert_eq!(rules.and_then(|r| r.stabilization_window_seconds), Some(30));
        }
    }

    #[test]
    fn fallback_behavior() {
        let fallback: Fallback = serde_json::from_str(
            r#"{"failureThreshold": 3, "replicas": 6, "behavior": "currentReplicasIfHigher"}"#,
        )
        .expect("valid fallback");

        assert_eq!(fallback.behavior, "currentReplicasIfHigher");
        assert_eq!(
            serde_json::to_value(&fallback).expect("serializable"),
            serde_json::json!({
                "failureThreshold": 3,
                "replicas": 6,
                "behavior": "currentReplicasIfHigher",
            })
        );

        let fallback = Fallback {
            failure_threshold: 3,
            replicas: 6,
            ..Fallback::default()
        };
        assert_eq!(
            serde_json::to_value(&fallback).expect("serializable"),
            serde_json::json!({"failureThreshold": 3, "replicas": 6})
        );
    }

    #[test]
    fn scale_target_without_name() {
        let so: ScaledObjectOverride =
            serde_json::from_str(r#"{"spec": {"scaleTargetRef": {}}}"#).expect("valid override");

        assert_eq!(so.spec.scale_target_ref, Some(ScaleTarget::default()));
    }

    #[test]
    fn unknown_spec_fields_are_kept() {
        let so: ScaledObjectOverride = serde_json::from_str(
            r#"{"spec": {"maxReplicaCount": 3, "futureInterval": 30, "newFeature": {"enabled": true}}}"#,
        )
        .expect("valid override");

        assert_eq!(so.spec.max_replica_count, Some(3));
        assert_eq!(
            serde_json::to_value(&so.spec).expect("serializable"),
            serde_json::json!({
                "maxReplicaCount": 3,
                "futureInterval": 30,
                "newFeature": {"enabled": true},
                "triggers": [],
            })
        );
    }

    #[test]
    fn override_without_metadata() {
        let so: ScaledObjectOverride = serde_json::from_str(
            r#"{"spec": {"maxReplicaCount": 3, "triggers": [{"type": "cpu", "metadata": {"value": "60"}}]}}"#,
        )
        .expect("valid override");

        assert_eq!(so.metadata, ObjectMeta::default());
        assert_eq!(so.spec.max_replica_count, Some(3));
        assert_eq!(so.spec.triggers[0].type_, TriggerType::Cpu);
    }
}
