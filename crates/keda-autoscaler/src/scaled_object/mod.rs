//! Derives the desired KEDA [`ScaledObject`] of a PodAutoscaler.
//!
//! [`desired_scaled_object`] is a pure function of the PodAutoscaler and the configuration. The
//! metric (`cpu`, `memory` or a custom Prometheus metric) selects the generated trigger, further
//! annotations (see [`crate::kvp::keys`]) add triggers, authentication, scaling modifiers and HPA
//! behavior. A full override annotation bypasses all of this.

use std::collections::BTreeMap;

use kube::{Resource, ResourceExt, api::ObjectMeta};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::{
    config::ConfigSnapshot,
    crd::{
        pod_autoscaler::{CPU_METRIC, MEMORY_METRIC, PodAutoscaler},
        scaled_object::{
            AdvancedConfig, DEFAULT_CPU_TRIGGER_NAME, DEFAULT_CUSTOM_TRIGGER_NAME,
            DEFAULT_MEMORY_TRIGGER_NAME, MetricTargetType, ScaleTarget, ScaleTrigger, ScaledObject,
            ScaledObjectSpec, TriggerType,
        },
    },
    kvp::{self, AnnotationError, ScalerAnnotations, keys},
    quantity,
};

mod template;

pub use template::{Error as TemplateError, render_query};

/// Target utilization (in percent) of the `cpu` metric, unless configured otherwise.
pub const DEFAULT_CPU_TARGET: f64 = 70.0;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid autoscaling annotations"))]
    InvalidAnnotations { source: AnnotationError },

    #[snafu(display("metric type {metric_type} is not supported for the {metric} metric"))]
    UnsupportedMetricType {
        metric_type: MetricTargetType,
        metric: &'static str,
    },

    #[snafu(display(
        "the custom metric {metric:?} requires a query in the {:?} annotation",
        keys::PROMETHEUS_QUERY
    ))]
    MissingQuery { metric: String },

    #[snafu(display("failed to build the prometheus query"))]
    BuildQuery { source: TemplateError },

    #[snafu(display(
        "no triggers were specified, make sure a metric target is specified or extra triggers are added"
    ))]
    NoTriggers,

    #[snafu(display("PodAutoscaler {name:?} is missing the metadata to be referenced as owner"))]
    ObjectMissingMetadataForOwnerRef { name: String },
}

/// The metric a PodAutoscaler scales on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind<'a> {
    Cpu,
    Memory,

    /// Any other metric, which is read from Prometheus.
    Custom(&'a str),
}

impl<'a> From<&'a str> for MetricKind<'a> {
    fn from(metric: &'a str) -> Self {
        match metric {
            CPU_METRIC => Self::Cpu,
            MEMORY_METRIC => Self::Memory,
            custom => Self::Custom(custom),
        }
    }
}

impl MetricKind<'_> {
    /// Resolves the metric type of the generated trigger.
    ///
    /// Resource metrics can't be compared by `Value` and default to `Utilization` (cpu) or
    /// `AverageValue` (memory). Custom metrics accept every type and default to `AverageValue`.
    pub fn metric_type(
        self,
        requested: Option<MetricTargetType>,
    ) -> Result<MetricTargetType, Error> {
        let resource_metric = match self {
            Self::Cpu => Some(CPU_METRIC),
            Self::Memory => Some(MEMORY_METRIC),
            Self::Custom(_) => None,
        };

        match (requested, resource_metric) {
            (Some(MetricTargetType::Value), Some(metric)) => UnsupportedMetricTypeSnafu {
                metric_type: MetricTargetType::Value,
                metric,
            }
            .fail(),
            (Some(requested), _) => Ok(requested),
            (None, _) if self == Self::Cpu => Ok(MetricTargetType::Utilization),
            (None, _) => Ok(MetricTargetType::AverageValue),
        }
    }
}

/// Returns the ScaledObject the PodAutoscaler asks for.
///
/// The ScaledObject is named after the PodAutoscaler, controlled by it and inherits its labels
/// and annotations. The HPA KEDA creates for it is named after the PodAutoscaler as well.
pub fn desired_scaled_object(
    pa: &PodAutoscaler,
    config: &ConfigSnapshot,
) -> Result<ScaledObject, Error> {
    let (min_scale, max_scale) = pa.scale_bounds(&config.autoscaler);
    let max_scale = if max_scale == 0 { i32::MAX } else { max_scale };

    if let Some(so_override) =
        kvp::scaled_object_override(pa.annotations()).context(InvalidAnnotationsSnafu)?
    {
        tracing::debug!(pa.name = %pa.name_any(), "Using ScaledObject override");
        return with_identity(so_override.metadata, so_override.spec, pa, max_scale);
    }

    let annotations =
        ScalerAnnotations::resolve(pa.annotations()).context(InvalidAnnotationsSnafu)?;
    let mut spec = ScaledObjectSpec::default();
    let mut advanced = AdvancedConfig::default();

    if let Some(scaling_modifiers) = annotations.scaling_modifiers.clone() {
        advanced.scaling_modifiers = scaling_modifiers;
    }

    if min_scale > 0 {
        spec.min_replica_count = Some(min_scale);
    }

    if let Some(target) = resolve_target(pa) {
        let metric = MetricKind::from(pa.metric());
        let requested = annotations
            .target_metric_type()
            .context(InvalidAnnotationsSnafu)?;
        let metric_type = metric.metric_type(requested)?;

        let trigger = match metric {
            MetricKind::Cpu => ScaleTrigger {
                type_: TriggerType::Cpu,
                name: DEFAULT_CPU_TRIGGER_NAME.to_owned(),
                metadata: BTreeMap::from([(
                    "value".to_owned(),
                    (target.ceil() as i32).to_string(),
                )]),
                metric_type: Some(metric_type),
                ..ScaleTrigger::default()
            },
            MetricKind::Memory => ScaleTrigger {
                type_: TriggerType::Memory,
                name: DEFAULT_MEMORY_TRIGGER_NAME.to_owned(),
                metadata: BTreeMap::from([(
                    "value".to_owned(),
                    quantity::mebibytes(target as i64).0,
                )]),
                metric_type: Some(metric_type),
                ..ScaleTrigger::default()
            },
            MetricKind::Custom(name) => {
                prometheus_trigger(pa, config, &annotations, name, target, metric_type)?
            }
        };

        // Resource metrics are sampled from running pods, so they can't scale from zero.
        if matches!(metric, MetricKind::Cpu | MetricKind::Memory) && min_scale <= 0 {
            spec.min_replica_count = Some(1);
        }
        spec.triggers.push(trigger);
    }

    spec.triggers.extend(annotations.extra_triggers);
    ensure!(!spec.triggers.is_empty(), NoTriggersSnafu);

    if let Some(window) = pa.window() {
        advanced.set_stabilization_window(i32::try_from(window.as_secs()).unwrap_or(i32::MAX));
    }
    if let Some(rules) = annotations.scale_up_rules {
        advanced.behavior_mut().scale_up = Some(rules);
    }
    if let Some(rules) = annotations.scale_down_rules {
        advanced.behavior_mut().scale_down = Some(rules);
    }
    spec.advanced = Some(advanced);

    with_identity(ObjectMeta::default(), spec, pa, max_scale)
}

/// Returns `true` if both specs are equal once serialized.
///
/// Comparing the serialized form ignores the difference between absent and empty fields, as
/// well as all fields this crate doesn't model.
pub fn spec_matches(desired: &ScaledObjectSpec, live: &ScaledObjectSpec) -> bool {
    match (serde_json::to_value(desired), serde_json::to_value(live)) {
        (Ok(desired), Ok(live)) => desired == live,
        _ => false,
    }
}

fn resolve_target(pa: &PodAutoscaler) -> Option<f64> {
    pa.target()
        .or_else(|| (pa.metric() == CPU_METRIC).then_some(DEFAULT_CPU_TARGET))
}

fn prometheus_trigger(
    pa: &PodAutoscaler,
    config: &ConfigSnapshot,
    annotations: &ScalerAnnotations,
    metric: &str,
    target: f64,
    metric_type: MetricTargetType,
) -> Result<ScaleTrigger, Error> {
    let query = annotations
        .prometheus_query
        .as_deref()
        .context(MissingQuerySnafu { metric })?;
    let query = render_query(query, &pa.name_any()).context(BuildQuerySnafu)?;

    let server_address = annotations
        .server_address()
        .context(InvalidAnnotationsSnafu)?
        .unwrap_or_else(|| config.autoscaler_keda.prometheus_address.clone());
    let authentication = annotations
        .authentication()
        .context(InvalidAnnotationsSnafu)?;

    let mut metadata = BTreeMap::from([
        ("serverAddress".to_owned(), server_address.to_string()),
        ("query".to_owned(), query),
        ("threshold".to_owned(), quantity::decimal_si(target as i64)),
        ("namespace".to_owned(), pa.namespace().unwrap_or_default()),
    ]);
    if let Some(authentication) = &authentication {
        metadata.insert("authModes".to_owned(), authentication.modes.clone());
    }

    Ok(ScaleTrigger {
        type_: TriggerType::Prometheus,
        name: annotations
            .trigger_name
            .clone()
            .unwrap_or_else(|| DEFAULT_CUSTOM_TRIGGER_NAME.to_owned()),
        metadata,
        authentication_ref: authentication.map(|authentication| authentication.reference),
        metric_type: Some(metric_type),
        ..ScaleTrigger::default()
    })
}

/// Applies the fields the PodAutoscaler always dictates, no matter where the spec came from.
fn with_identity(
    metadata: ObjectMeta,
    mut spec: ScaledObjectSpec,
    pa: &PodAutoscaler,
    max_scale: i32,
) -> Result<ScaledObject, Error> {
    let owner_reference = pa
        .controller_owner_ref(&())
        .context(ObjectMissingMetadataForOwnerRefSnafu {
            name: pa.name_any(),
        })?;

    let scale_target = spec.scale_target_ref.get_or_insert_with(ScaleTarget::default);
    let pa_target = &pa.spec.scale_target_ref;
    scale_target.name = pa_target.name.clone().unwrap_or_default();
    scale_target.kind = pa_target.kind.clone().unwrap_or_default();
    scale_target.api_version = pa_target.api_version.clone().unwrap_or_default();

    spec.advanced
        .get_or_insert_with(AdvancedConfig::default)
        .hpa_config
        .get_or_insert_with(Default::default)
        .name = pa.name_any();
    spec.max_replica_count = Some(max_scale);

    Ok(ScaledObject {
        metadata: ObjectMeta {
            name: pa.meta().name.clone(),
            namespace: pa.meta().namespace.clone(),
            owner_references: Some(vec![owner_reference]),
            annotations: pa.meta().annotations.clone(),
            labels: pa.meta().labels.clone(),
            ..metadata
        },
        spec,
        status: None,
    })
}
