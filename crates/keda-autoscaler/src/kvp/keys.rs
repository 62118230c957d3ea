use const_format::concatcp;

/// The group every autoscaling annotation is scoped under.
pub const GROUP_NAME: &str = "autoscaling.knative.dev";

const PREFIX: &str = concatcp!(GROUP_NAME, "/");

/// Selects the autoscaler implementation, e.g. `hpa.autoscaling.knative.dev`.
pub const CLASS: &str = concatcp!(PREFIX, "class");

/// The metric to scale on: `cpu`, `memory` or the name of a custom metric.
pub const METRIC: &str = concatcp!(PREFIX, "metric");

/// The target value of the metric.
pub const TARGET: &str = concatcp!(PREFIX, "target");

pub const MIN_SCALE: &str = concatcp!(PREFIX, "min-scale");
pub const MAX_SCALE: &str = concatcp!(PREFIX, "max-scale");
pub const INITIAL_SCALE: &str = concatcp!(PREFIX, "initial-scale");

/// Older camel case spellings, read only when the key above is absent.
pub const MIN_SCALE_LEGACY: &str = concatcp!(PREFIX, "minScale");
pub const MAX_SCALE_LEGACY: &str = concatcp!(PREFIX, "maxScale");
pub const INITIAL_SCALE_LEGACY: &str = concatcp!(PREFIX, "initialScale");

/// The stabilization window as a duration string, e.g. `60s` or `1m30s`.
pub const WINDOW: &str = concatcp!(PREFIX, "window");

/// Per-PodAutoscaler override of `autoscaler.keda.scaled-object-auto-create`.
pub const SCALED_OBJECT_AUTO_CREATE: &str = concatcp!(PREFIX, "scaled-object-auto-create");

/// Prometheus server queried by the custom metric trigger.
pub const PROMETHEUS_ADDRESS: &str = concatcp!(PREFIX, "prometheus-address");

/// Query template of the custom metric trigger. `{{ revisionName }}` expands to the revision.
pub const PROMETHEUS_QUERY: &str = concatcp!(PREFIX, "prometheus-query");

/// One of `Utilization`, `AverageValue` or `Value`.
pub const METRIC_TYPE: &str = concatcp!(PREFIX, "metric-type");

pub const PROMETHEUS_AUTH_NAME: &str = concatcp!(PREFIX, "trigger-prometheus-auth-name");
pub const PROMETHEUS_AUTH_KIND: &str = concatcp!(PREFIX, "trigger-prometheus-auth-kind");
pub const PROMETHEUS_AUTH_MODES: &str = concatcp!(PREFIX, "trigger-prometheus-auth-modes");

/// Name of the custom metric trigger, `default-trigger-custom` if not set.
pub const PROMETHEUS_TRIGGER_NAME: &str = concatcp!(PREFIX, "trigger-prometheus-name");

/// JSON array of triggers appended to the generated one.
pub const EXTRA_PROMETHEUS_TRIGGERS: &str = concatcp!(PREFIX, "extra-prometheus-triggers");

/// JSON object with `formula`, `target`, `activationTarget` and `metricType`.
pub const SCALING_MODIFIERS: &str = concatcp!(PREFIX, "scaling-modifiers");

pub const HPA_SCALE_UP_RULES: &str = concatcp!(PREFIX, "hpa-scale-up-rules");
pub const HPA_SCALE_DOWN_RULES: &str = concatcp!(PREFIX, "hpa-scale-down-rules");

/// A complete JSON `ScaledObject`, replacing everything derived from the other annotations.
pub const SCALED_OBJECT_OVERRIDE: &str = concatcp!(PREFIX, "scaled-object-override");
