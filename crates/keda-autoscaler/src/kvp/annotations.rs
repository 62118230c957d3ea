use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v2::HPAScalingRules;
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::{
    config::{ServerAddress, ServerAddressError},
    crd::scaled_object::{
        AuthenticationKind, AuthenticationRef, MetricTargetType, ScaleTrigger, ScaledObjectOverride,
        ScalingModifiers,
    },
    kvp::{keys, parse_bool},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse annotation {key:?} as JSON"))]
    ParseJson {
        source: serde_json::Error,
        key: &'static str,
    },

    #[snafu(display(
        "invalid metric type {value:?}, expected one of Utilization, AverageValue or Value"
    ))]
    InvalidMetricType {
        source: strum::ParseError,
        value: String,
    },

    #[snafu(display("invalid prometheus address"))]
    InvalidPrometheusAddress { source: ServerAddressError },

    #[snafu(display(
        "annotation {key:?} requires the authentication name to be set in {:?}",
        keys::PROMETHEUS_AUTH_NAME
    ))]
    MissingAuthName { key: &'static str },

    #[snafu(display(
        "invalid authentication kind {value:?}, expected TriggerAuthentication or ClusterTriggerAuthentication"
    ))]
    InvalidAuthKind {
        source: strum::ParseError,
        value: String,
    },

    #[snafu(display(
        "authentication {name:?} requires the authModes to be set in {:?}",
        keys::PROMETHEUS_AUTH_MODES
    ))]
    MissingAuthModes { name: String },
}

/// Credentials of the custom metric trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrometheusAuthentication {
    pub reference: AuthenticationRef,

    /// Passed to the Prometheus scaler as `authModes`, e.g. `bearer` or `basic`.
    pub modes: String,
}

/// The adapter specific annotations of a PodAutoscaler.
///
/// All values are optional, an absent annotation is [`None`] (or empty). The JSON annotations
/// are parsed by [`ScalerAnnotations::resolve`]. The Prometheus address, the metric type and the
/// authentication only matter for some metrics, so they are kept verbatim and validated by their
/// accessors once a trigger needs them.
///
/// The full override (see [`scaled_object_override`]) is not part of this record, as it
/// bypasses every other annotation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScalerAnnotations {
    pub prometheus_address: Option<String>,
    pub prometheus_query: Option<String>,
    pub metric_type: Option<String>,
    pub auth_name: Option<String>,
    pub auth_kind: Option<String>,
    pub auth_modes: Option<String>,
    pub trigger_name: Option<String>,
    pub extra_triggers: Vec<ScaleTrigger>,
    pub scaling_modifiers: Option<ScalingModifiers>,
    pub scale_up_rules: Option<HPAScalingRules>,
    pub scale_down_rules: Option<HPAScalingRules>,
}

impl ScalerAnnotations {
    pub fn resolve(annotations: &BTreeMap<String, String>) -> Result<Self, Error> {
        let get = |key: &str| annotations.get(key).cloned();

        Ok(Self {
            prometheus_address: get(keys::PROMETHEUS_ADDRESS),
            prometheus_query: get(keys::PROMETHEUS_QUERY),
            metric_type: get(keys::METRIC_TYPE),
            auth_name: get(keys::PROMETHEUS_AUTH_NAME),
            auth_kind: get(keys::PROMETHEUS_AUTH_KIND),
            auth_modes: get(keys::PROMETHEUS_AUTH_MODES),
            trigger_name: get(keys::PROMETHEUS_TRIGGER_NAME),
            extra_triggers: parse_json(annotations, keys::EXTRA_PROMETHEUS_TRIGGERS)?
                .unwrap_or_default(),
            scaling_modifiers: parse_json(annotations, keys::SCALING_MODIFIERS)?,
            scale_up_rules: parse_json(annotations, keys::HPA_SCALE_UP_RULES)?,
            scale_down_rules: parse_json(annotations, keys::HPA_SCALE_DOWN_RULES)?,
        })
    }

    /// The Prometheus server overriding the configured one, if any.
    pub fn server_address(&self) -> Result<Option<ServerAddress>, Error> {
        self.prometheus_address
            .as_deref()
            .map(|address| {
                address
                    .parse::<ServerAddress>()
                    .context(InvalidPrometheusAddressSnafu)
            })
            .transpose()
    }

    /// The requested metric target type, if any.
    pub fn target_metric_type(&self) -> Result<Option<MetricTargetType>, Error> {
        self.metric_type
            .as_deref()
            .map(|value| {
                value
                    .parse::<MetricTargetType>()
                    .context(InvalidMetricTypeSnafu { value })
            })
            .transpose()
    }

    /// The credentials of the custom metric trigger, if any.
    ///
    /// The kind and the modes both require a name, and a name requires the modes.
    pub fn authentication(&self) -> Result<Option<PrometheusAuthentication>, Error> {
        let Some(name) = &self.auth_name else {
            ensure!(
                self.auth_kind.is_none(),
                MissingAuthNameSnafu {
                    key: keys::PROMETHEUS_AUTH_KIND
                }
            );
            ensure!(
                self.auth_modes.is_none(),
                MissingAuthNameSnafu {
                    key: keys::PROMETHEUS_AUTH_MODES
                }
            );
            return Ok(None);
        };

        let kind = self
            .auth_kind
            .as_deref()
            .map(|value| {
                value
                    .parse::<AuthenticationKind>()
                    .context(InvalidAuthKindSnafu { value })
            })
            .transpose()?;
        let modes = self
            .auth_modes
            .clone()
            .context(MissingAuthModesSnafu { name })?;

        Ok(Some(PrometheusAuthentication {
            reference: AuthenticationRef {
                name: name.clone(),
                kind,
            },
            modes,
        }))
    }
}

fn parse_json<T>(
    annotations: &BTreeMap<String, String>,
    key: &'static str,
) -> Result<Option<T>, Error>
where
    T: serde::de::DeserializeOwned,
{
    annotations
        .get(key)
        .map(|value| serde_json::from_str(value).context(ParseJsonSnafu { key }))
        .transpose()
}

/// Parses the full `ScaledObject` override, if present.
pub fn scaled_object_override(
    annotations: &BTreeMap<String, String>,
) -> Result<Option<ScaledObjectOverride>, Error> {
    parse_json(annotations, keys::SCALED_OBJECT_OVERRIDE)
}

/// The per revision auto-create setting, if present and valid.
///
/// Invalid values are logged and ignored.
pub fn scaled_object_auto_create(annotations: &BTreeMap<String, String>) -> Option<bool> {
    let value = annotations.get(keys::SCALED_OBJECT_AUTO_CREATE)?;

    match parse_bool(value) {
        Ok(create) => Some(create),
        Err(error) => {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                annotation = keys::SCALED_OBJECT_AUTO_CREATE,
                "Ignoring invalid annotation"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::autoscaling::v2::HPAScalingPolicy;
    use rstest::rstest;

    use super::*;
    use crate::crd::scaled_object::TriggerType;

    fn annotations(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn nothing_set() {
        assert_eq!(
            ScalerAnnotations::resolve(&annotations(&[("foo", "bar")])).expect("valid"),
            ScalerAnnotations::default()
        );
    }

    #[test]
    fn resolves_everything() {
        let resolved = ScalerAnnotations::resolve(&annotations(&[
            (keys::PROMETHEUS_ADDRESS, "http://prometheus:9090"),
            (keys::PROMETHEUS_QUERY, "sum(rate(http_requests_total{}[1m]))"),
            (keys::METRIC_TYPE, "Value"),
            (keys::PROMETHEUS_AUTH_NAME, "keda-prom-creds"),
            (keys::PROMETHEUS_AUTH_KIND, "ClusterTriggerAuthentication"),
            (keys::PROMETHEUS_AUTH_MODES, "bearer"),
            (keys::PROMETHEUS_TRIGGER_NAME, "requests"),
            (
                keys::EXTRA_PROMETHEUS_TRIGGERS,
                r#"[{"type": "prometheus", "name": "extra", "metadata": {"threshold": "3"}}]"#,
            ),
            (keys::SCALING_MODIFIERS, r#"{"formula": "a + b", "target": "5"}"#),
            (
                keys::HPA_SCALE_UP_RULES,
                r#"{"policies": [{"type": "Pods", "value": 4, "periodSeconds": 15}]}"#,
            ),
        ]))
        .expect("valid annotations");

        assert_eq!(
            resolved
                .server_address()
                .expect("valid address")
                .as_ref()
                .map(ServerAddress::as_str),
            Some("http://prometheus:9090")
        );
        assert_eq!(
            resolved.target_metric_type().expect("valid metric type"),
            Some(MetricTargetType::Value)
        );
        assert_eq!(
            resolved.authentication().expect("valid authentication"),
            Some(PrometheusAuthentication {
                reference: AuthenticationRef {
                    name: "keda-prom-creds".to_owned(),
                    kind: Some(AuthenticationKind::ClusterTriggerAuthentication),
                },
                modes: "bearer".to_owned(),
            })
        );
        assert_eq!(resolved.trigger_name.as_deref(), Some("requests"));
        assert_eq!(resolved.extra_triggers.len(), 1);
        assert_eq!(resolved.extra_triggers[0].type_, TriggerType::Prometheus);
        assert_eq!(
            resolved.scaling_modifiers.map(|modifiers| modifiers.formula),
            Some("a + b".to_owned())
        );
        assert_eq!(
            resolved.scale_up_rules.and_then(|rules| rules.policies),
            Some(vec![HPAScalingPolicy {
                type_: "Pods".to_owned(),
                value: 4,
                period_seconds: 15,
            }])
        );
        assert_eq!(resolved.scale_down_rules, None);
    }

    #[rstest]
    #[case::broken_extra_triggers(&[(keys::EXTRA_PROMETHEUS_TRIGGERS, "[{")])]
    #[case::broken_scaling_modifiers(&[(keys::SCALING_MODIFIERS, "formula")])]
    #[case::broken_scale_down_rules(&[(keys::HPA_SCALE_DOWN_RULES, "{\"policies\": 1}")])]
    fn rejects_broken_json(#[case] entries: &[(&str, &str)]) {
        assert!(ScalerAnnotations::resolve(&annotations(entries)).is_err());
    }

    #[test]
    fn trigger_settings_are_checked_on_access() {
        let resolved = ScalerAnnotations::resolve(&annotations(&[
            (keys::PROMETHEUS_ADDRESS, "prometheus:9090"),
            (keys::METRIC_TYPE, "average"),
            (keys::PROMETHEUS_AUTH_NAME, "creds"),
        ]))
        .expect("only JSON annotations are parsed upfront");

        assert!(matches!(
            resolved.server_address(),
            Err(Error::InvalidPrometheusAddress { .. })
        ));
        assert!(matches!(
            resolved.target_metric_type(),
            Err(Error::InvalidMetricType { .. })
        ));
        assert!(matches!(
            resolved.authentication(),
            Err(Error::MissingAuthModes { .. })
        ));
    }

    #[rstest]
    #[case::kind_without_name(&[(keys::PROMETHEUS_AUTH_KIND, "TriggerAuthentication")])]
    #[case::modes_without_name(&[(keys::PROMETHEUS_AUTH_MODES, "bearer")])]
    #[case::name_without_modes(&[(keys::PROMETHEUS_AUTH_NAME, "creds")])]
    #[case::unknown_kind(&[
        (keys::PROMETHEUS_AUTH_NAME, "creds"),
        (keys::PROMETHEUS_AUTH_KIND, "SecretAuthentication"),
        (keys::PROMETHEUS_AUTH_MODES, "bearer"),
    ])]
    fn rejects_authentication(#[case] entries: &[(&str, &str)]) {
        let resolved = ScalerAnnotations::resolve(&annotations(entries)).expect("valid JSON");
        assert!(resolved.authentication().is_err());
    }

    #[test]
    fn authentication_without_kind() {
        let resolved = ScalerAnnotations::resolve(&annotations(&[
            (keys::PROMETHEUS_AUTH_NAME, "creds"),
            (keys::PROMETHEUS_AUTH_MODES, "basic"),
        ]))
        .expect("valid annotations");

        let authentication = resolved
            .authentication()
            .expect("valid authentication")
            .expect("authentication is set");
        assert_eq!(authentication.reference.kind, None);
        assert_eq!(authentication.modes, "basic");
    }

    #[rstest]
    #[case::absent(&[], None)]
    #[case::enabled(&[(keys::SCALED_OBJECT_AUTO_CREATE, "true")], Some(true))]
    #[case::disabled(&[(keys::SCALED_OBJECT_AUTO_CREATE, "0")], Some(false))]
    #[case::invalid(&[(keys::SCALED_OBJECT_AUTO_CREATE, "maybe")], None)]
    fn auto_create(#[case] entries: &[(&str, &str)], #[case] expected: Option<bool>) {
        assert_eq!(scaled_object_auto_create(&annotations(entries)), expected);
    }

    #[test]
    fn override_is_parsed_as_a_whole() {
        let parsed = scaled_object_override(&annotations(&[(
            keys::SCALED_OBJECT_OVERRIDE,
            r#"{"spec": {"triggers": [{"type": "kafka", "metadata": {"topic": "orders"}}]}}"#,
        )]))
        .expect("valid override")
        .expect("override is set");

        assert_eq!(
            parsed.spec.triggers[0].type_,
            TriggerType::Other("kafka".to_owned())
        );
        assert!(
            scaled_object_override(&annotations(&[(keys::SCALED_OBJECT_OVERRIDE, "{")])).is_err()
        );
    }
}
