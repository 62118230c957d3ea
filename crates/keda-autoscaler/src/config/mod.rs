//! Cluster wide configuration, read from the `config-autoscaler` and `config-autoscaler-keda`
//! ConfigMaps.
//!
//! Both records are immutable once parsed. The reconciler receives them bundled as a
//! [`ConfigSnapshot`], which [`ConfigStore`] swaps out whenever one of the ConfigMaps changes.

use std::{collections::BTreeMap, fmt::Display, num::ParseIntError, str::FromStr};

use snafu::{OptionExt, ResultExt, Snafu, ensure};
use url::Url;

use crate::kvp::{self, ParseBoolError};

mod store;

pub use store::ConfigStore;

/// Name of the ConfigMap holding the platform wide autoscaler defaults.
pub const AUTOSCALER_CONFIG_NAME: &str = "config-autoscaler";

/// Name of the ConfigMap holding the KEDA adapter settings.
pub const AUTOSCALER_KEDA_CONFIG_NAME: &str = "config-autoscaler-keda";

pub const DEFAULT_PROMETHEUS_ADDRESS: &str = "http://prometheus-operated.default.svc:9090";

const INITIAL_SCALE_KEY: &str = "initial-scale";
const ALLOW_ZERO_INITIAL_SCALE_KEY: &str = "allow-zero-initial-scale";
const MIN_SCALE_KEY: &str = "min-scale";
const MAX_SCALE_KEY: &str = "max-scale";

const PROMETHEUS_ADDRESS_KEY: &str = "autoscaler.keda.prometheus-address";
const SCALED_OBJECT_AUTO_CREATE_KEY: &str = "autoscaler.keda.scaled-object-auto-create";

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse {key:?} value {value:?} as integer"))]
    ParseInteger {
        source: ParseIntError,
        key: &'static str,
        value: String,
    },

    #[snafu(display("failed to parse {key:?}"))]
    ParseBoolean {
        source: ParseBoolError,
        key: &'static str,
    },

    #[snafu(display("invalid {PROMETHEUS_ADDRESS_KEY:?}"))]
    InvalidPrometheusAddress { source: ServerAddressError },

    #[snafu(display("{key:?} must not be negative, got {value}"))]
    NegativeValue { key: &'static str, value: i32 },

    #[snafu(display(
        "{INITIAL_SCALE_KEY:?} of 0 requires {ALLOW_ZERO_INITIAL_SCALE_KEY:?} to be enabled"
    ))]
    ZeroInitialScaleNotAllowed,

    #[snafu(display("{MAX_SCALE_KEY:?} ({max}) must not be lower than {MIN_SCALE_KEY:?} ({min})"))]
    MaxScaleBelowMinScale { min: i32, max: i32 },
}

#[derive(Debug, PartialEq, Snafu)]
pub enum ServerAddressError {
    #[snafu(display("failed to parse {address:?} as URL"))]
    ParseUrl {
        source: url::ParseError,
        address: String,
    },

    #[snafu(display("URL {address:?} has no host"))]
    MissingHost { address: String },
}

/// An absolute URL with a non-empty host, pointing to a metrics backend.
///
/// The address is kept exactly as configured, because it ends up verbatim in the trigger
/// metadata. Normalizing it (e.g. by appending a trailing slash) would cause spurious updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerAddress(String);

impl ServerAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ServerAddress {
    type Err = ServerAddressError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(address).context(ParseUrlSnafu { address })?;
        url.host_str()
            .filter(|host| !host.is_empty())
            .context(MissingHostSnafu { address })?;

        Ok(Self(address.to_owned()))
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self(DEFAULT_PROMETHEUS_ADDRESS.to_owned())
    }
}

impl Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The subset of the platform autoscaler defaults this adapter consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoscalerConfig {
    /// Replicas a revision must reach before it is considered initialized.
    pub initial_scale: i32,

    /// Whether revisions may request an initial scale of `0`.
    pub allow_zero_initial_scale: bool,

    /// Default minimum scale of a revision.
    pub min_scale: i32,

    /// Default maximum scale of a revision, `0` means unbounded.
    pub max_scale: i32,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            initial_scale: 1,
            allow_zero_initial_scale: false,
            min_scale: 0,
            max_scale: 0,
        }
    }
}

impl AutoscalerConfig {
    /// Parses the `config-autoscaler` data. Missing keys keep their defaults.
    pub fn from_data(data: &BTreeMap<String, String>) -> Result<Self, Error> {
        let defaults = Self::default();
        let config = Self {
            initial_scale: parse_i32(data, INITIAL_SCALE_KEY)?.unwrap_or(defaults.initial_scale),
            allow_zero_initial_scale: parse_bool(data, ALLOW_ZERO_INITIAL_SCALE_KEY)?
                .unwrap_or(defaults.allow_zero_initial_scale),
            min_scale: parse_i32(data, MIN_SCALE_KEY)?.unwrap_or(defaults.min_scale),
            max_scale: parse_i32(data, MAX_SCALE_KEY)?.unwrap_or(defaults.max_scale),
        };
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        for (key, value) in [
            (INITIAL_SCALE_KEY, self.initial_scale),
            (MIN_SCALE_KEY, self.min_scale),
            (MAX_SCALE_KEY, self.max_scale),
        ] {
            ensure!(value >= 0, NegativeValueSnafu { key, value });
        }

        ensure!(
            self.initial_scale != 0 || self.allow_zero_initial_scale,
            ZeroInitialScaleNotAllowedSnafu
        );
        ensure!(
            self.max_scale == 0 || self.max_scale >= self.min_scale,
            MaxScaleBelowMinScaleSnafu {
                min: self.min_scale,
                max: self.max_scale
            }
        );

        Ok(())
    }
}

/// Settings specific to the KEDA adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoscalerKedaConfig {
    /// Prometheus server used by custom metric triggers, unless overridden per revision.
    pub prometheus_address: ServerAddress,

    /// Whether ScaledObjects are created, unless overridden per revision.
    pub should_create_scaled_object: bool,
}

impl Default for AutoscalerKedaConfig {
    fn default() -> Self {
        Self {
            prometheus_address: ServerAddress::default(),
            should_create_scaled_object: true,
        }
    }
}

impl AutoscalerKedaConfig {
    /// Parses the `config-autoscaler-keda` data. Missing keys keep their defaults.
    pub fn from_data(data: &BTreeMap<String, String>) -> Result<Self, Error> {
        let prometheus_address = match data.get(PROMETHEUS_ADDRESS_KEY) {
            Some(address) => address.parse().context(InvalidPrometheusAddressSnafu)?,
            None => ServerAddress::default(),
        };
        let should_create_scaled_object =
            parse_bool(data, SCALED_OBJECT_AUTO_CREATE_KEY)?.unwrap_or(true);

        Ok(Self {
            prometheus_address,
            should_create_scaled_object,
        })
    }
}

/// Both configuration records, as seen by a single reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub autoscaler: AutoscalerConfig,
    pub autoscaler_keda: AutoscalerKedaConfig,
}

fn parse_i32(data: &BTreeMap<String, String>, key: &'static str) -> Result<Option<i32>, Error> {
    data.get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .context(ParseIntegerSnafu { key, value })
        })
        .transpose()
}

fn parse_bool(data: &BTreeMap<String, String>, key: &'static str) -> Result<Option<bool>, Error> {
    data.get(key)
        .map(|value| kvp::parse_bool(value.trim()).context(ParseBooleanSnafu { key }))
        .transpose()
}
