use std::{collections::BTreeMap, sync::Arc};

use arc_swap::ArcSwap;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use super::{
    AUTOSCALER_CONFIG_NAME, AUTOSCALER_KEDA_CONFIG_NAME, AutoscalerConfig, AutoscalerKedaConfig,
    ConfigSnapshot, Error,
};

/// Hands out the current [`ConfigSnapshot`].
///
/// Readers never block writers: [`Self::load`] returns an [`Arc`] to an immutable snapshot, which
/// stays valid for the whole reconciliation even if the configuration changes in between.
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: ArcSwap<ConfigSnapshot>,
}

impl ConfigStore {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn load(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Applies a changed ConfigMap.
    ///
    /// Returns `Ok(false)` for ConfigMaps which hold no configuration of interest. If the data is
    /// invalid, the previous configuration is kept and the error is returned.
    pub fn on_config_changed(&self, config_map: &ConfigMap) -> Result<bool, Error> {
        let empty = BTreeMap::new();
        let data = config_map.data.as_ref().unwrap_or(&empty);

        match config_map.name_any().as_str() {
            AUTOSCALER_CONFIG_NAME => {
                let autoscaler = AutoscalerConfig::from_data(data)?;
                self.current.rcu(|current| ConfigSnapshot {
                    autoscaler: autoscaler.clone(),
                    ..ConfigSnapshot::clone(current)
                });
            }
            AUTOSCALER_KEDA_CONFIG_NAME => {
                let autoscaler_keda = AutoscalerKedaConfig::from_data(data)?;
                self.current.rcu(|current| ConfigSnapshot {
                    autoscaler_keda: autoscaler_keda.clone(),
                    ..ConfigSnapshot::clone(current)
                });
            }
            _ => return Ok(false),
        }

        tracing::info!(
            config_map.name = %config_map.name_any(),
            "Updated autoscaler configuration"
        );
        Ok(true)
    }
}
