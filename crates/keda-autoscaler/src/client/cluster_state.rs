use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;

use super::Error;
use crate::crd::{
    pod_autoscaler::{PodAutoscaler, PodAutoscalerStatus},
    scaled_object::ScaledObject,
    serverless_service::{ServerlessService, ServerlessServiceMode},
};

/// The reads and writes the reconciler performs against the cluster.
///
/// Lookups return `Ok(None)` if the object doesn't exist, every other failure is an error.
#[async_trait]
pub trait ClusterState: Send + Sync {
    async fn get_scaled_object(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ScaledObject>, Error>;

    async fn create_scaled_object(&self, scaled_object: &ScaledObject) -> Result<ScaledObject, Error>;

    /// Replaces an existing ScaledObject, as previously returned by
    /// [`Self::get_scaled_object`] with an updated spec.
    async fn update_scaled_object(&self, scaled_object: &ScaledObject) -> Result<ScaledObject, Error>;

    async fn get_horizontal_pod_autoscaler(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<HorizontalPodAutoscaler>, Error>;

    async fn update_pod_autoscaler_status(
        &self,
        pod_autoscaler: &PodAutoscaler,
        status: &PodAutoscalerStatus,
    ) -> Result<(), Error>;
}

/// Makes sure the ServerlessService of a PodAutoscaler exists in the requested mode.
#[async_trait]
pub trait RoutingShim: Send + Sync {
    /// Returns the ServerlessService after reconciling it, including its current status.
    ///
    /// Fails with [`Error::NotOwned`] if a ServerlessService of the same name exists which is not
    /// controlled by the PodAutoscaler.
    async fn reconcile_sks(
        &self,
        pod_autoscaler: &PodAutoscaler,
        mode: ServerlessServiceMode,
        num_activators: i32,
    ) -> Result<ServerlessService, Error>;
}
