//! Reconciliation of PodAutoscalers of the HPA class.
//!
//! [`reconcile_pod_autoscaler`] is a single pass over one PodAutoscaler which computes its new
//! status. [`reconcile`] and [`error_policy`] wrap it for [`kube::runtime::Controller::run`]:
//! they bound every pass by [`DEFAULT_TIMEOUT`] and write the status back if it changed.

use std::{sync::Arc, time::Duration};

use kube::{
    ResourceExt,
    core::DynamicObject,
    runtime::{controller::Action, reflector::ObjectRef},
};
use snafu::{ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::{
    client::{self, Client, ClusterState, RoutingShim},
    config::ConfigStore,
    crd::{
        pod_autoscaler::{HPA_CLASS, PodAutoscaler},
        scaled_object::ScaledObject,
    },
    logging::{ReconcilerError, error_chain},
    scaled_object,
};

#[cfg(test)]
mod fake;
mod pod_autoscaler;

pub use pod_autoscaler::{
    active_threshold, initial_scale, reconcile_pod_autoscaler, should_create_scaled_object,
};

/// Upper bound of a single reconciliation pass.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay before a failed PodAutoscaler is reconciled again.
pub const ERROR_REQUEUE_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, EnumDiscriminants, Snafu)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("PodAutoscaler has no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("failed to construct the desired ScaledObject"))]
    BuildScaledObject { source: scaled_object::Error },

    #[snafu(display("failed to get {so_ref}"))]
    GetScaledObject {
        source: client::Error,
        so_ref: ObjectRef<ScaledObject>,
    },

    #[snafu(display("failed to create {so_ref}"))]
    CreateScaledObject {
        source: client::Error,
        so_ref: ObjectRef<ScaledObject>,
    },

    #[snafu(display("PodAutoscaler does not own {so_ref}"))]
    ScaledObjectNotOwned { so_ref: ObjectRef<ScaledObject> },

    #[snafu(display("failed to update {so_ref}"))]
    UpdateScaledObject {
        source: client::Error,
        so_ref: ObjectRef<ScaledObject>,
    },

    #[snafu(display("failed to get HorizontalPodAutoscaler {name:?}"))]
    GetHorizontalPodAutoscaler { source: client::Error, name: String },

    #[snafu(display("failed to reconcile the ServerlessService"))]
    ReconcileServerlessService { source: client::Error },

    #[snafu(display("failed to update the PodAutoscaler status"))]
    UpdateStatus { source: client::Error },

    #[snafu(display("reconciliation did not finish within {timeout:?}"))]
    Timeout {
        source: tokio::time::error::Elapsed,
        timeout: Duration,
    },
}

impl Error {
    /// Whether the status computed by the failed pass must still be written.
    ///
    /// This holds for failures which are reflected in a status condition. Transient failures
    /// leave the last written status untouched.
    pub fn persists_status(&self) -> bool {
        match self {
            Self::BuildScaledObject { .. }
            | Self::CreateScaledObject { .. }
            | Self::ScaledObjectNotOwned { .. } => true,
            Self::ReconcileServerlessService { source } => {
                matches!(source, client::Error::NotOwned { .. })
            }
            Self::ObjectHasNoNamespace
            | Self::GetScaledObject { .. }
            | Self::UpdateScaledObject { .. }
            | Self::GetHorizontalPodAutoscaler { .. }
            | Self::UpdateStatus { .. }
            | Self::Timeout { .. } => false,
        }
    }
}

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }

    fn secondary_object(&self) -> Option<ObjectRef<DynamicObject>> {
        match self {
            Self::GetScaledObject { so_ref, .. }
            | Self::CreateScaledObject { so_ref, .. }
            | Self::ScaledObjectNotOwned { so_ref }
            | Self::UpdateScaledObject { so_ref, .. } => Some(so_ref.clone().erase()),
            _ => None,
        }
    }
}

/// Everything a reconciliation needs besides the PodAutoscaler itself.
pub struct Context<C = Client> {
    pub cluster: C,
    pub config: Arc<ConfigStore>,
}

/// Reconciles a single PodAutoscaler, meant to be passed to [`kube::runtime::Controller::run`].
///
/// PodAutoscalers of other classes are ignored.
#[tracing::instrument(
    skip_all,
    fields(pa.name = %pa.name_any(), pa.namespace = %pa.namespace().unwrap_or_default())
)]
pub async fn reconcile<C>(pa: Arc<PodAutoscaler>, ctx: Arc<Context<C>>) -> Result<Action, Error>
where
    C: ClusterState + RoutingShim,
{
    if pa.class() != HPA_CLASS {
        tracing::debug!(pa.class = pa.class(), "Ignoring PodAutoscaler of foreign class");
        return Ok(Action::await_change());
    }

    let config = ctx.config.load();
    let mut status = pa.status.clone().unwrap_or_default();
    status.observed_generation = pa.metadata.generation;

    let outcome = match tokio::time::timeout(
        DEFAULT_TIMEOUT,
        reconcile_pod_autoscaler(&pa, &mut status, &config, &ctx.cluster),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(elapsed) => Err(elapsed).context(TimeoutSnafu {
            timeout: DEFAULT_TIMEOUT,
        }),
    };

    let persist = outcome.as_ref().map_or_else(Error::persists_status, |_| true);
    if persist && pa.status.as_ref() != Some(&status) {
        tracing::debug!("Updating PodAutoscaler status");
        let updated = ctx
            .cluster
            .update_pod_autoscaler_status(&pa, &status)
            .await
            .context(UpdateStatusSnafu);

        match (&outcome, updated) {
            (Ok(()), Err(error)) => return Err(error),
            (Err(_), Err(error)) => tracing::warn!(
                error = %error_chain(&error),
                "Failed to persist the status of a failed reconciliation"
            ),
            (_, Ok(())) => {}
        }
    }

    outcome.map(|()| Action::await_change())
}

/// Requeues failed PodAutoscalers after [`ERROR_REQUEUE_DELAY`].
#[allow(clippy::needless_pass_by_value)]
pub fn error_policy<C>(pa: Arc<PodAutoscaler>, error: &Error, _ctx: Arc<Context<C>>) -> Action {
    tracing::debug!(
        pa.name = %pa.name_any(),
        error = error as &dyn std::error::Error,
        "Requeueing failed PodAutoscaler"
    );
    Action::requeue(ERROR_REQUEUE_DELAY)
}
