use kube::{Resource, ResourceExt, runtime::reflector::ObjectRef};
use snafu::{OptionExt, ResultExt};

use super::{
    BuildScaledObjectSnafu, CreateScaledObjectSnafu, Error, GetHorizontalPodAutoscalerSnafu,
    GetScaledObjectSnafu, ObjectHasNoNamespaceSnafu, ReconcileServerlessServiceSnafu,
    ScaledObjectNotOwnedSnafu, UpdateScaledObjectSnafu,
};
use crate::{
    client::{self, ClusterState, RoutingShim},
    config::{AutoscalerConfig, ConfigSnapshot},
    controller_ref::is_controlled_by,
    crd::{
        pod_autoscaler::{PodAutoscaler, PodAutoscalerStatus},
        scaled_object::ScaledObject,
        serverless_service::ServerlessServiceMode,
    },
    kvp::scaled_object_auto_create,
    logging::error_chain,
    scaled_object::{desired_scaled_object, spec_matches},
    status::INVALID_SCALED_OBJECT_REASON,
};

/// Put all activators in the data path.
const ALL_ACTIVATORS: i32 = 0;

/// Whether the ScaledObject of `pa` is managed by this adapter.
///
/// The per-PodAutoscaler annotation wins over the configured default.
pub fn should_create_scaled_object(pa: &PodAutoscaler, config: &ConfigSnapshot) -> bool {
    scaled_object_auto_create(pa.annotations())
        .unwrap_or(config.autoscaler_keda.should_create_scaled_object)
}

/// The scale a new revision has to reach before it counts as initialized.
///
/// The revision's own initial scale is used unless it is absent, or `0` without zero initial
/// scale being allowed.
pub fn initial_scale(pa: &PodAutoscaler, config: &AutoscalerConfig) -> i32 {
    match pa.initial_scale() {
        Some(scale) if scale != 0 || config.allow_zero_initial_scale => scale,
        _ => config.initial_scale,
    }
}

/// The number of current replicas at which the scale target is considered initialized.
pub fn active_threshold(
    pa: &PodAutoscaler,
    status: &PodAutoscalerStatus,
    config: &AutoscalerConfig,
) -> i32 {
    let (min_scale, _) = pa.scale_bounds(config);

    if status.is_scale_target_initialized() {
        min_scale.max(1)
    } else {
        min_scale.max(initial_scale(pa, config))
    }
}

/// Runs a single reconciliation pass, recording the outcome in `status`.
///
/// Creates or updates the ScaledObject (unless disabled), then derives the status from the
/// HorizontalPodAutoscaler KEDA maintains for it and from the ServerlessService. A missing or not
/// yet scaled up HorizontalPodAutoscaler ends the pass early, without error. Every mutation is
/// preceded by a fresh read, so passes can be retried at any point.
pub async fn reconcile_pod_autoscaler<C>(
    pa: &PodAutoscaler,
    status: &mut PodAutoscalerStatus,
    config: &ConfigSnapshot,
    cluster: &C,
) -> Result<(), Error>
where
    C: ClusterState + RoutingShim + ?Sized,
{
    let namespace = pa.namespace().context(ObjectHasNoNamespaceSnafu)?;
    let name = pa.name_any();
    status.initialize_conditions();

    let scaled_object = if should_create_scaled_object(pa, config) {
        Some(reconcile_scaled_object(pa, status, config, cluster, &namespace).await?)
    } else {
        None
    };

    let Some(hpa) = cluster
        .get_horizontal_pod_autoscaler(&namespace, &name)
        .await
        .with_context(|_| GetHorizontalPodAutoscalerSnafu { name: &name })?
    else {
        tracing::info!(hpa.name = %name, "Skipping HorizontalPodAutoscaler which does not exist yet");
        return Ok(());
    };
    let hpa_status = hpa.status.unwrap_or_default();
    let current_replicas = hpa_status.current_replicas.unwrap_or_default();

    if let Some(min_replicas) = scaled_object
        .and_then(|scaled_object| scaled_object.spec.min_replica_count)
        .filter(|&min_replicas| hpa_status.desired_replicas < min_replicas)
    {
        tracing::debug!(
            hpa.desired_replicas = hpa_status.desired_replicas,
            min_replicas,
            "Waiting for the HorizontalPodAutoscaler to reach the minimum replicas"
        );
        return Ok(());
    }

    let sks = match cluster
        .reconcile_sks(pa, ServerlessServiceMode::Serve, ALL_ACTIVATORS)
        .await
    {
        Ok(sks) => sks,
        Err(error) => {
            if let client::Error::NotOwned { kind, name } = &error {
                status.mark_resource_not_owned(kind, name);
            }
            return Err(error).context(ReconcileServerlessServiceSnafu);
        }
    };

    // Propagated regardless of the readiness
    let sks_status = sks.status.clone().unwrap_or_default();
    status.metrics_service_name = sks_status.private_service_name;
    status.service_name = sks_status.service_name;

    if sks.is_ready() {
        status.mark_sks_ready();

        // Only counts once the scale target reached the minimum or initial scale
        if !status.is_scale_target_initialized()
            && current_replicas >= active_threshold(pa, status, &config.autoscaler)
        {
            status.mark_scale_target_initialized();
        }
    } else {
        status.mark_sks_not_ready("SKS Services are not ready yet");
    }

    status.mark_active();
    status.desired_scale = Some(hpa_status.desired_replicas);
    status.actual_scale = Some(current_replicas);

    Ok(())
}

/// Makes sure the desired ScaledObject exists and returns it as stored in the cluster.
async fn reconcile_scaled_object<C>(
    pa: &PodAutoscaler,
    status: &mut PodAutoscalerStatus,
    config: &ConfigSnapshot,
    cluster: &C,
    namespace: &str,
) -> Result<ScaledObject, Error>
where
    C: ClusterState + ?Sized,
{
    let desired = match desired_scaled_object(pa, config) {
        Ok(desired) => desired,
        Err(error) => {
            status.mark_inactive(INVALID_SCALED_OBJECT_REASON, error_chain(&error));
            return Err(error).context(BuildScaledObjectSnafu);
        }
    };
    let name = desired.name_any();
    let so_ref = ObjectRef::from_obj(&desired);

    let live = cluster
        .get_scaled_object(namespace, &name)
        .await
        .with_context(|_| GetScaledObjectSnafu {
            so_ref: so_ref.clone(),
        })?;

    match live {
        None => {
            tracing::info!(scaled_object.name = %name, "Creating ScaledObject");
            match cluster.create_scaled_object(&desired).await {
                Ok(created) => Ok(created),
                Err(error) => {
                    status.mark_resource_failed_creation(&ScaledObject::kind(&()), &name);
                    Err(error).context(CreateScaledObjectSnafu { so_ref })
                }
            }
        }
        Some(live) if !is_controlled_by(&live, pa) => {
            status.mark_resource_not_owned(&ScaledObject::kind(&()), &name);
            ScaledObjectNotOwnedSnafu { so_ref }.fail()
        }
        Some(live) if spec_matches(&desired.spec, &live.spec) => Ok(live),
        Some(mut live) => {
            tracing::info!(scaled_object.name = %name, "Updating ScaledObject");
            live.spec = desired.spec;
            cluster
                .update_scaled_object(&live)
                .await
                .context(UpdateScaledObjectSnafu { so_ref })
        }
    }
}
