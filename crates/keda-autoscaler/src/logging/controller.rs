//! Reporting of controller outcomes, see [`report_controller_reconciled`].

use std::error::Error;

use kube::{
    Resource,
    core::DynamicObject,
    runtime::{
        controller::{self, Action},
        events::Recorder,
        reflector::ObjectRef,
    },
};

use super::k8s_events::publish_controller_error_as_k8s_event;

/// [`Error`] extensions needed to report reconciliation errors.
pub trait ReconcilerError: Error {
    /// `PascalCase`d name of the error category, used as event reason.
    ///
    /// Usually implemented by delegating to [`strum::EnumDiscriminants`] and
    /// [`strum::IntoStaticStr`].
    fn category(&self) -> &'static str;

    /// The related object the error happened on (for example the ScaledObject of a
    /// PodAutoscaler), if any.
    fn secondary_object(&self) -> Option<ObjectRef<DynamicObject>> {
        None
    }
}

/// Reports the result of a single reconciliation.
///
/// Successes and failures are logged, failures of the reconciler are additionally published as
/// `Warning` events on the reconciled object, so that users find them with `kubectl describe`.
pub async fn report_controller_reconciled<K, ReconcileErr, QueueErr>(
    recorder: &Recorder,
    controller_name: &str,
    result: &Result<(ObjectRef<K>, Action), controller::Error<ReconcileErr, QueueErr>>,
) where
    K: Resource,
    ReconcileErr: ReconcilerError + 'static,
    QueueErr: Error + 'static,
{
    match result {
        Ok((object, _)) => {
            tracing::info!(
                controller.name = controller_name,
                object = %object,
                "Reconciled object"
            );
        }
        Err(error) => {
            tracing::error!(
                controller.name = controller_name,
                error = error as &dyn Error,
                "Failed to reconcile object",
            );
            publish_controller_error_as_k8s_event(recorder, error).await;
        }
    }
}
