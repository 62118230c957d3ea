//! Decision core of the KEDA autoscaling adapter for Knative.
//!
//! Given a [`PodAutoscaler`](crd::pod_autoscaler::PodAutoscaler) of the HPA class, this crate
//!
//! - derives the desired KEDA [`ScaledObject`](crd::scaled_object::ScaledObject) (see
//!   [`scaled_object::desired_scaled_object`]), and
//! - reconciles the PodAutoscaler status (readiness, activity, replica counts and scale target
//!   initialization) from the live `HorizontalPodAutoscaler` KEDA maintains (see
//!   [`reconciler::reconcile_pod_autoscaler`]).
//!
//! Watching resources, work queues and leader election are left to the embedding controller.
//! The [`reconciler::reconcile`] and [`reconciler::error_policy`] functions plug directly into
//! [`kube::runtime::Controller::run`].

pub mod client;
pub mod config;
pub mod controller_ref;
pub mod crd;
pub mod duration;
pub mod kvp;
pub mod logging;
pub mod quantity;
pub mod reconciler;
pub mod scaled_object;
pub mod status;

// External re-exports
pub use k8s_openapi;
pub use kube;
