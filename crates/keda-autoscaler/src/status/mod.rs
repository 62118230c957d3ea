//! Status handling of PodAutoscalers.
//!
//! The [`condition`] module provides the generic condition machinery, [`PodAutoscalerStatus`]
//! gets the domain specific transitions (`mark_*`) on top of it.
//!
//! [`PodAutoscalerStatus`]: crate::crd::pod_autoscaler::PodAutoscalerStatus

pub mod condition;
mod pod_autoscaler;

pub use pod_autoscaler::{
    FAILED_CREATE_REASON, INVALID_SCALED_OBJECT_REASON, NOT_OWNED_REASON, SKS_NOT_READY_REASON,
};
