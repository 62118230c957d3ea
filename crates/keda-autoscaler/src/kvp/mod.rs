//! Annotations carrying per-revision autoscaling settings.
//!
//! The well-known keys live in [`keys`]. [`ScalerAnnotations`] collects the adapter
//! specific annotations of a PodAutoscaler and turns them into typed values.

use snafu::Snafu;

mod annotations;
pub mod keys;

pub use annotations::{
    Error as AnnotationError, PrometheusAuthentication, ScalerAnnotations,
    scaled_object_auto_create, scaled_object_override,
};

#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(display("invalid boolean {value:?}, expected one of 1, t, T, TRUE, true, True, 0, f, F, FALSE, false, False"))]
pub struct ParseBoolError {
    value: String,
}

/// Parses a boolean the way all other platform components do.
pub fn parse_bool(value: &str) -> Result<bool, ParseBoolError> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => ParseBoolSnafu { value }.fail(),
    }
}
