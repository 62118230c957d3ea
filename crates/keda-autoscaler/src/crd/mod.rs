//! Resource types this crate reads and writes.
//!
//! None of the CustomResourceDefinitions are owned by this crate, the structs below only mirror
//! the parts of the upstream schemas that the adapter needs.

pub mod pod_autoscaler;
pub mod scaled_object;
pub mod serverless_service;
