//! Helpers around controller owner references.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

/// Returns the owner reference marked as controller, if any.
pub fn get_controller_of<T: Resource>(resource: &T) -> Option<&OwnerReference> {
    resource
        .meta()
        .owner_references
        .iter()
        .flatten()
        .find(|owner| owner.controller == Some(true))
}

/// Returns `true` if the controller of `resource` has the given `uid`.
pub fn is_resource_owned_by<T: Resource>(resource: &T, owner_uid: &str) -> bool {
    get_controller_of(resource).is_some_and(|controller| controller.uid == owner_uid)
}

/// Returns `true` if `owner` is the controller of `resource`.
///
/// An owner without a `uid` (i.e. one which was never persisted) controls nothing.
pub fn is_controlled_by<T: Resource, O: Resource>(resource: &T, owner: &O) -> bool {
    owner
        .meta()
        .uid
        .as_deref()
        .is_some_and(|owner_uid| is_resource_owned_by(resource, owner_uid))
}
