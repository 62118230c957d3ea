//! Access to the Kubernetes API.
//!
//! The reconciler only talks to the cluster through the [`ClusterState`] and [`RoutingShim`]
//! traits. [`Client`] implements both on top of a [`kube::Client`].

use std::fmt::Debug;

use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::{
    Api, Resource, ResourceExt,
    api::{Patch, PatchParams, PostParams},
    core::NamespaceResourceScope,
};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::crd::{
    pod_autoscaler::{PodAutoscaler, PodAutoscalerStatus},
    scaled_object::ScaledObject,
};

mod cluster_state;
mod routing;

pub use cluster_state::{ClusterState, RoutingShim};
pub use routing::desired_serverless_service;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to get {kind} {name:?}"))]
    GetResource {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to create {kind} {name:?}"))]
    CreateResource {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to update {kind} {name:?}"))]
    ReplaceResource {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to patch the status of {kind} {name:?}"))]
    PatchStatus {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("{kind} {name:?} has no namespace"))]
    ObjectHasNoNamespace { kind: String, name: String },

    #[snafu(display("there is an existing {kind} {name:?} that is not controlled by the PodAutoscaler"))]
    NotOwned { kind: String, name: String },

    #[snafu(display("PodAutoscaler {name:?} is missing the metadata to be referenced as owner"))]
    ObjectMissingMetadataForOwnerRef { name: String },
}

/// A [`kube::Client`] which identifies itself with a field manager on every write.
#[derive(Clone)]
pub struct Client {
    client: kube::Client,
    post_params: PostParams,
    patch_params: PatchParams,
}

impl Client {
    pub fn new(client: kube::Client, field_manager: Option<String>) -> Self {
        Self {
            client,
            post_params: PostParams {
                field_manager: field_manager.clone(),
                ..PostParams::default()
            },
            patch_params: PatchParams {
                field_manager,
                ..PatchParams::default()
            },
        }
    }

    /// Returns a [`kube::Client`] that can be freely used.
    ///
    /// It does not carry the field manager.
    pub fn as_kube_client(&self) -> kube::Client {
        self.client.clone()
    }

    fn namespaced_api<T>(&self, namespace: &str) -> Api<T>
    where
        T: Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Returns the named resource, or [`None`] if it doesn't exist.
    pub async fn get_opt<T>(&self, name: &str, namespace: &str) -> Result<Option<T>, Error>
    where
        T: Clone + Debug + DeserializeOwned + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        self.namespaced_api(namespace)
            .get_opt(name)
            .await
            .with_context(|_| GetResourceSnafu {
                kind: kind_of::<T>(),
                name,
            })
    }

    pub async fn create<T>(&self, resource: &T) -> Result<T, Error>
    where
        T: Clone + Debug + DeserializeOwned + Serialize + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        self.namespaced_api(&namespace_of(resource)?)
            .create(&self.post_params, resource)
            .await
            .with_context(|_| CreateResourceSnafu {
                kind: kind_of::<T>(),
                name: resource.name_any(),
            })
    }

    /// Replaces the resource, which needs to carry the `resourceVersion` it was read with.
    pub async fn replace<T>(&self, resource: &T) -> Result<T, Error>
    where
        T: Clone + Debug + DeserializeOwned + Serialize + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        let name = resource.name_any();
        self.namespaced_api(&namespace_of(resource)?)
            .replace(&name, &self.post_params, resource)
            .await
            .with_context(|_| ReplaceResourceSnafu {
                kind: kind_of::<T>(),
                name: name.clone(),
            })
    }

    /// Merges `status` into the status subresource of `resource`.
    pub async fn merge_patch_status<T, S>(&self, resource: &T, status: &S) -> Result<T, Error>
    where
        T: Clone + Debug + DeserializeOwned + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
        S: Debug + Serialize,
    {
        let name = resource.name_any();
        let patch = serde_json::json!({ "status": status });

        self.namespaced_api::<T>(&namespace_of(resource)?)
            .patch_status(&name, &self.patch_params, &Patch::Merge(patch))
            .await
            .with_context(|_| PatchStatusSnafu {
                kind: kind_of::<T>(),
                name: name.clone(),
            })
    }
}

#[async_trait::async_trait]
impl ClusterState for Client {
    async fn get_scaled_object(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ScaledObject>, Error> {
        self.get_opt(name, namespace).await
    }

    async fn create_scaled_object(&self, scaled_object: &ScaledObject) -> Result<ScaledObject, Error> {
        self.create(scaled_object).await
    }

    async fn update_scaled_object(&self, scaled_object: &ScaledObject) -> Result<ScaledObject, Error> {
        self.replace(scaled_object).await
    }

    async fn get_horizontal_pod_autoscaler(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<HorizontalPodAutoscaler>, Error> {
        self.get_opt(name, namespace).await
    }

    async fn update_pod_autoscaler_status(
        &self,
        pod_autoscaler: &PodAutoscaler,
        status: &PodAutoscalerStatus,
    ) -> Result<(), Error> {
        self.merge_patch_status(pod_autoscaler, status)
            .await
            .map(|_| ())
    }
}

fn kind_of<T>() -> String
where
    T: Resource,
    <T as Resource>::DynamicType: Default,
{
    T::kind(&<T as Resource>::DynamicType::default()).into_owned()
}

fn namespace_of<T>(resource: &T) -> Result<String, Error>
where
    T: Resource,
    <T as Resource>::DynamicType: Default,
{
    resource
        .namespace()
        .with_context(|| ObjectHasNoNamespaceSnafu {
            kind: kind_of::<T>(),
            name: resource.name_any(),
        })
}
