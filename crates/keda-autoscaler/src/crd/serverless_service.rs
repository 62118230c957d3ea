//! The Knative `ServerlessService` (`networking.internal.knative.dev/v1alpha1`), the routing shim
//! in front of a revision.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::status::condition::{Condition, ConditionStatus};

#[derive(Clone, CustomResource, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "networking.internal.knative.dev",
    version = "v1alpha1",
    kind = "ServerlessService",
    plural = "serverlessservices",
    shortname = "sks",
    status = "ServerlessServiceStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessServiceSpec {
    pub mode: ServerlessServiceMode,

    #[serde(rename = "objectRef")]
    pub object_ref: ObjectReference,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol_type: String,

    /// Number of activators to put in the data path, `0` means all of them.
    #[serde(default)]
    pub num_activators: i32,
}

/// Whether requests are routed straight to the revision or through the activator.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum ServerlessServiceMode {
    #[default]
    Serve,
    Proxy,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessServiceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition<String>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_service_name: String,
}

impl ServerlessService {
    /// Returns `true` once the status reflects the current generation and is `Ready`.
    pub fn is_ready(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };

        status.observed_generation == self.metadata.generation
            && status.conditions.iter().any(|condition| {
                condition.type_ == "Ready" && condition.status == ConditionStatus::True
            })
    }
}
