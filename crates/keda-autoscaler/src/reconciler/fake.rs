//! An in-memory cluster for reconciler tests.

use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use k8s_openapi::api::{
    autoscaling::v2::{HorizontalPodAutoscaler, HorizontalPodAutoscalerStatus},
    core::v1::ObjectReference,
};
use kube::ResourceExt;

use crate::{
    client::{self, ClusterState, RoutingShim, desired_serverless_service},
    crd::{
        pod_autoscaler::{HPA_CLASS, PodAutoscaler, PodAutoscalerSpec, PodAutoscalerStatus},
        scaled_object::ScaledObject,
        serverless_service::{ServerlessService, ServerlessServiceMode, ServerlessServiceStatus},
    },
    kvp::keys,
    status::condition::{Condition, ConditionStatus},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    CreateScaledObject(ScaledObject),
    UpdateScaledObject(ScaledObject),
    UpdateStatus(PodAutoscalerStatus),
    ReconcileSks(ServerlessServiceMode, i32),
}

/// In-memory cluster recording every call that writes.
///
/// The `fail_*` switches make the respective call fail as if the API server were unreachable.
/// Failing writes are still recorded.
#[derive(Default)]
pub struct FakeCluster {
    pub scaled_object: Mutex<Option<ScaledObject>>,
    pub hpa: Option<HorizontalPodAutoscaler>,
    pub sks_ready: bool,
    pub sks_not_owned: bool,
    pub fail_get: bool,
    pub fail_create: bool,
    pub fail_update: bool,
    pub fail_hpa: bool,
    pub fail_status: bool,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeCluster {
    pub fn with_hpa(desired_replicas: i32, current_replicas: i32) -> Self {
        Self {
            hpa: Some(HorizontalPodAutoscaler {
                status: Some(HorizontalPodAutoscalerStatus {
                    desired_replicas,
                    current_replicas: Some(current_replicas),
                    ..HorizontalPodAutoscalerStatus::default()
                }),
                ..HorizontalPodAutoscaler::default()
            }),
            sks_ready: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock is not poisoned").clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("lock is not poisoned").push(call);
    }
}

fn unavailable() -> kube::Error {
    kube::Error::Service("connection refused".into())
}

#[async_trait]
impl ClusterState for FakeCluster {
    async fn get_scaled_object(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<ScaledObject>, client::Error> {
        if self.fail_get {
            return Err(client::Error::GetResource {
                source: unavailable(),
                kind: "ScaledObject".to_owned(),
                name: name.to_owned(),
            });
        }

        Ok(self.scaled_object.lock().expect("lock is not poisoned").clone())
    }

    async fn create_scaled_object(
        &self,
        scaled_object: &ScaledObject,
    ) -> Result<ScaledObject, client::Error> {
        self.record(Call::CreateScaledObject(scaled_object.clone()));
        if self.fail_create {
            return Err(client::Error::CreateResource {
                source: unavailable(),
                kind: "ScaledObject".to_owned(),
                name: scaled_object.name_any(),
            });
        }

        *self.scaled_object.lock().expect("lock is not poisoned") = Some(scaled_object.clone());
        Ok(scaled_object.clone())
    }

    async fn update_scaled_object(
        &self,
        scaled_object: &ScaledObject,
    ) -> Result<ScaledObject, client::Error> {
        self.record(Call::UpdateScaledObject(scaled_object.clone()));
        if self.fail_update {
            return Err(client::Error::ReplaceResource {
                source: unavailable(),
                kind: "ScaledObject".to_owned(),
                name: scaled_object.name_any(),
            });
        }

        *self.scaled_object.lock().expect("lock is not poisoned") = Some(scaled_object.clone());
        Ok(scaled_object.clone())
    }

    async fn get_horizontal_pod_autoscaler(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<HorizontalPodAutoscaler>, client::Error> {
        if self.fail_hpa {
            return Err(client::Error::GetResource {
                source: unavailable(),
                kind: "HorizontalPodAutoscaler".to_owned(),
                name: name.to_owned(),
            });
        }

        Ok(self.hpa.clone())
    }

    async fn update_pod_autoscaler_status(
        &self,
        pod_autoscaler: &PodAutoscaler,
        status: &PodAutoscalerStatus,
    ) -> Result<(), client::Error> {
        self.record(Call::UpdateStatus(status.clone()));
        if self.fail_status {
            return Err(client::Error::PatchStatus {
                source: unavailable(),
                kind: "PodAutoscaler".to_owned(),
                name: pod_autoscaler.name_any(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl RoutingShim for FakeCluster {
    async fn reconcile_sks(
        &self,
        pa: &PodAutoscaler,
        mode: ServerlessServiceMode,
        num_activators: i32,
    ) -> Result<ServerlessService, client::Error> {
        self.record(Call::ReconcileSks(mode, num_activators));
        if self.sks_not_owned {
            return Err(client::Error::NotOwned {
                kind: "ServerlessService".to_owned(),
                name: pa.name_any(),
            });
        }

        let mut sks = desired_serverless_service(pa, mode, num_activators)?;
        sks.metadata.generation = Some(1);
        sks.status = Some(ServerlessServiceStatus {
            observed_generation: Some(1),
            conditions: vec![Condition {
                type_: "Ready".to_owned(),
                status: if self.sks_ready {
                    ConditionStatus::True
                } else {
                    ConditionStatus::Unknown
                },
                ..Condition::default()
            }],
            service_name: "test-revision".to_owned(),
            private_service_name: "test-revision-private".to_owned(),
        });
        Ok(sks)
    }
}

pub fn pa(entries: &[(&str, &str)]) -> PodAutoscaler {
    let mut pa = PodAutoscaler::new("test-revision", PodAutoscalerSpec {
        scale_target_ref: ObjectReference {
            api_version: Some("apps/v1".to_owned()),
            kind: Some("Deployment".to_owned()),
            name: Some("test-revision-deployment".to_owned()),
            ..ObjectReference::default()
        },
        protocol_type: "http1".to_owned(),
        ..PodAutoscalerSpec::default()
    });
    pa.metadata.namespace = Some("test-namespace".to_owned());
    pa.metadata.uid = Some("1234".to_owned());
    pa.metadata.generation = Some(1);
    pa.metadata.annotations = Some(
        [(keys::CLASS, HPA_CLASS)]
            .iter()
            .chain(entries)
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect::<BTreeMap<_, _>>(),
    );
    pa
}
