use async_trait::async_trait;
use kube::{Resource, ResourceExt, api::ObjectMeta};
use snafu::{OptionExt, ensure};

use super::{Client, Error, NotOwnedSnafu, ObjectMissingMetadataForOwnerRefSnafu, RoutingShim};
use crate::{
    controller_ref::is_controlled_by,
    crd::{
        pod_autoscaler::PodAutoscaler,
        serverless_service::{ServerlessService, ServerlessServiceMode, ServerlessServiceSpec},
    },
};

/// Never copied from the PodAutoscaler to the ServerlessService.
const LAST_APPLIED_CONFIGURATION_ANNOTATION: &str =
    "kubectl.kubernetes.io/last-applied-configuration";

/// Returns the ServerlessService routing traffic to the scale target of `pa`.
pub fn desired_serverless_service(
    pa: &PodAutoscaler,
    mode: ServerlessServiceMode,
    num_activators: i32,
) -> Result<ServerlessService, Error> {
    let owner_reference =
        pa.controller_owner_ref(&())
            .with_context(|| ObjectMissingMetadataForOwnerRefSnafu {
                name: pa.name_any(),
            })?;

    let mut annotations = pa.annotations().clone();
    annotations.remove(LAST_APPLIED_CONFIGURATION_ANNOTATION);

    Ok(ServerlessService {
        metadata: ObjectMeta {
            name: pa.meta().name.clone(),
            namespace: pa.meta().namespace.clone(),
            labels: pa.meta().labels.clone(),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_reference]),
            ..ObjectMeta::default()
        },
        spec: ServerlessServiceSpec {
            mode,
            object_ref: pa.spec.scale_target_ref.clone(),
            protocol_type: pa.spec.protocol_type.clone(),
            num_activators,
        },
        status: None,
    })
}

#[async_trait]
impl RoutingShim for Client {
    #[tracing::instrument(skip_all, fields(pa.name = %pa.name_any()))]
    async fn reconcile_sks(
        &self,
        pa: &PodAutoscaler,
        mode: ServerlessServiceMode,
        num_activators: i32,
    ) -> Result<ServerlessService, Error> {
        let desired = desired_serverless_service(pa, mode, num_activators)?;
        let name = desired.name_any();
        let namespace = desired.namespace().unwrap_or_default();

        let Some(mut live) = self.get_opt::<ServerlessService>(&name, &namespace).await? else {
            tracing::info!(sks.name = %name, "Creating ServerlessService");
            return self.create(&desired).await;
        };

        ensure!(
            is_controlled_by(&live, pa),
            NotOwnedSnafu {
                kind: ServerlessService::kind(&()),
                name,
            }
        );

        if live.spec == desired.spec {
            return Ok(live);
        }

        tracing::info!(sks.name = %name, "Updating ServerlessService");
        live.spec = desired.spec;
        self.replace(&live).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::ObjectReference;

    use super::*;
    use crate::crd::pod_autoscaler::PodAutoscalerSpec;

    fn pa() -> PodAutoscaler {
        let mut pa = PodAutoscaler::new("test-revision", PodAutoscalerSpec {
            scale_target_ref: ObjectReference {
                api_version: Some("apps/v1".to_owned()),
                kind: Some("Deployment".to_owned()),
                name: Some("test-revision-deployment".to_owned()),
                ..ObjectReference::default()
            },
            protocol_type: "h2c".to_owned(),
            ..PodAutoscalerSpec::default()
        });
        pa.metadata.namespace = Some("test-namespace".to_owned());
        pa.metadata.uid = Some("1234".to_owned());
        pa.metadata.labels = Some(BTreeMap::from([(
            "serving.knative.dev/revision".to_owned(),
            "test-revision".to_owned(),
        )]));
        pa.metadata.annotations = Some(BTreeMap::from([
            (
                LAST_APPLIED_CONFIGURATION_ANNOTATION.to_owned(),
                "{}".to_owned(),
            ),
            (
                "autoscaling.knative.dev/class".to_owned(),
                "hpa.autoscaling.knative.dev".to_owned(),
            ),
        ]));
        pa
    }

    #[test]
    fn serverless_service_follows_pod_autoscaler() {
        let pa = pa();
        let sks = desired_serverless_service(&pa, ServerlessServiceMode::Serve, 0)
            .expect("PodAutoscaler can own");

        assert_eq!(sks.metadata.name.as_deref(), Some("test-revision"));
        assert_eq!(sks.metadata.namespace.as_deref(), Some("test-namespace"));
        assert_eq!(sks.metadata.labels, pa.metadata.labels);
        assert_eq!(
            sks.metadata
                .annotations
                .as_ref()
                .map(|annotations| annotations.keys().cloned().collect::<Vec<_>>()),
            Some(vec!["autoscaling.knative.dev/class".to_owned()])
        );
        assert!(is_controlled_by(&sks, &pa));
        assert_eq!(sks.spec, ServerlessServiceSpec {
            mode: ServerlessServiceMode::Serve,
            object_ref: pa.spec.scale_target_ref.clone(),
            protocol_type: "h2c".to_owned(),
            num_activators: 0,
        });
    }

    #[test]
    fn unpersisted_pod_autoscaler_cannot_own() {
        let mut pa = pa();
        pa.metadata.uid = None;

        assert!(matches!(
            desired_serverless_service(&pa, ServerlessServiceMode::Proxy, 2),
            Err(Error::ObjectMissingMetadataForOwnerRef { .. })
        ));
    }
}
