use crate::error::{Error, Result};
use crate::kubernetes::ClusterClient;
use crate::types::ClusterResource;
use async_trait::async_trait;
use kube::ResourceExt;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug};

/// A strategy producing [`ClusterResource`]s for one family of objects.
///
/// Collection is all-or-nothing: on error no resources are returned.
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    async fn collect(&self, cancel: &CancellationToken) -> Result<Vec<ClusterResource>>;
}

fn to_data<T: Serialize>(kind: &str, name: &str, obj: &T) -> Result<serde_json::Value> {
    serde_json::to_value(obj).map_err(|e| Error::Serialization {
        kind: kind.to_string(),
        name: name.to_string(),
        source: Box::new(e),
    })
}

/// Name of a listed object; objects without one cannot be staged.
fn object_name<K: ResourceExt>(kind: &str, obj: &K, scope: Option<&str>) -> Result<String> {
    let name = obj.name_any();
    if name.is_empty() {
        let name = match scope {
            Some(ns) => format!("{}/<unnamed>", ns),
            None => "<unnamed>".to_string(),
        };
        return Err(Error::InvalidResource {
            kind: kind.to_string(),
            name,
            reason: "object has no name",
        });
    }
    Ok(name)
}

/// Namespaces and the pods running in them.
pub struct CoreCollector {
    client: Arc<dyn ClusterClient>,
    span: Span,
}

impl CoreCollector {
    pub fn new(client: Arc<dyn ClusterClient>, span: Span) -> Self {
        Self { client, span }
    }

    async fn collect_namespaces(&self, cancel: &CancellationToken) -> Result<Vec<ClusterResource>> {
        let namespaces = self
            .client
            .list_namespaces(cancel)
            .await
            .map_err(|e| Error::ListNamespaces {
                stage: "",
                source: Box::new(e),
            })?;

        let mut resources = Vec::with_capacity(namespaces.len());
        for ns in &namespaces {
            let name = object_name("namespace", ns, None)?;
            let data = to_data("namespace", &name, ns)?;
            resources.push(ClusterResource::new("namespace", name, data));
        }
        debug!(parent: &self.span, "Collected {} namespaces", resources.len());
        Ok(resources)
    }

    async fn collect_pods(&self, cancel: &CancellationToken) -> Result<Vec<ClusterResource>> {
        let namespaces = self
            .client
            .list_namespaces(cancel)
            .await
            .map_err(|e| Error::ListNamespaces {
                stage: " for pod collection",
                source: Box::new(e),
            })?;

        let mut resources = Vec::new();
        for ns in &namespaces {
            let ns_name = object_name("namespace", ns, None)?;
            let pods = self
                .client
                .list_pods(cancel, &ns_name)
                .await
                .map_err(|e| Error::ListPods {
                    namespace: ns_name.clone(),
                    source: Box::new(e),
                })?;

            for pod in &pods {
                let name = object_name("pod", pod, Some(&ns_name))?;
                let pod_ns = pod.namespace().unwrap_or_else(|| ns_name.clone());
                let data = to_data("pod", &name, pod)?;
                resources.push(ClusterResource::new("pod", name, data).with_metadata("namespace", pod_ns));
            }
        }
        debug!(parent: &self.span, "Collected {} pods from {} namespaces", resources.len(), namespaces.len());
        Ok(resources)
    }
}

#[async_trait]
impl Collector for CoreCollector {
    fn name(&self) -> &str {
        "core"
    }

    async fn collect(&self, cancel: &CancellationToken) -> Result<Vec<ClusterResource>> {
        let mut resources = self.collect_namespaces(cancel).await?;
        resources.extend(self.collect_pods(cancel).await?);
        Ok(resources)
    }
}

/// Logs of every container of every pod.
///
/// One `log` resource per pod named `<namespace>.<pod>`; its data maps each
/// container name to that container's log text.
pub struct PodLogsCollector {
    client: Arc<dyn ClusterClient>,
    span: Span,
}

impl PodLogsCollector {
    pub fn new(client: Arc<dyn ClusterClient>, span: Span) -> Self {
        Self { client, span }
    }
}

#[async_trait]
impl Collector for PodLogsCollector {
    fn name(&self) -> &str {
        "logs"
    }

    async fn collect(&self, cancel: &CancellationToken) -> Result<Vec<ClusterResource>> {
        let namespaces = self
            .client
            .list_namespaces(cancel)
            .await
            .map_err(|e| Error::ListNamespaces {
                stage: " for log collection",
                source: Box::new(e),
            })?;

        let mut resources = Vec::new();
        for ns in &namespaces {
            let ns_name = object_name("namespace", ns, None)?;
            let pods = self
                .client
                .list_pods(cancel, &ns_name)
                .await
                .map_err(|e| Error::ListPods {
                    namespace: ns_name.clone(),
                    source: Box::new(e),
                })?;

            for pod in &pods {
                let pod_name = object_name("pod", pod, Some(&ns_name))?;
                let containers = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or_default();

                let mut logs = serde_json::Map::new();
                for container in containers {
                    let log = self
                        .client
                        .get_pod_logs(cancel, &ns_name, &pod_name, &container.name)
                        .await
                        .map_err(|e| Error::PodLogs {
                            namespace: ns_name.clone(),
                            pod: pod_name.clone(),
                            container: container.name.clone(),
                            source: Box::new(e),
                        })?;
                    logs.insert(container.name.clone(), log.into());
                }
                let data = json!({
                    "namespace": ns_name,
                    "pod": pod_name,
                    "containers": logs,
                });
                resources.push(
                    ClusterResource::new("log", format!("{}.{}", ns_name, pod_name), data)
                        .with_metadata("namespace", ns_name.clone()),
                );
            }
        }
        debug!(parent: &self.span, "Collected logs for {} pods", resources.len());
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::kubernetes::mock::MockClusterClient;

    fn core(client: MockClusterClient) -> CoreCollector {
        CoreCollector::new(Arc::new(client), Span::none())
    }

    #[test]
    fn test_core_collector_name() {
        assert_eq!(core(MockClusterClient::new()).name(), "core");
    }

    #[tokio::test]
    async fn test_collect_counts_and_pod_metadata() {
        let client = MockClusterClient::new()
            .namespace("default")
            .namespace("production")
            .namespace("empty")
            .pod("default", "nginx-pod")
            .pod("production", "api-pod")
            .pod("production", "db-pod");

        let resources = core(client).collect(&CancellationToken::new()).await.unwrap();
        assert_eq!(resources.len(), 6);

        let namespaces: Vec<_> = resources.iter().filter(|r| r.kind == "namespace").collect();
        assert_eq!(namespaces.len(), 3);
        assert!(namespaces.iter().all(|r| r.metadata.is_empty()));

        let pods: Vec<_> = resources.iter().filter(|r| r.kind == "pod").collect();
        assert_eq!(pods.len(), 3);
        for (name, ns) in [("nginx-pod", "default"), ("api-pod", "production"), ("db-pod", "production")] {
            let pod = pods.iter().find(|r| r.name == name).unwrap();
            assert_eq!(pod.namespace(), Some(ns));
            assert_eq!(pod.data["metadata"]["name"], name);
        }
    }

    #[tokio::test]
    async fn test_collect_preserves_discovery_order() {
        let client = MockClusterClient::new()
            .namespace("zeta")
            .namespace("alpha")
            .pod("zeta", "z-2")
            .pod("zeta", "z-1")
            .pod("alpha", "a-1");

        let resources = core(client).collect(&CancellationToken::new()).await.unwrap();
        let order: Vec<_> = resources
            .iter()
            .map(|r| format!("{}/{}", r.kind, r.name))
            .collect();
        assert_eq!(
            order,
            vec!["namespace/zeta", "namespace/alpha", "pod/z-2", "pod/z-1", "pod/a-1"]
        );
    }

    #[tokio::test]
    async fn test_collect_namespace_error() {
        let client = MockClusterClient::new().fail_namespaces("failed to connect to cluster");
        let err = core(client)
            .collect(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to connect to cluster"));
        assert_eq!(err.category(), ErrorCategory::Remote);
    }

    #[tokio::test]
    async fn test_collect_pod_error_discards_everything() {
        let client = Arc::new(
            MockClusterClient::new()
                .namespace("default")
                .namespace("broken")
                .namespace("later")
                .pod("default", "web")
                .pod("later", "never-listed")
                .fail_pods("broken", "failed to get pods"),
        );
        let collector = CoreCollector::new(client.clone(), Span::none());

        let result = collector.collect(&CancellationToken::new()).await;
        let err = result.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("broken"), "{msg}");
        assert!(msg.contains("failed to get pods"), "{msg}");
        assert_eq!(client.pod_calls(), vec!["default", "broken"]);
    }

    #[tokio::test]
    async fn test_collect_empty_namespace() {
        let client = MockClusterClient::new().namespace("empty-namespace");
        let resources = core(client).collect(&CancellationToken::new()).await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind, "namespace");
        assert_eq!(resources[0].name, "empty-namespace");
    }

    #[tokio::test]
    async fn test_logs_collector() {
        let client = MockClusterClient::new()
            .namespace("default")
            .pod("default", "web")
            .pod("default", "api");
        let collector = PodLogsCollector::new(Arc::new(client), Span::none());
        assert_eq!(collector.name(), "logs");

        let resources = collector.collect(&CancellationToken::new()).await.unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind, "log");
        assert_eq!(resources[0].name, "default.web");
        assert_eq!(resources[0].namespace(), Some("default"));
        assert_eq!(
            resources[0].data["containers"]["app"],
            "log line from default/web/app\n"
        );
    }

    #[tokio::test]
    async fn test_logs_collector_fetches_every_container() {
        let client = Arc::new(
            MockClusterClient::new()
                .namespace("default")
                .pod_with_containers("default", "web", &["nginx", "sidecar"])
                .pod("default", "api"),
        );
        let collector = PodLogsCollector::new(client.clone(), Span::none());

        let resources = collector.collect(&CancellationToken::new()).await.unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(
            client.log_calls(),
            vec!["default/web/nginx", "default/web/sidecar", "default/api/app"]
        );

        let web = &resources[0].data["containers"];
        assert_eq!(web.as_object().unwrap().len(), 2);
        assert_eq!(web["nginx"], "log line from default/web/nginx\n");
        assert_eq!(web["sidecar"], "log line from default/web/sidecar\n");
    }

    #[tokio::test]
    async fn test_logs_collector_fails_fast() {
        let client = MockClusterClient::new()
            .namespace("default")
            .pod("default", "web")
            .pod("default", "crashing")
            .fail_logs("default", "crashing", "container is waiting to start");
        let collector = PodLogsCollector::new(Arc::new(client), Span::none());

        let err = collector
            .collect(&CancellationToken::new())
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("default/crashing container app"), "{msg}");
        assert!(msg.contains("container is waiting to start"), "{msg}");
    }

    #[tokio::test]
    async fn test_collect_rejects_unnamed_namespace() {
        let client = MockClusterClient::new().namespace("default").namespace("");
        let err = core(client)
            .collect(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Invalid);
        assert!(err.to_string().contains("object has no name"), "{err}");
    }

    #[tokio::test]
    async fn test_collect_rejects_unnamed_pod() {
        let client = MockClusterClient::new()
            .namespace("default")
            .pod("default", "web")
            .pod("default", "");
        let err = core(client)
            .collect(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Invalid);
        assert_eq!(
            err.to_string(),
            "invalid resource pod/default/<unnamed>: object has no name"
        );
    }
}
