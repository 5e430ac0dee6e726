use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{ListParams, LogParams};
use kube::{Api, Client, config};
use std::future::Future;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info};

/// Raw listing operations against the cluster.
///
/// Every call takes the run's cancellation token; an implementation backed by
/// a remote API should give up as soon as the token fires.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_namespaces(&self, cancel: &CancellationToken) -> Result<Vec<Namespace>>;

    async fn list_pods(&self, cancel: &CancellationToken, namespace: &str) -> Result<Vec<Pod>>;

    /// Logs of one container; the API server rejects unnamed containers on multi-container pods.
    async fn get_pod_logs(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
        pod_name: &str,
        container: &str,
    ) -> Result<String>;
}

/// [`ClusterClient`] backed by the Kubernetes API server.
pub struct KubeClusterClient {
    client: Client,
    span: Span,
}

impl KubeClusterClient {
    pub fn new(client: Client, span: Span) -> Self {
        Self { client, span }
    }

    /// Resolve credentials and build a client.
    ///
    /// With neither `kubeconfig` nor `context` the configuration is inferred:
    /// the local kubeconfig first, then the in-cluster service account.
    pub async fn connect(kubeconfig: Option<&Path>, context: Option<&str>, span: Span) -> Result<Self> {
        let config = if kubeconfig.is_none() && context.is_none() {
            let config = config::Config::infer().await?;
            info!(parent: &span, "Using inferred cluster configuration ({})", config.cluster_url);
            config
        } else {
            let options = config::KubeConfigOptions {
                context: context.map(str::to_string),
                ..Default::default()
            };
            let loaded = match kubeconfig {
                Some(path) => {
                    let kc = config::Kubeconfig::read_from(path)?;
                    config::Config::from_custom_kubeconfig(kc, &options).await
                }
                None => config::Config::from_kubeconfig(&options).await,
            };
            let config = loaded.map_err(|e| {
                Error::Config(format!(
                    "context '{}' could not be loaded: {}",
                    context.unwrap_or("<current>"),
                    e
                ))
            })?;
            info!(
                parent: &span,
                "Using context {} ({})",
                context.unwrap_or("<current>"),
                config.cluster_url
            );
            config
        };

        Ok(Self::new(build_client(config)?, span))
    }
}

fn build_client(config: config::Config) -> Result<Client> {
    let cluster_url = config.cluster_url.to_string();
    Client::try_from(config)
        .map_err(|e| Error::Connection(format!("cannot build client for {}: {}", cluster_url, e)))
}

async fn cancellable<T, F>(cancel: &CancellationToken, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = kube::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled { operation: operation.to_string() }),
        res = fut => Ok(res?),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_namespaces(&self, cancel: &CancellationToken) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = cancellable(cancel, "list namespaces", api.list(&ListParams::default())).await?;
        debug!(parent: &self.span, "Listed {} namespaces", list.items.len());
        Ok(list.items)
    }

    async fn list_pods(&self, cancel: &CancellationToken, namespace: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let operation = format!("list pods in {}", namespace);
        let list = cancellable(cancel, &operation, api.list(&ListParams::default())).await?;
        debug!(parent: &self.span, "Listed {} pods in namespace {}", list.items.len(), namespace);
        Ok(list.items)
    }

    async fn get_pod_logs(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
        pod_name: &str,
        container: &str,
    ) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let lp = LogParams {
            container: Some(container.to_string()),
            ..Default::default()
        };
        let operation = format!("get logs for {}/{}/{}", namespace, pod_name, container);
        cancellable(cancel, &operation, api.logs(pod_name, &lp)).await
    }
}
