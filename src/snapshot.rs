use crate::collector::{Collector, CoreCollector, PodLogsCollector};
use crate::error::{Error, Result};
use crate::kubernetes::ClusterClient;
use crate::persister::{Persister, TarGzPersister};
use crate::types::OutputFormat;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, info_span, warn};

/// What happens when a single resource cannot be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistPolicy {
    /// Abort the run; no archive is produced.
    #[default]
    FailFast,
    /// Record the failure in the report and keep going.
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistFailure {
    pub kind: String,
    pub name: String,
    pub error: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default)]
pub struct SnapshotReport {
    pub output: PathBuf,
    pub persisted: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_collector: Vec<(String, usize)>,
    pub failures: Vec<PersistFailure>,
}

/// Options for the default wiring built by [`SnapshotManager::with_defaults`].
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    pub format: OutputFormat,
    pub include_logs: bool,
    pub policy: PersistPolicy,
}

/// Runs one snapshot: every collector in order, each resource into the
/// persister, then a single finalize.
///
/// The manager is consumed by [`SnapshotManager::create_snapshot`].
pub struct SnapshotManager {
    collectors: Vec<Box<dyn Collector>>,
    persister: Box<dyn Persister>,
    policy: PersistPolicy,
    span: Span,
}

impl SnapshotManager {
    pub fn new(collectors: Vec<Box<dyn Collector>>, persister: Box<dyn Persister>, span: Span) -> Self {
        Self {
            collectors,
            persister,
            policy: PersistPolicy::default(),
            span,
        }
    }

    pub fn with_policy(mut self, policy: PersistPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Core collector (plus the logs collector if asked for) feeding a tar.gz persister.
    pub fn with_defaults(client: Arc<dyn ClusterClient>, options: &SnapshotOptions, span: Span) -> Result<Self> {
        let child = |name: &str| info_span!(parent: &span, "collector", name = name);

        let mut collectors: Vec<Box<dyn Collector>> =
            vec![Box::new(CoreCollector::new(client.clone(), child("core")))];
        if options.include_logs {
            collectors.push(Box::new(PodLogsCollector::new(client, child("logs"))));
        }

        let persister = TarGzPersister::new(options.format, info_span!(parent: &span, "persister"))?;
        Ok(Self::new(collectors, Box::new(persister), span).with_policy(options.policy))
    }

    pub async fn create_snapshot(self, output: &Path, cancel: &CancellationToken) -> Result<SnapshotReport> {
        let SnapshotManager {
            collectors,
            mut persister,
            policy,
            span,
        } = self;
        let mut report = SnapshotReport::default();

        for collector in &collectors {
            let name = collector.name().to_string();
            debug!(parent: &span, "Running collector {}", name);
            let resources = collector.collect(cancel).await.map_err(|e| Error::Collector {
                collector: name.clone(),
                source: Box::new(e),
            })?;
            info!(parent: &span, "Collector {} produced {} resources", name, resources.len());

            let mut persisted = 0;
            for resource in &resources {
                match persister.persist(resource) {
                    Ok(_) => {
                        persisted += 1;
                        *report.by_kind.entry(resource.kind.clone()).or_default() += 1;
                    }
                    Err(e) if policy == PersistPolicy::Report => {
                        warn!(parent: &span, "Skipping {}/{}: {}", resource.kind, resource.name, e);
                        report.failures.push(PersistFailure {
                            kind: resource.kind.clone(),
                            name: resource.name.clone(),
                            error: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            report.persisted += persisted;
            report.by_collector.push((name, persisted));
        }

        let summary = persister.finalize(output)?;
        report.output = summary.path;
        Ok(report)
    }
}
