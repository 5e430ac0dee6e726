//! Error types for snapshot collection, persistence and archiving.

use std::path::PathBuf;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    // Remote / cluster errors
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("cluster connection error: {0}")]
    Connection(String),

    #[error("failed to list namespaces{stage}: {source}")]
    ListNamespaces {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to list pods in namespace {namespace}: {source}")]
    ListPods {
        namespace: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to get logs for pod {namespace}/{pod} container {container}: {source}")]
    PodLogs {
        namespace: String,
        pod: String,
        container: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    #[error("collector {collector} failed: {source}")]
    Collector {
        collector: String,
        #[source]
        source: Box<Error>,
    },

    // Local errors
    #[error("failed to serialize {kind}/{name}: {source}")]
    Serialization {
        kind: String,
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to {operation} {}: {source}", path.display())]
    Storage {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid resource {kind}/{name}: {reason}")]
    InvalidResource {
        kind: String,
        name: String,
        reason: &'static str,
    },

    #[allow(dead_code)]
    #[error("resource not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Remote,
    Serialization,
    Storage,
    NotFound,
    Invalid,
    Config,
}

impl Error {
    pub fn storage(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Category of the innermost cause; context wrappers are transparent.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Kube(_) | Error::Connection(_) | Error::Cancelled { .. } => ErrorCategory::Remote,
            Error::ListNamespaces { source, .. }
            | Error::ListPods { source, .. }
            | Error::PodLogs { source, .. }
            | Error::Collector { source, .. } => source.category(),
            Error::Serialization { .. } => ErrorCategory::Serialization,
            Error::Storage { .. } => ErrorCategory::Storage,
            Error::InvalidResource { .. } => ErrorCategory::Invalid,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Config(_) => ErrorCategory::Config,
        }
    }
}

impl From<kube::config::InferConfigError> for Error {
    fn from(e: kube::config::InferConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<kube::config::KubeconfigError> for Error {
    fn from(e: kube::config::KubeconfigError) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
