use std::collections::BTreeMap;

/// One object captured from the cluster.
///
/// `name` is unique only within its `kind` (two pods in different namespaces
/// may share a name). `data` is opaque to everything but the persister, which
/// only needs to serialize it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResource {
    pub kind: String,
    pub name: String,
    pub data: serde_json::Value,
    pub metadata: BTreeMap<String, String>,
}

impl ClusterResource {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            data,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.get("namespace").map(String::as_str)
    }
}

/// Serialization used for every staged document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }

    /// Render `data` as an indented, human-readable document.
    pub fn render(self, data: &serde_json::Value) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            OutputFormat::Json => {
                let mut buf = serde_json::to_vec_pretty(data)?;
                buf.push(b'\n');
                Ok(buf)
            }
            OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?.into_bytes()),
        }
    }
}
