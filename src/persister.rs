//! Staged persistence of collected resources.
//!
//! Resources are first written one file each under a private staging
//! directory (`<kind>/<name>.<ext>`), then `finalize` packs the whole staging
//! tree into a single gzip-compressed tar archive and removes the staging
//! directory.

use crate::error::{Error, Result};
use crate::types::{ClusterResource, OutputFormat};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{Span, debug, info, warn};

/// Sink for collected resources.
///
/// `finalize` consumes the persister, so nothing can be persisted once the
/// archive has been produced.
pub trait Persister: Send {
    /// Record one resource, returning where it was staged.
    fn persist(&mut self, resource: &ClusterResource) -> Result<PathBuf>;

    /// Produce the archive at `output` and release all staging storage.
    fn finalize(self: Box<Self>, output: &Path) -> Result<ArchiveSummary>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub entries: usize,
}

pub struct TarGzPersister {
    staging: TempDir,
    format: OutputFormat,
    span: Span,
}

impl TarGzPersister {
    pub fn new(format: OutputFormat, span: Span) -> Result<Self> {
        Self::new_in(std::env::temp_dir(), format, span)
    }

    /// Like [`TarGzPersister::new`], with the staging directory created under `parent`.
    pub fn new_in(parent: impl AsRef<Path>, format: OutputFormat, span: Span) -> Result<Self> {
        let parent = parent.as_ref();
        let staging = tempfile::Builder::new()
            .prefix("kubin-persister-")
            .tempdir_in(parent)
            .map_err(|e| Error::storage("create staging directory in", parent, e))?;
        let persister = Self {
            staging,
            format,
            span,
        };
        debug!(parent: &persister.span, "Staging snapshot in {}", persister.staging_root().display());
        Ok(persister)
    }

    pub fn staging_root(&self) -> &Path {
        self.staging.path()
    }

    fn staged_path(&self, resource: &ClusterResource) -> Result<PathBuf> {
        let invalid = |reason| Error::InvalidResource {
            kind: resource.kind.clone(),
            name: resource.name.clone(),
            reason,
        };
        check_component(&resource.kind).map_err(invalid)?;
        check_component(&resource.name).map_err(invalid)?;

        let file_name = format!("{}.{}", resource.name, self.format.extension());
        Ok(self.staging.path().join(&resource.kind).join(file_name))
    }
}

/// Kinds and names become path components in the staging tree and archive.
fn check_component(value: &str) -> std::result::Result<(), &'static str> {
    if value.is_empty() {
        return Err("empty kind or name");
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err("kind and name must be single path components");
    }
    Ok(())
}

impl Persister for TarGzPersister {
    fn persist(&mut self, resource: &ClusterResource) -> Result<PathBuf> {
        let path = self.staged_path(resource)?;
        let body = self
            .format
            .render(&resource.data)
            .map_err(|source| Error::Serialization {
                kind: resource.kind.clone(),
                name: resource.name.clone(),
                source,
            })?;

        let dir = self.staging.path().join(&resource.kind);
        fs::create_dir_all(&dir).map_err(|e| Error::storage("create directory", &dir, e))?;
        fs::write(&path, body).map_err(|e| Error::storage("write", &path, e))?;

        match resource.namespace() {
            Some(ns) => debug!(parent: &self.span, "Staged {}/{} from namespace {}", resource.kind, resource.name, ns),
            None => debug!(parent: &self.span, "Staged {}/{}", resource.kind, resource.name),
        }
        Ok(path)
    }

    fn finalize(self: Box<Self>, output: &Path) -> Result<ArchiveSummary> {
        let TarGzPersister { staging, span, .. } = *self;
        let result = write_archive(staging.path(), output);

        let root = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            warn!(parent: &span, "Failed to remove staging directory {}: {}", root.display(), e);
        }

        if let Ok(summary) = &result {
            info!(
                parent: &span,
                "Wrote {} entries to {}",
                summary.entries,
                summary.path.display()
            );
        }
        result
    }
}

/// Regular files under `root`, relative to it, walked in lexicographic order.
fn staged_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(root, Path::new(""), &mut files)?;
    Ok(files)
}

fn walk(root: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let dir = root.join(rel);
    let mut entries = fs::read_dir(&dir)
        .and_then(|it| it.collect::<std::io::Result<Vec<_>>>())
        .map_err(|e| Error::storage("read directory", &dir, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_type = entry
            .file_type()
            .map_err(|e| Error::storage("stat", entry.path(), e))?;
        let child = rel.join(entry.file_name());
        if file_type.is_dir() {
            walk(root, &child, out)?;
        } else if file_type.is_file() {
            out.push(child);
        }
    }
    Ok(())
}

fn write_archive(root: &Path, output: &Path) -> Result<ArchiveSummary> {
    let files = staged_files(root)?;

    // Written next to the destination and renamed into place once complete.
    let out_dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp_builder = tempfile::Builder::new();
    tmp_builder.prefix(".kubin-archive-").suffix(".tmp");
    // Same mode as a plainly created file (0666 minus umask), not tempfile's 0600.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp_builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let tmp = tmp_builder
        .tempfile_in(out_dir)
        .map_err(|e| Error::storage("create output file in", out_dir, e))?;

    let mut builder = tar::Builder::new(GzEncoder::new(tmp, Compression::default()));
    builder.mode(tar::HeaderMode::Deterministic);
    for rel in &files {
        let abs = root.join(rel);
        builder
            .append_path_with_name(&abs, rel)
            .map_err(|e| Error::storage("archive", &abs, e))?;
    }

    let tmp = builder
        .into_inner()
        .and_then(|gz| gz.finish())
        .map_err(|e| Error::storage("write archive", output, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::storage("sync archive", output, e))?;
    tmp.persist(output)
        .map_err(|e| Error::storage("create output file", output, e.error))?;

    Ok(ArchiveSummary {
        path: output.to_path_buf(),
        entries: files.len(),
    })
}
