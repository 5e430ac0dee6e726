use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const SNAPSHOT_PREFIX: &str = "kubin-snapshot";

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Last stamp handed out, in nanoseconds since the Unix epoch.
static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Nanoseconds since the Unix epoch (UTC), strictly increasing within the process.
fn next_stamp() -> u64 {
    let now = chrono::Utc::now();
    let now = (now.timestamp().max(0) as u64) * NANOS_PER_SEC + u64::from(now.timestamp_subsec_nanos());
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Default archive name: `kubin-snapshot-<unix-seconds>-<nanoseconds>.tar.gz`.
///
/// The nanosecond part is zero-padded to nine digits. Successive calls never
/// return the same name.
pub fn generate_output_filename() -> String {
    let stamp = next_stamp();
    format!(
        "{}-{}-{:09}.tar.gz",
        SNAPSHOT_PREFIX,
        stamp / NANOS_PER_SEC,
        stamp % NANOS_PER_SEC
    )
}

/// Where the archive of a run goes: `output` if given, else a generated name in `dir`.
pub fn resolve_output_path(output: Option<&Path>, dir: &Path) -> PathBuf {
    match output {
        Some(path) => path.to_path_buf(),
        None => dir.join(generate_output_filename()),
    }
}
