//! Spill scratch-directory layout.
//!
//! One directory per execution, keyed by task identity plus a nonce so a
//! re-attempt on the same partition never collides with leftovers from a
//! previous run. Lifecycle of the files inside is owned by the native side;
//! the host only provides the path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use nvq_common::{Result, TaskSpec};

static NONCE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Relative spill path for one execution.
#[must_use]
pub fn spill_dir_rel(task: TaskSpec, nonce: &str) -> String {
    format!(
        "spill/{}/{}/{}-{nonce}",
        task.stage, task.partition, task.attempt
    )
}

/// Creates the per-execution spill directory under `root`.
pub fn create_spill_dir(root: &Path, task: TaskSpec) -> Result<PathBuf> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    // Sequence number keeps same-nanosecond calls from colliding.
    let seq = NONCE_SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = root.join(spill_dir_rel(task, &format!("{nanos}-{seq}")));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}
