//! Advisory file locks (fs2 flock) serializing read-modify-write cycles.
//!
//! The bot, the console and one-off CLI invocations all rewrite the same
//! files, so every cycle runs inside [`with_file_lock`].

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::warn;

/// Run `f` while holding an exclusive lock on `lock_path`.
///
/// Blocks until the lock is free. Parent directories are created. The lock
/// is released when `f` returns, whatever its result.
pub(crate) fn with_file_lock<T>(lock_path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock {}", lock_path.display()))?;
    FileExt::lock_exclusive(&file)
        .with_context(|| format!("Failed to lock {}", lock_path.display()))?;

    let result = f();

    if let Err(e) = FileExt::unlock(&file) {
        warn!("Failed to unlock {}: {}", lock_path.display(), e);
    }
    result
}
