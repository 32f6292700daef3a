//! Working directory removal with a fallback at process exit.
//!
//! A runtime that was just killed can still hold files open for a moment,
//! so a failed removal is retried once when the test process exits.

use carbon_shared::errors::{CarbonError, CarbonResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Once;

static DEFERRED: Mutex<Vec<PathBuf>> = parking_lot::const_mutex(Vec::new());
static EXIT_HOOK: Once = Once::new();

/// Remove `path` recursively. On failure the path is queued for removal
/// at process exit and a [`CarbonError::Cleanup`] is returned.
///
/// A path that does not exist counts as removed.
pub fn remove_dir_or_defer(path: &Path) -> CarbonResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed working directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            defer_removal(path);
            Err(CarbonError::Cleanup(format!(
                "failed to remove {}: {} (retrying at exit)",
                path.display(),
                e
            )))
        }
    }
}

/// Queue `path` for removal when the process exits.
pub fn defer_removal(path: &Path) {
    EXIT_HOOK.call_once(|| {
        // SAFETY: registers a plain function with no captured state.
        let rc = unsafe { libc::atexit(remove_deferred) };
        if rc != 0 {
            tracing::warn!("Failed to register exit hook, deferred removals will not run");
        }
    });

    let mut deferred = DEFERRED.lock();
    if !deferred.iter().any(|p| p == path) {
        tracing::info!(path = %path.display(), "Deferring working directory removal to exit");
        deferred.push(path.to_path_buf());
    }
}

/// Paths still waiting for removal at exit.
pub fn deferred_paths() -> Vec<PathBuf> {
    DEFERRED.lock().clone()
}

extern "C" fn remove_deferred() {
    let paths = std::mem::take(&mut *DEFERRED.lock());
    for path in paths {
        let _ = std::fs::remove_dir_all(&path);
    }
}
