use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide "broker connection currently established" flag.
///
/// The flag is advisory: it is written by the consumer loop and read by health checks.
/// Optionally it is mirrored to a sentinel file - present while the connection is alive,
/// removed on connection errors - for health checks that can only look at the filesystem.
///
/// Cloning a `LivenessMarker` gives another handle on the same flag.
#[derive(Clone, Debug, Default)]
pub struct LivenessMarker {
    alive: Arc<AtomicBool>,
    sentinel_file: Option<Arc<PathBuf>>,
}

impl LivenessMarker {
    /// A marker that starts as "not alive", with no sentinel file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror the flag to `path`.
    #[must_use]
    pub fn with_sentinel_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sentinel_file = Some(Arc::new(path.into()));
        self
    }

    pub fn sentinel_file(&self) -> Option<&Path> {
        self.sentinel_file.as_deref().map(PathBuf::as_path)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
        if let Some(path) = self.sentinel_file() {
            let touched = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path);
            if let Err(e) = touched {
                tracing::warn!(path = %path.display(), "Failed to touch liveness file: {}", e);
            }
        }
    }

    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(path) = self.sentinel_file() {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to remove liveness file: {}", e)
                }
            }
        }
    }
}
