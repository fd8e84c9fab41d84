//! Debounced whole-file output.
//!
//! Generated source changes on nearly every input event; writing each
//! revision would hammer the filesystem. [`OutputWriter`] keeps only the
//! latest pending text and flushes it after a quiet period, so a burst of
//! mutations costs one write carrying the final content. Files are always
//! written whole, never patched.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Debounced writer for one output file.
pub struct OutputWriter {
    inner: Arc<Inner>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    path: PathBuf,
    debounce: Duration,
    pending: Mutex<Option<String>>,
    writes: AtomicU64,
}

impl OutputWriter {
    pub fn new(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                debounce,
                pending: Mutex::new(None),
                writes: AtomicU64::new(0),
            }),
            flusher: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.inner.path
    }

    /// Number of completed writes, for tests and diagnostics.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Records `text` as the latest revision and arms the flush timer if it
    /// is not already running. Later calls within the debounce window just
    /// replace the pending text.
    pub fn schedule(&self, text: String) {
        *self.inner.pending.lock() = Some(text);

        let mut flusher = self.flusher.lock();
        let idle = flusher.as_ref().map(JoinHandle::is_finished).unwrap_or(true);
        if idle {
            let inner = Arc::clone(&self.inner);
            *flusher = Some(tokio::spawn(async move {
                loop {
                    tokio::time::sleep(inner.debounce).await;
                    inner.flush().await;
                    // A revision scheduled mid-flush, or a failed write,
                    // leaves pending set; keep the timer armed for it.
                    if inner.pending.lock().is_none() {
                        break;
                    }
                }
            }));
        }
    }

    /// Writes any pending revision immediately, cancelling the timer.
    pub async fn flush_now(&self) {
        let handle = self.flusher.lock().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.inner.flush().await;
    }

    /// Waits for the armed flush, if any, to finish. Test hook.
    pub async fn wait_idle(&self) {
        let handle = self.flusher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Inner {
    async fn flush(&self) {
        let text = self.pending.lock().take();
        let Some(text) = text else {
            return;
        };
        match tokio::fs::write(&self.path, &text).await {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "output write failed: {e}");
                // Keep the revision for the next flush unless a newer one
                // landed meanwhile.
                let mut pending = self.pending.lock();
                if pending.is_none() {
                    *pending = Some(text);
                }
            }
        }
    }
}

impl Drop for OutputWriter {
    fn drop(&mut self) {
        // Best effort: do not lose the final revision on shutdown.
        if let Some(handle) = self.flusher.lock().take() {
            handle.abort();
        }
        if let Some(text) = self.inner.pending.lock().take() {
            let _ = std::fs::write(&self.inner.path, text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_of_revisions_costs_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.js");
        let writer = OutputWriter::new(&path, Duration::from_millis(250));

        for revision in 0..10 {
            writer.schedule(format!("revision {revision}\n"));
        }
        writer.wait_idle().await;

        assert_eq!(writer.write_count(), 1);
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, "revision 9\n");
    }

    #[tokio::test]
    async fn separate_bursts_write_separately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.js");
        let writer = OutputWriter::new(&path, Duration::from_millis(10));

        writer.schedule("first\n".to_string());
        writer.wait_idle().await;
        writer.schedule("second\n".to_string());
        writer.wait_idle().await;

        assert_eq!(writer.write_count(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second\n");
    }

    #[tokio::test]
    async fn flush_now_skips_the_debounce_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.js");
        let writer = OutputWriter::new(&path, Duration::from_secs(3600));

        writer.schedule("final\n".to_string());
        writer.flush_now().await;

        assert_eq!(writer.write_count(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "final\n");
    }

    #[tokio::test]
    async fn failed_write_is_retried_until_it_lands() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out");
        let path = nested.join("recording.js");
        let writer = OutputWriter::new(&path, Duration::from_millis(10));

        // Parent directory missing: the first flush attempts fail and the
        // revision stays pending with the timer still armed.
        writer.schedule("kept\n".to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(writer.write_count(), 0);

        std::fs::create_dir(&nested).unwrap();
        writer.wait_idle().await;
        assert_eq!(writer.write_count(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[tokio::test]
    async fn flush_without_pending_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.js");
        let writer = OutputWriter::new(&path, Duration::from_millis(10));

        writer.flush_now().await;
        assert_eq!(writer.write_count(), 0);
        assert!(!path.exists());
    }
}
