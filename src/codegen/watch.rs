/// Filesystem watch mode for the codegen CLI.
///
/// Watches the operation-document roots recursively and re-runs a callback
/// when anything under them changes. Events are coalesced with a short
/// settle window so editors that write-then-rename trigger one rerun, not
/// three.
use crate::error::{UdlError, UdlResult};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, warn};

/// Default settle window after the first event of a burst.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(200);

/// Watch `paths` and invoke `on_change` after each settled burst of
/// filesystem events. Blocks the calling thread until `on_change` errors
/// or the watcher dies.
pub fn watch_and_rerun<F>(paths: &[PathBuf], settle: Duration, mut on_change: F) -> UdlResult<()>
where
    F: FnMut() -> UdlResult<()>,
{
    let (tx, rx) = mpsc::channel::<()>();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |result: Result<Event, notify::Error>| match result {
            Ok(_event) => {
                let _ = tx.send(());
            }
            Err(e) => warn!(error = %e, "watch error"),
        })
        .map_err(|e| UdlError::Internal(format!("failed to start watcher: {e}")))?;

    for path in paths {
        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| UdlError::Internal(format!("failed to watch {}: {e}", path.display())))?;
        info!(path = %path.display(), "watching");
    }

    loop {
        // Block for the first event of a burst, then drain the settle window.
        if rx.recv().is_err() {
            return Ok(());
        }
        loop {
            match rx.recv_timeout(settle) {
                Ok(()) => continue,
                Err(mpsc::RecvTimeoutError::Timeout) => break,
                Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
        on_change()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn a_burst_of_writes_triggers_one_rerun() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let watch_root = root.clone();
        let handle = std::thread::spawn(move || {
            let _ = watch_and_rerun(&[watch_root], Duration::from_millis(100), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                // Stop the loop after the first rerun.
                Err(UdlError::Internal("done".into()))
            });
        });

        std::thread::sleep(Duration::from_millis(200));
        fs::write(root.join("a.graphql"), "query A { x }").unwrap();
        fs::write(root.join("b.graphql"), "query B { x }").unwrap();

        handle.join().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
