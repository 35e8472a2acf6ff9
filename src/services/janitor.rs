use crate::config::RelayConfig;
use crate::services::staging::StagingStore;
use futures::TryStreamExt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Periodic sweep that reclaims staged files older than `max_age`.
pub struct Janitor {
    store: Arc<StagingStore>,
    max_age: Duration,
    interval: Duration,
    retry_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Janitor {
    pub fn new(
        store: Arc<StagingStore>,
        max_age: Duration,
        interval: Duration,
        retry_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            max_age,
            interval,
            retry_interval,
            shutdown,
        }
    }

    pub fn from_config(
        store: Arc<StagingStore>,
        config: &RelayConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self::new(
            store,
            config.staging_max_age,
            config.janitor_interval,
            config.janitor_retry_interval,
            shutdown,
        )
    }

    /// Sweeps until the shutdown channel flips to `true` or its sender is dropped.
    /// A failed sweep is retried after the shorter backoff interval.
    pub async fn run(mut self) {
        tracing::info!(
            "🧹 Janitor started (max age {}s, every {}s)",
            self.max_age.as_secs(),
            self.interval.as_secs()
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let wait = match self.sweep(SystemTime::now()).await {
                Ok(report) => {
                    if report.removed > 0 || report.failed > 0 {
                        tracing::info!(
                            scanned = report.scanned,
                            removed = report.removed,
                            failed = report.failed,
                            "Janitor sweep completed"
                        );
                    }
                    self.interval
                }
                Err(e) => {
                    tracing::error!(
                        "Janitor sweep of {} failed, retrying in {}s: {}",
                        self.store.dir().display(),
                        self.retry_interval.as_secs(),
                        e
                    );
                    self.retry_interval
                }
            };

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = sleep(wait) => {}
            }
        }

        tracing::info!("🛑 Janitor shutting down");
    }

    /// One pass over the staging directory. Per-file removal failures are
    /// counted and skipped; only a failure to list the directory is an error.
    pub async fn sweep(&self, now: SystemTime) -> io::Result<SweepReport> {
        let store = &self.store;
        self.sweep_with(now, |path| async move { store.remove(&path).await })
            .await
    }

    async fn sweep_with<F, Fut>(&self, now: SystemTime, mut remove: F) -> io::Result<SweepReport>
    where
        F: FnMut(PathBuf) -> Fut,
        Fut: Future<Output = io::Result<bool>>,
    {
        let mut report = SweepReport::default();
        let entries = self.store.list_all();
        futures::pin_mut!(entries);

        while let Some(entry) = entries.try_next().await? {
            report.scanned += 1;

            let age = entry.age(now);
            if age <= self.max_age {
                continue;
            }

            match remove(entry.path.clone()).await {
                Ok(true) => {
                    report.removed += 1;
                    tracing::warn!(
                        file = %entry.name,
                        size = entry.size,
                        age_secs = age.as_secs(),
                        "🧹 Reclaimed orphaned staged file; its request may be stalled"
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::error!("Failed to reclaim staged file {}: {}", entry.name, e);
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const HOUR: Duration = Duration::from_secs(3600);

    fn backdate(path: &Path, by: Duration) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - by)
            .unwrap();
    }

    async fn setup() -> (tempfile::TempDir, Arc<StagingStore>) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(StagingStore::open(tmp.path().join("staging")).await.unwrap());
        (tmp, store)
    }

    fn janitor(store: Arc<StagingStore>, shutdown: watch::Receiver<bool>) -> Janitor {
        Janitor::new(
            store,
            HOUR,
            Duration::from_secs(300),
            Duration::from_secs(60),
            shutdown,
        )
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_files() {
        let (_tmp, store) = setup().await;
        let old = store.stage(b"old", "old.bin").await.unwrap();
        let fresh = store.stage(b"fresh", "fresh.bin").await.unwrap();
        backdate(&old.path, Duration::from_secs(90 * 60));
        backdate(&fresh.path, Duration::from_secs(10 * 60));

        let (_tx, rx) = watch::channel(false);
        let report = janitor(store.clone(), rx)
            .sweep(SystemTime::now())
            .await
            .unwrap();

        assert_eq!(
            report,
            SweepReport {
                scanned: 2,
                removed: 1,
                failed: 0
            }
        );
        assert!(!old.path.exists());
        assert!(fresh.path.exists());
    }

    #[tokio::test]
    async fn test_sweep_continues_past_a_failed_removal() {
        let (_tmp, store) = setup().await;
        let locked = store.stage(b"locked", "locked.bin").await.unwrap();
        let stale = store.stage(b"stale", "stale.bin").await.unwrap();
        backdate(&locked.path, 2 * HOUR);
        backdate(&stale.path, 2 * HOUR);

        let (_tx, rx) = watch::channel(false);
        let report = janitor(store.clone(), rx)
            .sweep_with(SystemTime::now(), |path| {
                let store = store.clone();
                let locked = locked.path.clone();
                async move {
                    if path == locked {
                        return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
                    }
                    store.remove(&path).await
                }
            })
            .await
            .unwrap();

        assert_eq!(
            report,
            SweepReport {
                scanned: 2,
                removed: 1,
                failed: 1
            }
        );
        assert!(locked.path.exists());
        assert!(!stale.path.exists());
    }

    #[tokio::test]
    async fn test_sweep_fails_when_directory_unreadable() {
        let (_tmp, store) = setup().await;
        tokio::fs::remove_dir(store.dir()).await.unwrap();

        let (_tx, rx) = watch::channel(false);
        assert!(janitor(store, rx).sweep(SystemTime::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_run_sweeps_and_stops_on_shutdown() {
        let (_tmp, store) = setup().await;
        let old = store.stage(b"old", "old.bin").await.unwrap();
        backdate(&old.path, 2 * HOUR);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(janitor(store.clone(), rx).run());

        for _ in 0..200 {
            if !old.path.exists() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(!old.path.exists());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("janitor did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_survives_failed_sweeps() {
        let (_tmp, store) = setup().await;
        tokio::fs::remove_dir(store.dir()).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(
            Janitor::new(
                store.clone(),
                HOUR,
                Duration::from_secs(300),
                Duration::from_millis(20),
                rx,
            )
            .run(),
        );

        sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        // Directory comes back already holding an expired file.
        let replacement = store.dir().with_file_name("replacement");
        std::fs::create_dir(&replacement).unwrap();
        std::fs::write(replacement.join("late.bin"), b"old").unwrap();
        backdate(&replacement.join("late.bin"), 2 * HOUR);
        std::fs::rename(&replacement, store.dir()).unwrap();

        let late = store.dir().join("late.bin");
        for _ in 0..200 {
            if !late.exists() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(!late.exists());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("janitor did not stop")
            .unwrap();
    }
}
