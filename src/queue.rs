//! In-process release queue.
//!
//! Webhook requests are acknowledged immediately; the actual reaction to a
//! release runs on a single worker task so only one dependency sweep touches
//! GitLab at a time.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info};

use crate::deps::DependencyManager;
use crate::error::Result;
use crate::webhook::PackageRelease;

/// What to do with a release after it has been acknowledged.
#[async_trait]
pub trait ReleaseHandler: Send + Sync {
    async fn handle(&self, release: &PackageRelease) -> Result<()>;
}

/// Fallback when no GitLab group is configured: record receipt, nothing else.
pub struct LogOnlyHandler;

#[async_trait]
impl ReleaseHandler for LogOnlyHandler {
    async fn handle(&self, release: &PackageRelease) -> Result<()> {
        info!(
            "Received release {} {} from '{}' (no group configured, not acting on it)",
            release.package_name, release.version, release.repository
        );
        Ok(())
    }
}

/// Re-pins the released package in every dependent project of the group.
pub struct DependencyUpdateHandler {
    manager: Mutex<DependencyManager>,
}

impl DependencyUpdateHandler {
    pub fn new(manager: DependencyManager) -> Self {
        Self {
            manager: Mutex::new(manager),
        }
    }
}

#[async_trait]
impl ReleaseHandler for DependencyUpdateHandler {
    async fn handle(&self, release: &PackageRelease) -> Result<()> {
        let mut manager = self.manager.lock().await;
        let updated = manager.update_for_release(release).await;
        info!(
            "Updated {} dependent project(s) for {} {}",
            updated, release.package_name, release.version
        );
        Ok(())
    }
}

pub struct ReleaseQueue {
    tx: mpsc::UnboundedSender<PackageRelease>,
    depth: Arc<AtomicUsize>,
    processing: Arc<AtomicBool>,
}

impl ReleaseQueue {
    /// Spawn the worker task and return the queue handle.
    pub fn start(handler: Arc<dyn ReleaseHandler>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PackageRelease>();
        let depth = Arc::new(AtomicUsize::new(0));
        let processing = Arc::new(AtomicBool::new(false));

        let worker_depth = Arc::clone(&depth);
        let worker_processing = Arc::clone(&processing);

        tokio::spawn(async move {
            while let Some(release) = rx.recv().await {
                worker_depth.fetch_sub(1, Ordering::SeqCst);
                worker_processing.store(true, Ordering::SeqCst);

                info!("Processing {} from queue", release.package_name);
                match handler.handle(&release).await {
                    Ok(()) => info!("Completed {}", release.package_name),
                    Err(e) => error!("Failed {}: {}", release.package_name, e),
                }

                worker_processing.store(false, Ordering::SeqCst);
            }
        });

        Self {
            tx,
            depth,
            processing,
        }
    }

    /// Queue a release for the worker. Returns false if the worker is gone.
    pub fn enqueue(&self, release: PackageRelease) -> bool {
        let name = release.package_name.clone();
        if self.tx.send(release).is_ok() {
            self.depth.fetch_add(1, Ordering::SeqCst);
            info!("Added {} to queue", name);
            true
        } else {
            error!("Release worker is not running, dropping {}", name);
            false
        }
    }

    /// Number of releases waiting (not counting one being processed).
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct RecordingHandler {
        seen: mpsc::UnboundedSender<PackageRelease>,
    }

    #[async_trait]
    impl ReleaseHandler for RecordingHandler {
        async fn handle(&self, release: &PackageRelease) -> Result<()> {
            self.seen.send(release.clone()).ok();
            Ok(())
        }
    }

    fn release(name: &str) -> PackageRelease {
        PackageRelease {
            package_name: name.to_string(),
            version: "1.0.0".to_string(),
            repository: "pypi-internal".to_string(),
            timestamp: "2024-01-01T00:00:00.000+00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn worker_processes_queued_releases_in_order() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let queue = ReleaseQueue::start(Arc::new(RecordingHandler { seen: seen_tx }));

        assert!(queue.enqueue(release("first")));
        assert!(queue.enqueue(release("second")));

        let first = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
            .await
            .expect("worker did not run")
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
            .await
            .expect("worker did not run")
            .unwrap();

        assert_eq!(first.package_name, "first");
        assert_eq!(second.package_name, "second");
    }

    #[tokio::test]
    async fn depth_drops_back_to_zero_after_processing() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let queue = ReleaseQueue::start(Arc::new(RecordingHandler { seen: seen_tx }));

        queue.enqueue(release("only"));
        tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
            .await
            .expect("worker did not run")
            .unwrap();

        assert_eq!(queue.depth(), 0);
    }
}
