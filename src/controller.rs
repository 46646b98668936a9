// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring: watchers, work queue, and the reconcile worker pool.
//!
//! A bounded pool of workers pulls keys from the queue and runs the
//! reconciler to completion synchronously per key; the queue's in-flight
//! marking keeps distinct keys fully parallel while the same key never runs
//! twice concurrently.
//!
//! Retry policy lives entirely here and in the queue: a successful pass
//! forgets the key's failure history; a conflict-only failure re-enqueues
//! immediately (the next pass re-diffs from fresh reads); anything else goes
//! through per-key exponential backoff.
//!
//! Shutdown stops the queue from handing out new keys and lets in-flight
//! passes drain, so no half-applied mutation is left without a pending
//! retry.

use crate::config::ImageConfig;
use crate::dispatcher::spawn_watchers;
use crate::error::Error;
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::store::{ClusterStore, ReconcileKey};
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The running controller: watcher tasks feeding a queue drained by
/// reconcile workers.
pub struct Controller {
    queue: Arc<WorkQueue<ReconcileKey>>,
    workers: Vec<JoinHandle<()>>,
    watchers: Vec<JoinHandle<Result<(), Error>>>,
}

impl Controller {
    /// Wire up watchers and workers. The reconciler receives the store and
    /// image configuration by injection, never ambient globals.
    #[must_use]
    pub fn new(
        client: &Client,
        store: Arc<dyn ClusterStore>,
        images: ImageConfig,
        worker_count: usize,
    ) -> Self {
        info!(workers = worker_count, "Initializing CSI driver deployment controller");

        let queue = Arc::new(WorkQueue::new());
        let watchers = spawn_watchers(client, &queue);
        let reconciler = Arc::new(Reconciler::new(store, images));

        let workers = (0..worker_count)
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let reconciler = Arc::clone(&reconciler);
                tokio::spawn(async move {
                    worker_loop(worker, &queue, &reconciler).await;
                })
            })
            .collect();

        Self {
            queue,
            workers,
            watchers,
        }
    }

    /// Run until a shutdown signal, then drain in-flight passes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Watch`] if any watcher task exits; the watch streams
    /// are expected to run forever.
    pub async fn run(self) -> Result<(), Error> {
        info!("Controller running");

        let abort_handles: Vec<_> = self.watchers.iter().map(JoinHandle::abort_handle).collect();
        let mut watcher_exit = futures::future::select_all(self.watchers);

        let failed = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, draining in-flight passes");
                false
            }
            (result, _, _) = &mut watcher_exit => {
                error!("Watcher exited unexpectedly: {result:?}");
                true
            }
        };

        self.queue.shut_down();
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("Worker task panicked during drain: {e}");
            }
        }
        for handle in abort_handles {
            handle.abort();
        }
        info!("Controller stopped");

        if failed {
            return Err(Error::Watch("watcher exited unexpectedly".to_string()));
        }
        Ok(())
    }
}

/// Pull keys until shutdown, reconciling each to completion.
pub(crate) async fn worker_loop(
    worker: usize,
    queue: &Arc<WorkQueue<ReconcileKey>>,
    reconciler: &Reconciler,
) {
    while let Some(key) = queue.get().await {
        match reconciler.reconcile(&key).await {
            Ok(_) => {
                queue.forget(&key);
            }
            Err(e) if e.is_conflict_only() => {
                // Lost a race with a concurrent editor; a fresh diff
                // resolves it without backoff.
                info!(worker, %key, "Version conflict, re-enqueueing");
                queue.done(&key);
                queue.add(key);
                continue;
            }
            Err(e) => {
                warn!(worker, %key, error = %e, "Reconcile failed, backing off");
                queue.add_rate_limited(key.clone());
            }
        }
        queue.done(&key);
    }
}
