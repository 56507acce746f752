// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Peer Notification Fan-out
//!
//! Background delivery of best-effort peer notifications. A coordination call
//! hands each notification to a [`NotificationDispatcher`] after its local
//! writes succeed and returns without waiting; failures are logged per peer
//! and never reach the caller.
//!
//! | Dispatcher | Behaviour |
//! |------------|-----------|
//! | [`TokioDispatcher`] | spawns each task on the runtime, at most `max_in_flight` running |
//! | [`QueuedDispatcher`] | holds tasks until [`QueuedDispatcher::run_pending`] drives them in order |

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::domain::federation::{PortalClientError, SitePortalClient};
use crate::domain::site::{Site, SiteEndpoint};

pub type NotificationTask = BoxFuture<'static, anyhow::Result<()>>;

pub trait NotificationDispatcher: Send + Sync {
    /// Schedules `task`; `description` names the notification in logs.
    fn dispatch(&self, description: String, task: NotificationTask);
}

fn record_outcome(description: &str, result: &anyhow::Result<()>) {
    match result {
        Ok(()) => {
            debug!("Notification delivered: {}", description);
            metrics::counter!("fedlcm_fanout_tasks_total", "outcome" => "success").increment(1);
        }
        Err(e) => {
            warn!("Notification failed: {}: {:#}", description, e);
            metrics::counter!("fedlcm_fanout_tasks_total", "outcome" => "failure").increment(1);
        }
    }
}

/// Queues one copy of `message` per site, delivered with `send`.
pub fn dispatch_to_sites<M, F>(
    dispatcher: &dyn NotificationDispatcher,
    portal: &Arc<dyn SitePortalClient>,
    label: &str,
    sites: &[Site],
    message: M,
    send: F,
) where
    M: Clone + Send + Sync + 'static,
    F: for<'a> Fn(&'a dyn SitePortalClient, &'a SiteEndpoint, &'a M) -> BoxFuture<'a, Result<(), PortalClientError>>
        + Copy
        + Send
        + Sync
        + 'static,
{
    for site in sites {
        let portal = portal.clone();
        let message = message.clone();
        let endpoint = site.endpoint();
        let description = format!("{} to site {} ({})", label, site.name, endpoint);
        dispatcher.dispatch(
            description,
            Box::pin(async move {
                send(portal.as_ref(), &endpoint, &message).await?;
                Ok(())
            }),
        );
    }
}

/// Runtime-backed dispatcher bounded by a semaphore.
#[derive(Clone)]
pub struct TokioDispatcher {
    permits: Arc<Semaphore>,
}

impl TokioDispatcher {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }
}

impl NotificationDispatcher for TokioDispatcher {
    fn dispatch(&self, description: String, task: NotificationTask) {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            // The semaphore is never closed.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let result = task.await;
            record_outcome(&description, &result);
        });
    }
}

/// Result of one queued notification.
#[derive(Debug)]
pub struct TaskOutcome {
    pub description: String,
    pub result: Result<(), String>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Deterministic dispatcher: nothing runs until `run_pending` is awaited.
#[derive(Clone, Default)]
pub struct QueuedDispatcher {
    queue: Arc<Mutex<VecDeque<(String, NotificationTask)>>>,
}

impl QueuedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn pending_descriptions(&self) -> Vec<String> {
        self.queue.lock().iter().map(|(d, _)| d.clone()).collect()
    }

    /// Runs queued tasks in dispatch order, including tasks queued while
    /// draining, and returns one outcome per task.
    pub async fn run_pending(&self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let next = self.queue.lock().pop_front();
            let Some((description, task)) = next else {
                break;
            };
            let result = task.await;
            record_outcome(&description, &result);
            outcomes.push(TaskOutcome {
                description,
                result: result.map_err(|e| format!("{:#}", e)),
            });
        }
        outcomes
    }
}

impl NotificationDispatcher for QueuedDispatcher {
    fn dispatch(&self, description: String, task: NotificationTask) {
        self.queue.lock().push_back((description, task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_queued_dispatcher_runs_in_order() {
        let dispatcher = QueuedDispatcher::new();
        dispatcher.dispatch("first".to_string(), Box::pin(async { Ok(()) }));
        dispatcher.dispatch(
            "second".to_string(),
            Box::pin(async { Err(anyhow::anyhow!("peer unreachable")) }),
        );
        assert_eq!(dispatcher.pending(), 2);

        let outcomes = dispatcher.run_pending().await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].description, "first");
        assert!(outcomes[0].is_success());
        assert!(outcomes[1].result.as_ref().unwrap_err().contains("peer unreachable"));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_tokio_dispatcher_runs_tasks() {
        let dispatcher = TokioDispatcher::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);

        for _ in 0..4 {
            let counter = counter.clone();
            let tx = tx.clone();
            dispatcher.dispatch(
                "count".to_string(),
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(()).await;
                    Ok(())
                }),
            );
        }

        for _ in 0..4 {
            rx.recv().await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
