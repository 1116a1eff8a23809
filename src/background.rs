//! Background task runner for cache maintenance.
//!
//! A bounded channel feeding one worker task. Dispatch never blocks the
//! request path: a full queue drops the work with a logged error, and the
//! startup recovery scan restores whatever a dropped cache update would
//! have written. Failures inside a task are logged with their label and
//! never reach the request that queued them.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

type BoxedTask = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

#[derive(Clone)]
pub struct TaskRunner {
    tx: mpsc::Sender<(String, BoxedTask)>,
}

impl TaskRunner {
    /// Spawn the worker loop and hand back the dispatch handle.
    pub fn start(queue_depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<(String, BoxedTask)>(queue_depth.max(1));
        tokio::spawn(async move {
            while let Some((label, task)) = rx.recv().await {
                if let Err(e) = task.await {
                    log::error!("background task '{label}' failed: {e}");
                }
            }
        });
        TaskRunner { tx }
    }

    /// Queue a task without waiting for it.
    pub fn dispatch<F>(&self, label: &str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: BoxedTask = Box::pin(task);
        if self.tx.try_send((label.to_string(), boxed)).is_err() {
            log::error!("background queue full, dropped task '{label}'");
        }
    }

    /// Wait until everything queued before this call has run. The worker
    /// processes tasks in order, so a no-op barrier task suffices.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.dispatch("flush", async move {
            let _ = done_tx.send(());
            Ok(())
        });
        let _ = done_rx.await;
    }
}
