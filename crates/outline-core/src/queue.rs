//! Mutation queue
//!
//! Tree edits arrive from several producers: the breakdown stream, the chat
//! stream writing back conversations, and user actions. They all go through
//! one FIFO drained by a single worker task, which awaits each mutation to
//! completion before starting the next. Producers never touch the tree
//! directly.

use crate::error::QueueError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};

type Mutation = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

enum Job {
    Apply(Mutation),
    Barrier(oneshot::Sender<()>),
}

/// Handle to a single-consumer mutation pipeline
///
/// Cheap to clone; the worker exits once every handle is dropped and the
/// backlog is drained.
#[derive(Debug, Clone)]
pub struct MutationQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Apply(_) => f.write_str("Apply"),
            Job::Barrier(_) => f.write_str("Barrier"),
        }
    }
}

impl MutationQueue {
    /// Spawn the drain worker on the current tokio runtime
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(drain(receiver));
        Self { sender }
    }

    /// Append an async mutation
    ///
    /// Returns as soon as the mutation is queued; it runs after everything
    /// queued before it has finished.
    ///
    /// # Errors
    /// Returns [`QueueError::Closed`] if the worker has stopped.
    pub fn enqueue<F, Fut>(&self, mutation: F) -> Result<(), QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job: Mutation = Box::new(move || mutation().boxed());
        self.sender
            .send(Job::Apply(job))
            .map_err(|_| QueueError::Closed)
    }

    /// Append a synchronous mutation
    ///
    /// # Errors
    /// Returns [`QueueError::Closed`] if the worker has stopped.
    pub fn enqueue_sync<F>(&self, mutation: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(move || async move { mutation() })
    }

    /// Wait until every mutation queued before this call has been applied
    ///
    /// # Errors
    /// Returns [`QueueError::Closed`] if the worker stopped first.
    pub async fn flush(&self) -> Result<(), QueueError> {
        let (done, applied) = oneshot::channel();
        self.sender
            .send(Job::Barrier(done))
            .map_err(|_| QueueError::Closed)?;
        applied.await.map_err(|_| QueueError::Closed)
    }

    /// Whether the worker is still accepting work
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

async fn drain(mut receiver: mpsc::UnboundedReceiver<Job>) {
    let mut applied: u64 = 0;
    while let Some(job) = receiver.recv().await {
        match job {
            Job::Apply(mutation) => {
                mutation().await;
                applied += 1;
            }
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!(applied, "mutation queue drained");
}
