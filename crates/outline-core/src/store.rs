//! Tree store
//!
//! Owns the current [`TopicTree`] behind a `watch` channel. All writes go
//! through the [`MutationQueue`]; readers take cheap clones or subscribe.
//!
//! Each breakdown run gets a generation number. Merges carry the generation
//! they were produced under and are ignored once the store has moved on,
//! so a stream that outlives its topic cannot write into the next tree.

use crate::error::QueueError;
use crate::queue::MutationQueue;
use outline_stream::RoadmapRecord;
use outline_tree::TopicTree;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// Tree plus the generation that produced it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeState {
    /// Breakdown run the tree belongs to
    pub generation: u64,
    /// Current tree
    pub tree: TopicTree,
}

/// Shared, queue-serialized tree state
#[derive(Debug, Clone)]
pub struct TreeStore {
    state: Arc<watch::Sender<TreeState>>,
    issued: Arc<AtomicU64>,
    queue: MutationQueue,
}

impl TreeStore {
    /// Create empty store writing through `queue`
    #[must_use]
    pub fn new(queue: MutationQueue) -> Self {
        let (state, _) = watch::channel(TreeState::default());
        Self {
            state: Arc::new(state),
            issued: Arc::new(AtomicU64::new(0)),
            queue,
        }
    }

    /// Observe every applied change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TreeState> {
        self.state.subscribe()
    }

    /// Current state
    ///
    /// Reflects only mutations already applied; call
    /// [`flush`](Self::flush) first to include everything queued.
    #[must_use]
    pub fn current(&self) -> TreeState {
        self.state.borrow().clone()
    }

    /// Current tree
    #[must_use]
    pub fn tree(&self) -> TopicTree {
        self.state.borrow().tree.clone()
    }

    /// Most recently issued generation, possibly not yet applied
    #[inline]
    #[must_use]
    pub fn latest_generation(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Queue handle this store writes through
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    /// Queue replacement of the tree, starting a new generation
    ///
    /// Returns the new generation immediately; it takes effect once the
    /// queue reaches it.
    ///
    /// # Errors
    /// Returns [`QueueError::Closed`] if the worker has stopped.
    pub fn reset(&self, tree: TopicTree) -> Result<u64, QueueError> {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let state = Arc::clone(&self.state);
        self.queue.enqueue_sync(move || {
            state.send_replace(TreeState { generation, tree });
            tracing::debug!(generation, "tree reset");
        })?;
        Ok(generation)
    }

    /// Queue a record merge for `generation`
    ///
    /// # Errors
    /// Returns [`QueueError::Closed`] if the worker has stopped.
    pub fn merge(&self, generation: u64, record: RoadmapRecord) -> Result<(), QueueError> {
        let state = Arc::clone(&self.state);
        self.queue.enqueue_sync(move || {
            state.send_if_modified(|current| {
                if current.generation != generation {
                    tracing::debug!(
                        label = %record.label,
                        stale = generation,
                        current = current.generation,
                        "ignoring merge from superseded breakdown"
                    );
                    return false;
                }
                current.tree.merge(&record).is_applied()
            });
        })
    }

    /// Queue an edit without waiting for it
    ///
    /// `edit` returns whether it changed the tree; observers are only woken
    /// when it did.
    ///
    /// # Errors
    /// Returns [`QueueError::Closed`] if the worker has stopped.
    pub fn submit<F>(&self, edit: F) -> Result<(), QueueError>
    where
        F: FnOnce(&mut TopicTree) -> bool + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        self.queue.enqueue_sync(move || {
            state.send_if_modified(|current| edit(&mut current.tree));
        })
    }

    /// Queue an edit and wait for its result
    ///
    /// `edit` returns `(changed, value)`.
    ///
    /// # Errors
    /// Returns [`QueueError::Closed`] if the worker stops first.
    pub async fn apply<R, F>(&self, edit: F) -> Result<R, QueueError>
    where
        F: FnOnce(&mut TopicTree) -> (bool, R) + Send + 'static,
        R: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let state = Arc::clone(&self.state);
        self.queue.enqueue_sync(move || {
            let mut value = None;
            state.send_if_modified(|current| {
                let (changed, out) = edit(&mut current.tree);
                value = Some(out);
                changed
            });
            if let Some(value) = value {
                let _ = reply.send(value);
            }
        })?;
        result.await.map_err(|_| QueueError::Closed)
    }

    /// Wait for every queued mutation to land
    ///
    /// # Errors
    /// Returns [`QueueError::Closed`] if the worker stopped.
    pub async fn flush(&self) -> Result<(), QueueError> {
        self.queue.flush().await
    }
}
