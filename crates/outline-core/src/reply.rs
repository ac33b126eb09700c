//! Assistant reply stream driver
//!
//! Streams one assistant reply into a node's conversation. Every change is
//! published to the conversation observers and written back to the node
//! through the mutation queue.

use crate::chat::{ChatDeltaMerger, Conversation};
use crate::error::{QueueError, SessionError};
use crate::pump::{pump_fragments, PumpEnd};
use crate::request::ChatRequest;
use crate::store::TreeStore;
use crate::transport::CompletionTransport;
use outline_tree::{Message, NodeId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Outcome of one reply stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    /// Node the reply belongs to
    pub node: NodeId,
    /// Fragments merged
    pub fragments: usize,
    /// Final content of the assistant message
    pub reply: String,
    /// Whether the stream was stopped before it ended
    pub cancelled: bool,
}

pub(crate) struct ReplyRun {
    pub(crate) transport: Arc<dyn CompletionTransport>,
    pub(crate) request: ChatRequest,
    pub(crate) node: NodeId,
    pub(crate) stream: u64,
    pub(crate) merger: ChatDeltaMerger,
    pub(crate) conversation: Arc<watch::Sender<Conversation>>,
    pub(crate) store: TreeStore,
}

impl ReplyRun {
    pub(crate) fn spawn(self, cancel: CancellationToken) -> ChatHandle {
        let node = self.node;
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { self.run(&task_cancel).await });
        ChatHandle { node, cancel, task }
    }

    async fn run(mut self, cancel: &CancellationToken) -> Result<ChatSummary, SessionError> {
        tracing::info!(node = %self.node, model = %self.request.model, "reply stream starting");

        let stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(self.summary(0, true)),
            opened = self.transport.open(&self.request) => opened?,
        };

        let mut fragments = 0;
        let mut queue_error = None;
        let end = pump_fragments(stream, cancel, |fragment| {
            if !self.merger.apply(&fragment) {
                return;
            }
            fragments += 1;
            match publish(&self.conversation, &self.store, self.node, self.stream, self.merger.messages()) {
                Ok(true) => {}
                Ok(false) => tracing::debug!(node = %self.node, stream = self.stream, "reply superseded, not shown"),
                Err(e) => {
                    queue_error.get_or_insert(e);
                }
            }
        })
        .await;

        if let Some(e) = queue_error {
            return Err(e.into());
        }
        let end = end?;
        self.store.flush().await?;

        let summary = self.summary(fragments, end == PumpEnd::Cancelled);
        tracing::info!(
            node = %self.node,
            fragments,
            cancelled = summary.cancelled,
            "reply stream finished"
        );
        Ok(summary)
    }

    fn summary(&self, fragments: usize, cancelled: bool) -> ChatSummary {
        ChatSummary {
            node: self.node,
            fragments,
            reply: self
                .merger
                .messages()
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            cancelled,
        }
    }
}

/// Show `messages` for `node` and queue the write-back to the tree
///
/// Only the stream that last claimed the conversation may write; returns
/// `false` when `stream` has been superseded or `node` is no longer shown.
pub(crate) fn publish(
    conversation: &watch::Sender<Conversation>,
    store: &TreeStore,
    node: NodeId,
    stream: u64,
    messages: &[Message],
) -> Result<bool, QueueError> {
    write_back(conversation, store, node, messages, |current| current.stream == stream)
}

/// Hand the conversation of `node` to `stream`, then publish `messages`
///
/// Every earlier stream loses write access.
pub(crate) fn claim(
    conversation: &watch::Sender<Conversation>,
    store: &TreeStore,
    node: NodeId,
    stream: u64,
    messages: &[Message],
) -> Result<bool, QueueError> {
    write_back(conversation, store, node, messages, |current| {
        current.stream = stream;
        true
    })
}

// The ownership check, the update and the queued tree write happen under
// the conversation's lock, so writes reach the queue in ownership order.
fn write_back(
    conversation: &watch::Sender<Conversation>,
    store: &TreeStore,
    node: NodeId,
    messages: &[Message],
    owns: impl FnOnce(&mut Conversation) -> bool,
) -> Result<bool, QueueError> {
    let mut queued = Ok(false);
    conversation.send_if_modified(|current| {
        if current.node != Some(node) || !owns(current) {
            return false;
        }
        current.messages = messages.to_vec();
        let messages = messages.to_vec();
        queued = store
            .submit(move |tree| tree.set_messages(node, messages).unwrap_or(false))
            .map(|()| true);
        true
    });
    queued
}

/// Handle to a running reply stream
#[derive(Debug)]
pub struct ChatHandle {
    node: NodeId,
    cancel: CancellationToken,
    task: JoinHandle<Result<ChatSummary, SessionError>>,
}

impl ChatHandle {
    /// Node being answered
    #[inline]
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Stop the stream; text received so far is kept
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the stream has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the stream to end and its write-backs to land
    ///
    /// # Errors
    /// Returns [`SessionError::Transport`] if the stream failed.
    pub async fn wait(self) -> Result<ChatSummary, SessionError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(SessionError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MutationQueue;
    use outline_stream::RoadmapRecord;
    use outline_tree::TopicTree;

    async fn store_with_root() -> (TreeStore, NodeId) {
        let mut tree = TopicTree::new();
        tree.merge(&RoadmapRecord::parse("A: B").unwrap());
        let root = tree.root_id().unwrap();
        let store = TreeStore::new(MutationQueue::spawn());
        store.reset(tree).unwrap();
        store.flush().await.unwrap();
        (store, root)
    }

    #[tokio::test]
    async fn superseded_stream_cannot_overwrite() {
        let (store, root) = store_with_root().await;
        let (conversation, _) = watch::channel(Conversation::new(root, Vec::new()));

        let old = vec![Message::user("q"), Message::assistant("...")];
        assert!(claim(&conversation, &store, root, 1, &old).unwrap());
        let new = vec![Message::user("again"), Message::assistant("...")];
        assert!(claim(&conversation, &store, root, 2, &new).unwrap());

        // late chunk from the first stream
        let late = vec![Message::user("q"), Message::assistant("stale")];
        assert!(!publish(&conversation, &store, root, 1, &late).unwrap());

        let fresh = vec![Message::user("again"), Message::assistant("fresh")];
        assert!(publish(&conversation, &store, root, 2, &fresh).unwrap());
        store.flush().await.unwrap();

        assert_eq!(conversation.borrow().messages, fresh);
        assert_eq!(store.tree().get(root).unwrap().messages(), fresh.as_slice());
    }

    #[tokio::test]
    async fn writes_for_hidden_node_are_dropped() {
        let (store, root) = store_with_root().await;
        let other = store.tree().find_by_label("B").unwrap();
        let (conversation, _) = watch::channel(Conversation::new(other, Vec::new()));

        let messages = vec![Message::assistant("x")];
        assert!(!claim(&conversation, &store, root, 1, &messages).unwrap());
        assert!(!publish(&conversation, &store, root, 0, &messages).unwrap());
        store.flush().await.unwrap();

        assert!(conversation.borrow().messages.is_empty());
        assert!(store.tree().get(root).unwrap().messages().is_empty());
    }
}
