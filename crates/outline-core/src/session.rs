//! Breakdown session
//!
//! One [`BreakdownSession`] owns one topic tree and the conversation of the
//! selected node. Tree edits of every origin go through the mutation queue;
//! the conversation is written only by the session and its reply stream.
//!
//! # Example
//!
//! ```rust,no_run
//! use outline_core::{BreakdownSession, HttpTransport, OutlineConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OutlineConfig::new();
//! let transport = Arc::new(HttpTransport::from_config(&config)?);
//! let session = BreakdownSession::new(config, transport);
//!
//! let summary = session.start_roadmap("Linear algebra")?.wait().await?;
//! println!("{} records", summary.records);
//!
//! if let Some(root) = session.tree().root_id() {
//!     session.select_node(root).await?;
//!     let reply = session.start_overview()?.expect("fresh node").wait().await?;
//!     println!("{}", reply.reply);
//! }
//! # Ok(())
//! # }
//! ```

use crate::chat::{normalize_messages, ChatDeltaMerger, Conversation};
use crate::config::OutlineConfig;
use crate::error::SessionError;
use crate::queue::MutationQueue;
use crate::reply::{claim, ChatHandle, ReplyRun};
use crate::request::ChatRequest;
use crate::roadmap::{RoadmapHandle, RoadmapRun};
use crate::store::{TreeState, TreeStore};
use crate::transport::CompletionTransport;
use outline_tree::{Message, NodeId, TopicTree};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct SessionState {
    topic: Option<String>,
    selected: Option<NodeId>,
    roadmap: Option<CancellationToken>,
    chat: Option<CancellationToken>,
}

/// Topic breakdown with per-node chat
#[derive(Clone)]
pub struct BreakdownSession {
    config: Arc<OutlineConfig>,
    transport: Arc<dyn CompletionTransport>,
    store: TreeStore,
    conversation: Arc<watch::Sender<Conversation>>,
    state: Arc<Mutex<SessionState>>,
    streams: Arc<AtomicU64>,
}

impl std::fmt::Debug for BreakdownSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakdownSession")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl BreakdownSession {
    /// Create session and spawn its mutation queue
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(config: OutlineConfig, transport: Arc<dyn CompletionTransport>) -> Self {
        let (conversation, _) = watch::channel(Conversation::default());
        Self {
            config: Arc::new(config),
            transport,
            store: TreeStore::new(MutationQueue::spawn()),
            conversation: Arc::new(conversation),
            state: Arc::new(Mutex::new(SessionState::default())),
            streams: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Session configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &OutlineConfig {
        &self.config
    }

    /// Tree as of the last applied mutation
    #[must_use]
    pub fn tree(&self) -> TopicTree {
        self.store.tree()
    }

    /// Observe tree changes
    #[must_use]
    pub fn subscribe_tree(&self) -> watch::Receiver<TreeState> {
        self.store.subscribe()
    }

    /// Conversation of the selected node
    #[must_use]
    pub fn conversation(&self) -> Conversation {
        self.conversation.borrow().clone()
    }

    /// Observe conversation changes
    #[must_use]
    pub fn subscribe_conversation(&self) -> watch::Receiver<Conversation> {
        self.conversation.subscribe()
    }

    /// Selected node
    #[must_use]
    pub fn selected(&self) -> Option<NodeId> {
        self.state.lock().selected
    }

    /// Topic of the current breakdown
    #[must_use]
    pub fn topic(&self) -> Option<String> {
        self.state.lock().topic.clone()
    }

    /// Wait until every queued tree mutation has been applied
    ///
    /// # Errors
    /// Returns [`SessionError::Queue`] if the queue worker stopped.
    pub async fn flush(&self) -> Result<(), SessionError> {
        Ok(self.store.flush().await?)
    }

    fn validate_topic(&self, topic: &str) -> Result<String, SessionError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(SessionError::InvalidTopic("topic is empty".into()));
        }
        let len = topic.chars().count();
        if len > self.config.max_topic_len {
            return Err(SessionError::InvalidTopic(format!(
                "topic is {len} characters, limit is {}",
                self.config.max_topic_len
            )));
        }
        Ok(topic.to_string())
    }

    /// Begin a fresh breakdown of `topic`
    ///
    /// Any running breakdown and reply stream are cancelled, then the tree,
    /// selection and conversation are cleared before the new stream's first
    /// merge can land.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTopic`] for a blank or overlong topic,
    /// or [`SessionError::Queue`] if the queue worker stopped.
    pub fn start_roadmap(&self, topic: &str) -> Result<RoadmapHandle, SessionError> {
        let topic = self.validate_topic(topic)?;
        let cancel = CancellationToken::new();

        let generation = {
            let mut state = self.state.lock();
            if let Some(previous) = state.roadmap.replace(cancel.clone()) {
                previous.cancel();
            }
            if let Some(chat) = state.chat.take() {
                chat.cancel();
            }
            state.selected = None;
            state.topic = Some(topic.clone());
            let generation = self.store.reset(TopicTree::new())?;
            self.conversation.send_replace(Conversation::default());
            generation
        };

        tracing::info!(topic = %topic, generation, "starting breakdown");
        let run = RoadmapRun {
            transport: Arc::clone(&self.transport),
            request: ChatRequest::roadmap(&self.config, &topic),
            store: self.store.clone(),
            generation,
            flush_trailing_record: self.config.flush_trailing_record,
        };
        Ok(run.spawn(cancel))
    }

    /// Cancel the running breakdown, if any
    pub fn stop_roadmap(&self) {
        if let Some(token) = self.state.lock().roadmap.take() {
            token.cancel();
        }
    }

    /// Select a node: mark it read, expand its ancestors, show its chat
    ///
    /// Stored messages are cleaned of blank and placeholder leftovers
    /// before being shown. Selecting a different node stops the reply
    /// stream of the previous one.
    ///
    /// # Errors
    /// Returns [`SessionError::Tree`] for an unknown node, including one
    /// whose tree was replaced while the selection was in flight.
    pub async fn select_node(&self, id: NodeId) -> Result<(), SessionError> {
        let generation = self.store.latest_generation();
        let placeholder = self.config.placeholder.clone();
        let messages = self
            .store
            .apply(move |tree| match tree.select(id) {
                Ok(changed) => {
                    let messages = tree
                        .get(id)
                        .map(|node| normalize_messages(node.messages(), &placeholder))
                        .unwrap_or_default();
                    (changed, Ok(messages))
                }
                Err(e) => (false, Err(e)),
            })
            .await??;

        {
            let mut state = self.state.lock();
            // a new tree was queued while the select ran; `id` belongs to the old one
            if self.store.latest_generation() != generation {
                return Err(outline_tree::TreeError::NodeNotFound(id).into());
            }
            let reselected = state.selected == Some(id);
            if !reselected {
                if let Some(chat) = state.chat.take() {
                    chat.cancel();
                }
            }
            state.selected = Some(id);

            let mut shown = Conversation::new(id, messages);
            if reselected {
                shown.stream = self.conversation.borrow().stream;
            }
            self.conversation.send_replace(shown);
        }
        tracing::debug!(node = %id, "node selected");
        Ok(())
    }

    /// Flip a node's expanded flag; returns the new state
    ///
    /// # Errors
    /// Returns [`SessionError::Tree`] for an unknown node.
    pub async fn toggle_expanded(&self, id: NodeId) -> Result<bool, SessionError> {
        let expanded = self
            .store
            .apply(move |tree| match tree.toggle_expanded(id) {
                Ok(expanded) => (true, Ok(expanded)),
                Err(e) => (false, Err(e)),
            })
            .await??;
        Ok(expanded)
    }

    /// Expand every node; returns whether anything changed
    ///
    /// # Errors
    /// Returns [`SessionError::Queue`] if the queue worker stopped.
    pub async fn expand_all(&self) -> Result<bool, SessionError> {
        Ok(self
            .store
            .apply(|tree| {
                let changed = tree.expand_all();
                (changed, changed)
            })
            .await?)
    }

    /// Collapse every node but the root; returns whether anything changed
    ///
    /// # Errors
    /// Returns [`SessionError::Queue`] if the queue worker stopped.
    pub async fn collapse_all(&self) -> Result<bool, SessionError> {
        Ok(self
            .store
            .apply(|tree| {
                let changed = tree.collapse_all();
                (changed, changed)
            })
            .await?)
    }

    /// Replace the notes of the selected node
    ///
    /// Returns `false` without touching the tree when `id` is not the
    /// selected node or the notes are unchanged.
    ///
    /// # Errors
    /// Returns [`SessionError::Tree`] if the node no longer exists.
    pub async fn update_notes(&self, id: NodeId, notes: impl Into<String>) -> Result<bool, SessionError> {
        if self.selected() != Some(id) {
            return Ok(false);
        }
        let notes = notes.into();
        let changed = self
            .store
            .apply(move |tree| match tree.set_notes(id, notes) {
                Ok(changed) => (changed, Ok(changed)),
                Err(e) => (false, Err(e)),
            })
            .await??;
        Ok(changed)
    }

    /// Replace the tree with an exported snapshot and select its root
    ///
    /// # Errors
    /// Returns [`SessionError::Tree`] if the JSON is not a snapshot.
    pub async fn import_snapshot(&self, json: &str) -> Result<NodeId, SessionError> {
        let tree = TopicTree::from_json(json)?;
        let root = tree.root_id().ok_or(outline_tree::TreeError::EmptySnapshot)?;
        let topic = tree.root().map(|node| node.label().to_string());

        {
            let mut state = self.state.lock();
            if let Some(roadmap) = state.roadmap.take() {
                roadmap.cancel();
            }
            if let Some(chat) = state.chat.take() {
                chat.cancel();
            }
            state.selected = None;
            state.topic = topic;
            self.store.reset(tree)?;
            self.conversation.send_replace(Conversation::default());
        }

        self.select_node(root).await?;
        tracing::info!(root = %root, "snapshot imported");
        Ok(root)
    }

    /// Export the tree once every queued mutation has landed
    ///
    /// # Errors
    /// Returns [`SessionError::Tree`] if the tree is empty.
    pub async fn export_snapshot(&self) -> Result<String, SessionError> {
        self.flush().await?;
        Ok(self.tree().to_json()?)
    }

    /// Resolve child labels from the root, loosely matched
    ///
    /// Returns the deepest node reached; `None` only while the tree is empty.
    #[must_use]
    pub fn resolve_subtopics<S: AsRef<str>>(&self, path: &[S]) -> Option<NodeId> {
        self.tree().resolve_deepest(path)
    }

    /// Nodes whose label contains `query`, case-insensitive
    #[must_use]
    pub fn find_matching(&self, query: &str) -> Vec<NodeId> {
        self.tree().find_matching(query)
    }

    fn selected_node(&self) -> Result<NodeId, SessionError> {
        self.selected().ok_or(SessionError::NoSelection)
    }

    /// Send a user message to the selected node's conversation
    ///
    /// # Errors
    /// Returns [`SessionError::NoSelection`] without a selected node, or
    /// [`SessionError::EmptyMessage`] for blank text.
    pub fn send_message(&self, text: &str) -> Result<ChatHandle, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let node = self.selected_node()?;
        let mut history = self.shown_history();
        history.push(Message::user(text));
        self.stream_reply(node, history)
    }

    /// Drop the message at `index` and everything after, then ask again
    ///
    /// # Errors
    /// Returns [`SessionError::NoSelection`] without a selected node.
    pub fn resend_from(&self, index: usize) -> Result<ChatHandle, SessionError> {
        let node = self.selected_node()?;
        let mut history = self.conversation().messages;
        history.truncate(index);
        history.retain(|message| !message.is_vacant(&self.config.placeholder));
        self.stream_reply(node, history)
    }

    /// Drop the message at `index` and everything after
    ///
    /// # Errors
    /// Returns [`SessionError::NoSelection`] without a selected node.
    pub fn delete_from(&self, index: usize) -> Result<(), SessionError> {
        let node = self.selected_node()?;
        self.stop_chat();
        let mut messages = self.conversation().messages;
        messages.truncate(index);
        claim(&self.conversation, &self.store, node, self.next_stream(), &messages)?;
        Ok(())
    }

    /// Ask for an overview of the selected node if it has no conversation
    ///
    /// The request carries the node's topic chain as its only message.
    /// Returns `None` when the conversation already has messages.
    ///
    /// # Errors
    /// Returns [`SessionError::NoSelection`] without a selected node.
    pub fn start_overview(&self) -> Result<Option<ChatHandle>, SessionError> {
        let node = self.selected_node()?;
        if !self.conversation().is_empty() {
            return Ok(None);
        }
        let chain = self
            .tree()
            .get(node)
            .map(|n| n.chain().to_string())
            .ok_or(outline_tree::TreeError::NodeNotFound(node))?;

        let placeholder = vec![Message::assistant(&self.config.placeholder)];
        let request = ChatRequest::chat(&self.config, &[Message::developer(chain)]);
        self.spawn_reply(node, placeholder, request).map(Some)
    }

    /// Stop the running reply stream, if any
    pub fn stop_chat(&self) {
        if let Some(token) = self.state.lock().chat.take() {
            token.cancel();
        }
    }

    // an unanswered placeholder is left behind when a reply is superseded
    fn shown_history(&self) -> Vec<Message> {
        normalize_messages(&self.conversation().messages, &self.config.placeholder)
    }

    fn next_stream(&self) -> u64 {
        self.streams.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn stream_reply(&self, node: NodeId, history: Vec<Message>) -> Result<ChatHandle, SessionError> {
        let request = ChatRequest::chat(&self.config, &history);
        let mut shown = history;
        shown.push(Message::assistant(&self.config.placeholder));
        self.spawn_reply(node, shown, request)
    }

    fn spawn_reply(
        &self,
        node: NodeId,
        shown: Vec<Message>,
        request: ChatRequest,
    ) -> Result<ChatHandle, SessionError> {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.state.lock().chat.replace(cancel.clone()) {
            previous.cancel();
        }
        let stream = self.next_stream();
        claim(&self.conversation, &self.store, node, stream, &shown)?;

        let run = ReplyRun {
            transport: Arc::clone(&self.transport),
            request,
            node,
            stream,
            merger: ChatDeltaMerger::new(shown, self.config.placeholder.clone()),
            conversation: Arc::clone(&self.conversation),
            store: self.store.clone(),
        };
        Ok(run.spawn(cancel))
    }
}
