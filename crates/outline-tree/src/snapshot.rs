//! Portable tree snapshots
//!
//! A snapshot is a nested JSON document:
//!
//! ```json
//! {
//!   "id": "01J…",
//!   "label": "Calculus",
//!   "chain": ["Calculus"],
//!   "messages": [{ "role": "user", "content": "…" }],
//!   "children": [ … ],
//!   "isRead": false,
//!   "notes": "…"
//! }
//! ```
//!
//! View state (expanded flags) is not exported. On import the root comes
//! back expanded, everything else collapsed.

use crate::chain::TopicChain;
use crate::error::TreeError;
use crate::node::{Message, NodeId, TopicNode};
use crate::tree::TopicTree;
use serde::{Deserialize, Serialize};

/// One node of an exported tree, children nested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    /// Node id as a ULID string
    #[serde(default)]
    pub id: String,
    /// Display label
    pub label: String,
    /// Labels from the root, inclusive
    #[serde(default)]
    pub chain: Vec<String>,
    /// Conversation
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Children in order
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
    /// Selected at least once
    #[serde(default)]
    pub is_read: bool,
    /// User-authored notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TopicTree {
    /// Export the tree as nested snapshots
    ///
    /// # Errors
    /// Returns [`TreeError::EmptySnapshot`] if nothing has been merged.
    pub fn to_snapshot(&self) -> Result<NodeSnapshot, TreeError> {
        let root = self.root_id().ok_or(TreeError::EmptySnapshot)?;
        self.snapshot_of(root).ok_or(TreeError::NodeNotFound(root))
    }

    fn snapshot_of(&self, id: NodeId) -> Option<NodeSnapshot> {
        let node = self.get(id)?;
        Some(NodeSnapshot {
            id: node.id().to_string(),
            label: node.label().to_string(),
            chain: node.chain().labels().to_vec(),
            messages: node.messages().to_vec(),
            children: node
                .children()
                .iter()
                .filter_map(|child| self.snapshot_of(*child))
                .collect(),
            is_read: node.is_read(),
            notes: node.notes().map(str::to_string),
        })
    }

    /// Rebuild a tree from a snapshot
    ///
    /// Chains are recomputed from the nesting, so a stale or hand-edited
    /// `chain` field cannot break the chain invariant. Ids that fail to
    /// parse or repeat an earlier id are replaced with fresh ones.
    #[must_use]
    pub fn from_snapshot(snapshot: NodeSnapshot) -> Self {
        let mut tree = Self::new();
        let root = tree.import(snapshot, None);
        tree.set_root(root);
        if let Some(node) = tree.node_entry(root) {
            node.is_expanded = true;
        }
        tree
    }

    fn import(&mut self, snapshot: NodeSnapshot, parent: Option<(NodeId, &TopicChain)>) -> NodeId {
        let chain = match parent {
            Some((_, chain)) => chain.child(&snapshot.label),
            None => TopicChain::root(&snapshot.label),
        };
        if !snapshot.chain.is_empty() && snapshot.chain.as_slice() != chain.labels() {
            tracing::debug!(label = %snapshot.label, "snapshot chain disagrees with nesting, recomputing");
        }

        let id = match snapshot.id.parse::<NodeId>() {
            Ok(id) if !self.contains(id) => id,
            _ => NodeId::new(),
        };

        let mut node = TopicNode::new(snapshot.label, chain.clone(), parent.map(|(id, _)| id));
        node.id = id;
        node.messages = snapshot.messages;
        node.is_read = snapshot.is_read;
        node.notes = snapshot.notes;
        self.insert_node(node);

        let children: Vec<NodeId> = snapshot
            .children
            .into_iter()
            .map(|child| self.import(child, Some((id, &chain))))
            .collect();
        if let Some(node) = self.node_entry(id) {
            node.children = children;
        }
        id
    }

    /// Export as pretty-printed JSON
    ///
    /// # Errors
    /// Returns [`TreeError::EmptySnapshot`] for an empty tree.
    pub fn to_json(&self) -> Result<String, TreeError> {
        Ok(serde_json::to_string_pretty(&self.to_snapshot()?)?)
    }

    /// Import from JSON produced by [`to_json`](Self::to_json)
    ///
    /// # Errors
    /// Returns [`TreeError::Snapshot`] if the document does not parse.
    pub fn from_json(json: &str) -> Result<Self, TreeError> {
        let snapshot: NodeSnapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }
}
