//! Arena-backed topic tree and the streaming merge
//!
//! Nodes live in a persistent map keyed by [`NodeId`]; parents and children
//! reference each other by id. Cloning a [`TopicTree`] is O(1) and shares
//! every node, so "return a new tree" costs only the nodes actually touched.

use crate::chain::TopicChain;
use crate::error::TreeError;
use crate::node::{Message, NodeId, TopicNode};
use im::HashMap;
use outline_stream::RoadmapRecord;

/// What a merge did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Tree was empty; a root was created from the record
    Planted(NodeId),
    /// Children of an existing node were replaced
    Extended(NodeId),
    /// No node carries the record's label; nothing changed
    Unmatched,
}

impl MergeOutcome {
    /// Whether the tree changed
    #[inline]
    #[must_use]
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::Unmatched)
    }
}

/// Topic breakdown tree
///
/// # Invariants
/// - At most one root; every other node has exactly one parent
/// - `chain(child) == chain(parent) + label(child)`
/// - Merges never touch messages, notes or read flags of nodes that survive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicTree {
    root: Option<NodeId>,
    nodes: HashMap<NodeId, TopicNode>,
}

impl TopicTree {
    /// Create empty tree
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no record has been merged yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Root id
    #[inline]
    #[must_use]
    pub fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    /// Root node
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<&TopicNode> {
        self.root.and_then(|id| self.nodes.get(&id))
    }

    /// Node by id
    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&TopicNode> {
        self.nodes.get(&id)
    }

    /// Whether `id` is in the tree
    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Children of `id` in order
    pub fn children_of(&self, id: NodeId) -> impl Iterator<Item = &TopicNode> {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.nodes.get(child))
    }

    /// Depth-first, pre-order walk yielding `(depth, node)`; the root is depth 0
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: self.root.map(|id| vec![(0, id)]).unwrap_or_default(),
        }
    }

    /// First node in depth-first order whose label equals `label`
    ///
    /// Labels can repeat across branches; the earliest match wins.
    #[must_use]
    pub fn find_by_label(&self, label: &str) -> Option<NodeId> {
        self.walk()
            .find(|(_, node)| node.label == label)
            .map(|(_, node)| node.id)
    }

    /// Merge one roadmap record
    ///
    /// - Empty tree: plant an expanded root labelled `record.label`
    /// - Otherwise: replace the children of the first node labelled
    ///   `record.label`; a child whose label already existed under that
    ///   node is carried over intact (conversation, notes, flags, subtree)
    /// - No such node: the record is dropped
    ///
    /// Re-merging an unchanged record leaves the tree as it was.
    pub fn merge(&mut self, record: &RoadmapRecord) -> MergeOutcome {
        if self.root.is_none() {
            return MergeOutcome::Planted(self.plant(record));
        }

        match self.find_by_label(&record.label) {
            Some(id) => {
                self.replace_children(id, &record.children);
                MergeOutcome::Extended(id)
            }
            None => {
                tracing::debug!(label = %record.label, "no node matches record label, dropping");
                MergeOutcome::Unmatched
            }
        }
    }

    /// Merge into a copy, leaving `self` untouched
    #[must_use]
    pub fn merged(&self, record: &RoadmapRecord) -> (Self, MergeOutcome) {
        let mut next = self.clone();
        let outcome = next.merge(record);
        (next, outcome)
    }

    fn plant(&mut self, record: &RoadmapRecord) -> NodeId {
        let mut root = TopicNode::new(&record.label, TopicChain::root(&record.label), None);
        root.is_expanded = true;
        let id = root.id;
        self.nodes.insert(id, root);
        self.root = Some(id);
        self.replace_children(id, &record.children);
        id
    }

    fn replace_children(&mut self, parent: NodeId, labels: &[String]) {
        let Some(node) = self.nodes.get(&parent) else {
            return;
        };
        let chain = node.chain.clone();
        let current = node.children.clone();

        let mut previous: Vec<Option<NodeId>> = current.iter().copied().map(Some).collect();
        let mut next = Vec::with_capacity(labels.len());

        for label in labels {
            let reused = previous
                .iter_mut()
                .find(|slot| {
                    slot.is_some_and(|id| {
                        self.nodes.get(&id).is_some_and(|n| n.label == *label)
                    })
                })
                .and_then(Option::take);

            let id = match reused {
                Some(id) => id,
                None => {
                    let child = TopicNode::new(label, chain.child(label), Some(parent));
                    let id = child.id;
                    self.nodes.insert(id, child);
                    id
                }
            };
            next.push(id);
        }

        for stale in previous.into_iter().flatten() {
            self.remove_subtree(stale);
        }

        if next != current {
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.children = next;
            }
        }
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children);
            }
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut TopicNode, TreeError> {
        self.nodes.get_mut(&id).ok_or(TreeError::NodeNotFound(id))
    }

    /// Set the expanded flag; returns whether it changed
    ///
    /// # Errors
    /// Returns [`TreeError::NodeNotFound`] for an unknown id.
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> Result<bool, TreeError> {
        let node = self.get(id).ok_or(TreeError::NodeNotFound(id))?;
        if node.is_expanded == expanded {
            return Ok(false);
        }
        self.node_mut(id)?.is_expanded = expanded;
        Ok(true)
    }

    /// Flip the expanded flag; returns the new state
    ///
    /// # Errors
    /// Returns [`TreeError::NodeNotFound`] for an unknown id.
    pub fn toggle_expanded(&mut self, id: NodeId) -> Result<bool, TreeError> {
        let node = self.node_mut(id)?;
        node.is_expanded = !node.is_expanded;
        Ok(node.is_expanded)
    }

    /// Expand every node; returns whether anything changed
    pub fn expand_all(&mut self) -> bool {
        self.set_all_expanded(|_| true)
    }

    /// Collapse every node except the root; returns whether anything changed
    pub fn collapse_all(&mut self) -> bool {
        let root = self.root;
        self.set_all_expanded(|id| Some(id) == root)
    }

    /// Whether every node, leaves included, is expanded
    #[must_use]
    pub fn all_expanded(&self) -> bool {
        !self.is_empty() && self.nodes.values().all(|node| node.is_expanded)
    }

    fn set_all_expanded(&mut self, expanded: impl Fn(NodeId) -> bool) -> bool {
        let stale: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.is_expanded != expanded(node.id))
            .map(|node| node.id)
            .collect();
        for id in &stale {
            if let Some(node) = self.nodes.get_mut(id) {
                node.is_expanded = !node.is_expanded;
            }
        }
        !stale.is_empty()
    }

    /// Replace a node's notes; returns whether they changed
    ///
    /// # Errors
    /// Returns [`TreeError::NodeNotFound`] for an unknown id.
    pub fn set_notes(&mut self, id: NodeId, notes: impl Into<String>) -> Result<bool, TreeError> {
        let notes = notes.into();
        let node = self.get(id).ok_or(TreeError::NodeNotFound(id))?;
        if node.notes.as_deref() == Some(notes.as_str()) {
            return Ok(false);
        }
        self.node_mut(id)?.notes = Some(notes);
        Ok(true)
    }

    /// Replace a node's conversation; returns whether it changed
    ///
    /// # Errors
    /// Returns [`TreeError::NodeNotFound`] for an unknown id.
    pub fn set_messages(&mut self, id: NodeId, messages: Vec<Message>) -> Result<bool, TreeError> {
        let node = self.get(id).ok_or(TreeError::NodeNotFound(id))?;
        if node.messages == messages {
            return Ok(false);
        }
        self.node_mut(id)?.messages = messages;
        Ok(true)
    }

    /// Follow child labels down from the root
    ///
    /// Matching ignores case and treats `-` as a space, so slug-style
    /// segments (`"one-sided-limits"`) resolve. Returns `None` unless every
    /// segment matches; an empty path resolves to the root.
    #[must_use]
    pub fn resolve_labels<S: AsRef<str>>(&self, path: &[S]) -> Option<NodeId> {
        let mut current = self.root?;
        for segment in path {
            let wanted = loose_label(segment.as_ref());
            current = self
                .children_of(current)
                .find(|child| loose_label(&child.label) == wanted)?
                .id;
        }
        Some(current)
    }

    /// Like [`resolve_labels`](Self::resolve_labels), but stops at the first
    /// segment that does not match and returns the node reached so far
    ///
    /// Returns `None` only for an empty tree.
    #[must_use]
    pub fn resolve_deepest<S: AsRef<str>>(&self, path: &[S]) -> Option<NodeId> {
        let mut current = self.root?;
        for segment in path {
            let wanted = loose_label(segment.as_ref());
            match self.children_of(current).find(|child| loose_label(&child.label) == wanted) {
                Some(child) => current = child.id,
                None => break,
            }
        }
        Some(current)
    }

    /// Nodes whose label contains `query` (case-insensitive), depth-first
    ///
    /// A blank query matches nothing.
    #[must_use]
    pub fn find_matching(&self, query: &str) -> Vec<NodeId> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.walk()
            .filter(|(_, node)| node.label.to_lowercase().contains(&query))
            .map(|(_, node)| node.id)
            .collect()
    }

    pub(crate) fn insert_node(&mut self, node: TopicNode) {
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn node_entry(&mut self, id: NodeId) -> Option<&mut TopicNode> {
        self.nodes.get_mut(&id)
    }

    pub(crate) fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }
}

fn loose_label(label: &str) -> String {
    label.to_lowercase().replace('-', " ")
}

/// Pre-order iterator returned by [`TopicTree::walk`]
#[derive(Debug)]
pub struct Walk<'a> {
    tree: &'a TopicTree,
    stack: Vec<(usize, NodeId)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a TopicNode);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (depth, id) = self.stack.pop()?;
            let Some(node) = self.tree.nodes.get(&id) else {
                continue;
            };
            self.stack
                .extend(node.children.iter().rev().map(|child| (depth + 1, *child)));
            return Some((depth, node));
        }
    }
}
