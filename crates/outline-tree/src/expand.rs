//! Path expansion and read propagation
//!
//! Selecting a node marks it read and expands every ancestor so the node is
//! visible in the outline. The walk follows parent links, so it costs
//! O(depth) no matter how large the tree is.

use crate::error::TreeError;
use crate::node::{NodeId, TopicNode};
use crate::tree::TopicTree;

impl TopicTree {
    /// Mark `target` read and expand its ancestors
    ///
    /// The target's own expanded flag is left alone, as is every node off
    /// the root-to-target path. Nodes are only rewritten when a flag
    /// actually flips; the return value reports whether anything did.
    ///
    /// # Errors
    /// Returns [`TreeError::NodeNotFound`] for an unknown id.
    pub fn select(&mut self, target: NodeId) -> Result<bool, TreeError> {
        let node = self.get(target).ok_or(TreeError::NodeNotFound(target))?;
        let mut cursor = node.parent();
        let mut changed = false;

        if !node.is_read() {
            if let Some(node) = self.node_entry(target) {
                node.is_read = true;
            }
            changed = true;
        }

        while let Some(id) = cursor {
            let Some(ancestor) = self.get(id) else {
                break;
            };
            cursor = ancestor.parent();
            if !ancestor.is_expanded() {
                if let Some(ancestor) = self.node_entry(id) {
                    ancestor.is_expanded = true;
                }
                changed = true;
            }
        }

        Ok(changed)
    }

    /// [`select`](Self::select) on a copy, leaving `self` untouched
    ///
    /// # Errors
    /// Returns [`TreeError::NodeNotFound`] for an unknown id.
    pub fn selected(&self, target: NodeId) -> Result<Self, TreeError> {
        let mut next = self.clone();
        next.select(target)?;
        Ok(next)
    }

    /// Ancestors of `id`, nearest first
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).and_then(TopicNode::parent),
        }
    }

    /// Ids from the root down to `id`, inclusive
    ///
    /// Empty if `id` is not in the tree.
    #[must_use]
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut path: Vec<NodeId> = self.ancestors(id).map(TopicNode::id).collect();
        path.reverse();
        path.push(id);
        path
    }
}

/// Iterator returned by [`TopicTree::ancestors`]
#[derive(Debug)]
pub struct Ancestors<'a> {
    tree: &'a TopicTree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a TopicNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.get(self.next?)?;
        self.next = node.parent();
        Some(node)
    }
}
