//! Topic chains
//!
//! Provides [`TopicChain`], the ordered labels from the root to a node.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Separator used when a chain is rendered for people or prompts
pub const CHAIN_SEPARATOR: &str = " -> ";

/// Labels from the root to a node, inclusive
///
/// A node's chain is its parent's chain plus its own label and never
/// changes after the node is created, which makes it usable as a stable
/// external path even though node ids are session-local.
///
/// # Examples
/// - `["Calculus"]` → `Calculus`
/// - `["Calculus", "Limits", "Continuity"]` → `Calculus -> Limits -> Continuity`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicChain(Vec<String>);

impl TopicChain {
    /// Create chain from labels
    #[inline]
    #[must_use]
    pub fn new(labels: Vec<String>) -> Self {
        Self(labels)
    }

    /// Chain of a root node
    #[inline]
    #[must_use]
    pub fn root(label: impl Into<String>) -> Self {
        Self(vec![label.into()])
    }

    /// Labels, root first
    #[inline]
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.0
    }

    /// Depth of the node this chain addresses (root = 1)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True only for a chain built with no labels
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Root label
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Label of the addressed node
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Chain of the parent node, if any
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(Self(self.0[..n - 1].to_vec())),
        }
    }

    /// Chain of a child labelled `label`
    #[inline]
    #[must_use]
    pub fn child(&self, label: impl Into<String>) -> Self {
        let mut labels = self.0.clone();
        labels.push(label.into());
        Self(labels)
    }

    /// Whether this chain addresses `other` or one of its ancestors
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Whether this chain addresses a strict ancestor of `other`
    #[inline]
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && self.is_prefix_of(other)
    }

    /// Iterate labels from root to leaf
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Join labels with a custom separator
    #[inline]
    #[must_use]
    pub fn join(&self, separator: &str) -> String {
        self.0.join(separator)
    }
}

impl Display for TopicChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join(CHAIN_SEPARATOR))
    }
}

impl From<Vec<String>> for TopicChain {
    fn from(labels: Vec<String>) -> Self {
        Self(labels)
    }
}

impl From<&[&str]> for TopicChain {
    fn from(labels: &[&str]) -> Self {
        Self(labels.iter().map(|l| (*l).to_string()).collect())
    }
}
