//! Tree node and chat message types

use crate::chain::TopicChain;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique node identifier (ULID, assigned at creation)
///
/// Labels come from model output and can repeat across branches; ids
/// never do. Labels are only consulted while merging records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Ulid);

impl NodeId {
    /// Generate new node ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    /// Person asking
    User,
    /// Model reply
    Assistant,
    /// Request-only alias of [`Role::User`]
    Developer,
}

impl Role {
    /// Role as sent on the wire; `developer` travels as `user`
    #[inline]
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Role::Developer => Role::User,
            other => other,
        }
    }

    /// Lowercase wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Developer => "developer",
        }
    }
}

impl From<String> for Role {
    // stored conversations may carry roles this client never writes
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Role::User,
            "developer" => Role::Developer,
            _ => Role::Assistant,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Text, possibly the in-progress placeholder
    pub content: String,
}

impl Message {
    /// Create message
    #[inline]
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// User message
    #[inline]
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Assistant message
    #[inline]
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Developer message
    #[inline]
    #[must_use]
    pub fn developer(content: impl Into<String>) -> Self {
        Self::new(Role::Developer, content)
    }

    /// Whether the content is blank or only the placeholder
    #[inline]
    #[must_use]
    pub fn is_vacant(&self, placeholder: &str) -> bool {
        let trimmed = self.content.trim();
        trimmed.is_empty() || trimmed == placeholder
    }
}

/// A topic in the breakdown tree
///
/// Children are referenced by id; the nodes themselves live in the
/// [`TopicTree`](crate::TopicTree) arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNode {
    pub(crate) id: NodeId,
    pub(crate) label: String,
    pub(crate) chain: TopicChain,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) messages: Vec<Message>,
    pub(crate) is_expanded: bool,
    pub(crate) is_read: bool,
    pub(crate) notes: Option<String>,
}

impl TopicNode {
    pub(crate) fn new(label: impl Into<String>, chain: TopicChain, parent: Option<NodeId>) -> Self {
        Self {
            id: NodeId::new(),
            label: label.into(),
            chain,
            parent,
            children: Vec::new(),
            messages: Vec::new(),
            is_expanded: false,
            is_read: false,
            notes: None,
        }
    }

    /// Node id
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Display label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Labels from root to this node
    #[inline]
    #[must_use]
    pub fn chain(&self) -> &TopicChain {
        &self.chain
    }

    /// Parent id (`None` for the root)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child ids in model order
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the node has children
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Conversation attached to this node
    #[inline]
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Expanded in the outline view
    #[inline]
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.is_expanded
    }

    /// Selected at least once
    #[inline]
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.is_read
    }

    /// User-authored notes
    #[inline]
    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_roundtrips_through_string() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-ulid".parse::<NodeId>().is_err());
    }

    #[test]
    fn developer_normalizes_to_user() {
        assert_eq!(Role::Developer.normalized(), Role::User);
        assert_eq!(Role::Assistant.normalized(), Role::Assistant);
        assert_eq!(Role::User.normalized(), Role::User);
    }

    #[test]
    fn unknown_roles_deserialize_as_assistant() {
        let msg: Message = serde_json::from_str(r#"{"role":"system","content":"x"}"#).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        let msg: Message = serde_json::from_str(r#"{"role":"developer","content":"x"}"#).unwrap();
        assert_eq!(msg.role, Role::Developer);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn vacant_messages() {
        assert!(Message::assistant("...").is_vacant("..."));
        assert!(Message::assistant("  ").is_vacant("..."));
        assert!(!Message::assistant("Hello").is_vacant("..."));
    }

    #[test]
    fn new_node_defaults() {
        let node = TopicNode::new("A", TopicChain::root("A"), None);
        assert!(!node.is_expanded());
        assert!(!node.is_read());
        assert!(node.is_leaf());
        assert!(node.notes().is_none());
        assert!(node.parent().is_none());
    }
}
