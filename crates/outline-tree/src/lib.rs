//! Outline topic tree
//!
//! Holds the breakdown produced by the roadmap stream and the per-node
//! conversations, and implements the two structural edits the session
//! performs on it.
//!
//! # Overview
//!
//! - **TopicTree**: arena of [`TopicNode`]s in a persistent map; clones share structure
//! - **merge**: fold one [`RoadmapRecord`](outline_stream::RoadmapRecord) into the tree
//! - **select**: mark a node read and expand the path to it
//! - **NodeSnapshot**: nested JSON export/import
//!
//! # Example
//!
//! ```rust
//! use outline_stream::RoadmapRecord;
//! use outline_tree::TopicTree;
//!
//! let mut tree = TopicTree::new();
//! tree.merge(&RoadmapRecord::parse("Rust: Ownership | Traits").unwrap());
//! tree.merge(&RoadmapRecord::parse("Traits: Generics | Objects").unwrap());
//!
//! let objects = tree.find_by_label("Objects").unwrap();
//! tree.select(objects).unwrap();
//!
//! let traits = tree.find_by_label("Traits").unwrap();
//! assert!(tree.get(traits).unwrap().is_expanded());
//! assert_eq!(tree.get(objects).unwrap().chain().to_string(), "Rust -> Traits -> Objects");
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod chain;
pub mod error;
pub mod expand;
pub mod node;
pub mod snapshot;
pub mod tree;

pub use chain::{TopicChain, CHAIN_SEPARATOR};
pub use error::TreeError;
pub use expand::Ancestors;
pub use node::{Message, NodeId, Role, TopicNode};
pub use snapshot::NodeSnapshot;
pub use tree::{MergeOutcome, TopicTree, Walk};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
