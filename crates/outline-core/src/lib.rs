//! Outline core
//!
//! Streams a topic breakdown into a [`TopicTree`](outline_tree::TopicTree)
//! and per-topic conversations into the tree's nodes.
//!
//! # Overview
//!
//! - **BreakdownSession**: one topic, its tree, the selected node and its chat
//! - **MutationQueue**: single-consumer FIFO every tree edit goes through
//! - **TreeStore**: generation-tagged tree state behind a `watch` channel
//! - **ChatDeltaMerger**: applies reply fragments to a conversation
//! - **CompletionTransport**: HTTP or recorded byte streams
//!
//! # Example
//!
//! ```rust
//! use outline_core::ChatDeltaMerger;
//! use outline_tree::Message;
//!
//! let mut merger = ChatDeltaMerger::new(vec![Message::assistant("...")], "...");
//! merger.apply("Hel");
//! merger.apply("lo");
//! assert_eq!(merger.messages()[0].content, "Hello");
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod chat;
pub mod config;
pub mod error;
pub mod pump;
pub mod queue;
pub mod reply;
pub mod request;
pub mod roadmap;
pub mod session;
pub mod store;
pub mod transport;

pub use chat::{extract_questions, normalize_messages, strip_questions, ChatDeltaMerger, Conversation};
pub use config::OutlineConfig;
pub use error::{ConfigError, QueueError, SessionError, TransportError};
pub use pump::{pump_fragments, PumpEnd};
pub use queue::MutationQueue;
pub use reply::{ChatHandle, ChatSummary};
pub use request::{sanitize_topic, ChatRequest, WireMessage};
pub use roadmap::{RoadmapHandle, RoadmapSummary};
pub use session::BreakdownSession;
pub use store::{TreeState, TreeStore};
pub use transport::{ByteStream, CompletionTransport, HttpTransport, ReplayTransport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
