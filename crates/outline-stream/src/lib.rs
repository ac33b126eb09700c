//! Outline stream decoding
//!
//! Turns the byte stream of a chat-completions response into the values the
//! rest of the workspace consumes.
//!
//! # Pipeline
//!
//! ```text
//! bytes ─▶ FrameDecoder ─▶ lines ─▶ extract_fragment ─▶ fragments ─▶ RecordAssembler ─▶ RoadmapRecord
//!          (chunk-safe)            (data: JSON)                     (roadmap only)
//! ```
//!
//! Everything here is synchronous and allocation-light; suspension on the
//! transport happens in the callers.
//!
//! # Example
//!
//! ```rust
//! use outline_stream::{FragmentDecoder, RecordAssembler};
//!
//! let mut fragments = FragmentDecoder::new();
//! let mut records = RecordAssembler::new();
//!
//! let chunk = b"data: {\"choices\":[{\"delta\":{\"content\":\"Rust: Ownership | Traits\\n\"}}]}\n";
//! let mut out = Vec::new();
//! for fragment in fragments.push(chunk) {
//!     out.extend(records.push(&fragment));
//! }
//! assert_eq!(out[0].label, "Rust");
//! assert_eq!(out[0].children, vec!["Ownership", "Traits"]);
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

mod event;
mod frame;
mod record;

pub use event::{extract_fragment, FragmentDecoder, DATA_PREFIX, DONE_SENTINEL};
pub use frame::{FrameDecoder, Lines, LINE_DELIMITER};
pub use record::{RecordAssembler, RecordError, RoadmapRecord, CHILD_DELIMITER, LABEL_SEPARATOR};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
