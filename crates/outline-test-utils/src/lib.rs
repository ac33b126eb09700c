//! Testing utilities for Outline workspace
//!
//! Scripted transports, SSE frame builders and sample trees.

#![allow(missing_docs)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use outline_core::{ByteStream, ChatRequest, CompletionTransport, TransportError};
use outline_stream::RoadmapRecord;
use outline_tree::TopicTree;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// One `data:` frame carrying `text` as a delta
pub fn sse_frame(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
    )
}

/// Stream terminator frame
pub fn sse_done() -> String {
    "data: [DONE]\n\n".to_string()
}

/// Full response body delivering `fragments` in order
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body: String = fragments.iter().map(|f| sse_frame(f)).collect();
    body.push_str(&sse_done());
    body
}

/// Response body delivering `text` in fragments of at most `size` chars
pub fn sse_body_chunked(text: &str, size: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let fragments: Vec<String> = chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect();
    let refs: Vec<&str> = fragments.iter().map(String::as_str).collect();
    sse_body(&refs)
}

/// Tree built by merging `lines` in order
pub fn tree_from_lines(lines: &[&str]) -> TopicTree {
    let mut tree = TopicTree::new();
    for line in lines {
        let record = RoadmapRecord::parse(line).unwrap();
        tree.merge(&record);
    }
    tree
}

/// `Calculus` with two levels of subtopics
pub fn sample_tree() -> TopicTree {
    tree_from_lines(&[
        "Calculus: Limits | Derivatives | Integrals",
        "Limits: One-sided limits | Continuity",
        "Derivatives: Chain rule | Product rule",
    ])
}

/// Pre-recorded response for one `open` call
#[derive(Debug, Clone, Default)]
pub struct Script {
    chunks: Vec<Vec<u8>>,
    delay: Duration,
    fail_after: Option<usize>,
    reject: Option<u16>,
    hold_open: bool,
}

impl Script {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    /// Body cut into `chunk_size`-byte chunks
    pub fn from_body(body: &str, chunk_size: usize) -> Self {
        Self::new(
            body.as_bytes()
                .chunks(chunk_size.max(1))
                .map(<[u8]>::to_vec)
                .collect(),
        )
    }

    /// Sleep before every chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Yield a 500 error after `n` chunks
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Refuse to open with `status`
    pub fn rejected(status: u16) -> Self {
        Self {
            reject: Some(status),
            ..Self::default()
        }
    }

    /// Never end after the last chunk
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    fn into_stream(self) -> ByteStream {
        let mut items: Vec<Result<Vec<u8>, TransportError>> = Vec::new();
        for (i, chunk) in self.chunks.into_iter().enumerate() {
            if self.fail_after == Some(i) {
                break;
            }
            items.push(Ok(chunk));
        }
        if self.fail_after.is_some() {
            items.push(Err(TransportError::Status {
                status: 500,
                body: "scripted failure".into(),
            }));
        }

        let delay = self.delay;
        let body = stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });
        if self.hold_open {
            body.chain(stream::pending()).boxed()
        } else {
            body.boxed()
        }
    }
}

/// Transport answering each `open` with the next script
///
/// Requests are recorded for inspection. Once scripts run out, opens fail
/// with status 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Single script serving `body` in `chunk_size`-byte chunks
    pub fn with_body(body: &str, chunk_size: usize) -> Self {
        Self::new([Script::from_body(body, chunk_size)])
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().push(request.clone());
        let script = self.scripts.lock().pop_front();
        match script {
            Some(Script {
                reject: Some(status),
                ..
            }) => Err(TransportError::Status {
                status,
                body: "scripted rejection".into(),
            }),
            Some(script) => Ok(script.into_stream()),
            None => Err(TransportError::Status {
                status: 404,
                body: "no script left".into(),
            }),
        }
    }
}
