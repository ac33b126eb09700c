//! Chat delta merging
//!
//! A chat stream appends to the last message of a conversation, which the
//! caller seeds with a placeholder assistant message before the request
//! goes out. The first fragment replaces the placeholder; later fragments
//! append.

use once_cell::sync::Lazy;
use outline_tree::{Message, NodeId, Role};
use regex::Regex;

static QUESTION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<question>(.*?)</question>").expect("valid question pattern"));

/// Conversation shown for the selected node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    /// Node the conversation belongs to
    pub node: Option<NodeId>,
    /// Messages, oldest first
    pub messages: Vec<Message>,
    /// Reply stream allowed to write here, `0` for none
    pub(crate) stream: u64,
}

impl Conversation {
    /// Create conversation for `node`
    #[inline]
    #[must_use]
    pub fn new(node: NodeId, messages: Vec<Message>) -> Self {
        Self {
            node: Some(node),
            messages,
            stream: 0,
        }
    }

    /// Whether there are no messages
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Applies streamed fragments to a conversation
#[derive(Debug, Clone)]
pub struct ChatDeltaMerger {
    messages: Vec<Message>,
    placeholder: String,
}

impl ChatDeltaMerger {
    /// Create merger over `messages`
    #[must_use]
    pub fn new(messages: Vec<Message>, placeholder: impl Into<String>) -> Self {
        Self {
            messages,
            placeholder: placeholder.into(),
        }
    }

    /// Apply one fragment; returns whether the conversation changed
    ///
    /// Empty fragments are ignored, as are fragments arriving when the last
    /// message is not from the assistant.
    pub fn apply(&mut self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }
        let Some(last) = self.messages.last_mut() else {
            tracing::debug!("fragment for empty conversation, dropping");
            return false;
        };
        if last.role != Role::Assistant {
            tracing::debug!(role = %last.role, "fragment with no assistant message open, dropping");
            return false;
        }
        if last.content == self.placeholder {
            last.content = fragment.to_string();
        } else {
            last.content.push_str(fragment);
        }
        true
    }

    /// Messages as merged so far
    #[inline]
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consume the merger, returning the messages
    #[inline]
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// Clean up a stored conversation before showing it
///
/// Messages that are blank or only the placeholder are dropped; they are
/// leftovers of streams that never produced text.
#[must_use]
pub fn normalize_messages(messages: &[Message], placeholder: &str) -> Vec<Message> {
    messages
        .iter()
        .filter(|message| !message.is_vacant(placeholder))
        .cloned()
        .collect()
}

/// Follow-up questions embedded as `<question>…</question>`
///
/// Bodies are trimmed, blank ones skipped and duplicates removed, keeping
/// first-seen order.
#[must_use]
pub fn extract_questions(content: &str) -> Vec<String> {
    let mut questions: Vec<String> = Vec::new();
    for capture in QUESTION_TAG.captures_iter(content) {
        let question = capture[1].trim();
        if !question.is_empty() && !questions.iter().any(|q| q == question) {
            questions.push(question.to_string());
        }
    }
    questions
}

/// Content with every `<question>` block removed, trimmed
#[must_use]
pub fn strip_questions(content: &str) -> String {
    QUESTION_TAG.replace_all(content, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn placeholder_is_replaced_then_appended() {
        let mut merger = ChatDeltaMerger::new(
            vec![Message::user("hi"), Message::assistant("...")],
            "...",
        );
        assert!(merger.apply("Hel"));
        assert!(merger.apply("lo"));
        assert_eq!(merger.messages().last(), Some(&Message::assistant("Hello")));
        assert_eq!(merger.messages().len(), 2);
    }

    #[test]
    fn fragment_without_open_assistant_is_dropped() {
        let mut merger = ChatDeltaMerger::new(vec![Message::user("hi")], "...");
        assert!(!merger.apply("x"));
        assert_eq!(merger.into_messages(), vec![Message::user("hi")]);

        let mut empty = ChatDeltaMerger::new(Vec::new(), "...");
        assert!(!empty.apply("x"));
    }

    #[test]
    fn empty_fragment_changes_nothing() {
        let mut merger = ChatDeltaMerger::new(vec![Message::assistant("...")], "...");
        assert!(!merger.apply(""));
        assert_eq!(merger.messages()[0].content, "...");
    }

    #[test]
    fn text_resembling_placeholder_later_is_appended() {
        let mut merger = ChatDeltaMerger::new(vec![Message::assistant("...")], "...");
        merger.apply("Wait");
        merger.apply("...");
        assert_eq!(merger.messages()[0].content, "Wait...");
    }

    #[test]
    fn normalize_drops_vacant_messages() {
        let messages = vec![
            Message::user("q"),
            Message::assistant("..."),
            Message::assistant("   "),
            Message::assistant("a"),
        ];
        assert_eq!(
            normalize_messages(&messages, "..."),
            vec![Message::user("q"), Message::assistant("a")]
        );
    }

    #[test]
    fn questions_are_extracted_once() {
        let content = "Intro\n<question> Why? </question>\n<QUESTION>How?</QUESTION>\n<question>Why?</question><question> </question>";
        assert_eq!(extract_questions(content), vec!["Why?", "How?"]);
        assert_eq!(strip_questions(content), "Intro");
    }

    #[test]
    fn multiline_question_bodies() {
        let content = "<question>line one\nline two</question>";
        assert_eq!(extract_questions(content), vec!["line one\nline two"]);
    }
}
