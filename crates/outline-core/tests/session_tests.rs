//! End-to-end session behaviour over scripted transports

use outline_core::{BreakdownSession, OutlineConfig, SessionError};
use outline_test_utils::{sample_tree, sse_body, sse_body_chunked, sse_frame, Script, ScriptedTransport};
use outline_tree::{Message, TopicTree, TreeError};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn session_with(config: OutlineConfig, scripts: Vec<Script>) -> (BreakdownSession, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new(scripts));
    let session = BreakdownSession::new(config, transport.clone());
    (session, transport)
}

fn session(scripts: Vec<Script>) -> (BreakdownSession, Arc<ScriptedTransport>) {
    session_with(OutlineConfig::default(), scripts)
}

fn labels(tree: &TopicTree) -> Vec<String> {
    tree.walk()
        .map(|(depth, node)| format!("{}{}", "  ".repeat(depth), node.label()))
        .collect()
}

const BREAKDOWN: &str = "Calculus: Limits | Derivatives\nLimits: One-sided limits | Continuity\n";

#[tokio::test]
async fn test_roadmap_builds_tree_from_split_stream() {
    let body = sse_body_chunked(BREAKDOWN, 3);
    let (session, transport) = session(vec![Script::from_body(&body, 7)]);

    let summary = session.start_roadmap("Calculus").unwrap().wait().await.unwrap();

    assert_eq!(summary.records, 2);
    assert!(!summary.cancelled);
    assert!(summary.first_token_after.is_some());
    assert_eq!(
        labels(&session.tree()),
        vec!["Calculus", "  Limits", "    One-sided limits", "    Continuity", "  Derivatives"]
    );

    let request = &transport.requests()[0];
    assert_eq!(request.messages.last().unwrap().content, "Calculus");
    assert_eq!(request.thinking_budget(), 0);
}

#[tokio::test]
async fn test_unterminated_record_is_deferred_by_default() {
    let body = sse_body(&["A: B\n", "B: C"]);

    let (strict, _) = session(vec![Script::from_body(&body, 16)]);
    let summary = strict.start_roadmap("A").unwrap().wait().await.unwrap();
    assert_eq!(summary.records, 1);
    assert_eq!(labels(&strict.tree()), vec!["A", "  B"]);

    let config = OutlineConfig::new().with_flush_trailing_record(true);
    let (flushing, _) = session_with(config, vec![Script::from_body(&body, 16)]);
    flushing.start_roadmap("A").unwrap().wait().await.unwrap();
    assert_eq!(labels(&flushing.tree()), vec!["A", "  B", "    C"]);
}

#[tokio::test]
async fn test_transport_failure_keeps_partial_tree() {
    let chunks = vec![
        sse_frame("A: B | C\n").into_bytes(),
        sse_frame("B: D\n").into_bytes(),
    ];
    let (session, _) = session(vec![Script::new(chunks).fail_after(1)]);

    let err = session.start_roadmap("A").unwrap().wait().await.unwrap_err();

    assert!(err.is_user_visible());
    assert!(matches!(err, SessionError::Transport(_)));
    session.flush().await.unwrap();
    assert_eq!(labels(&session.tree()), vec!["A", "  B", "  C"]);
}

#[tokio::test]
async fn test_rejected_request_surfaces_status() {
    let (session, _) = session(vec![Script::rejected(503)]);
    let err = session.start_roadmap("A").unwrap().wait().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("503"));
    assert!(session.tree().is_empty());
}

#[tokio::test]
async fn test_invalid_topics_are_rejected_before_any_request() {
    let config = OutlineConfig::new().with_max_topic_len(5);
    let (session, transport) = session_with(config, vec![]);
    assert!(matches!(session.start_roadmap("   "), Err(SessionError::InvalidTopic(_))));
    assert!(matches!(session.start_roadmap("toolong"), Err(SessionError::InvalidTopic(_))));
    assert_eq!(transport.requests().len(), 0);

    // the limit counts characters, not bytes
    let err = session.start_roadmap("ümlaü").unwrap().wait().await.unwrap_err();
    assert!(err.to_string().contains("404"));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_new_topic_cancels_stale_stream() {
    let old = Script::new(vec![sse_frame("Old: X\n").into_bytes()]).hold_open();
    let new = Script::from_body(&sse_body(&["New: Y\n"]), 64);
    let (session, _) = session(vec![old, new]);

    let mut first = session.start_roadmap("Old").unwrap();
    first.first_token().await;
    let second = session.start_roadmap("New").unwrap();
    assert!(second.generation() > first.generation());

    let second = second.wait().await.unwrap();
    let first = first.wait().await.unwrap();

    assert!(first.cancelled);
    assert!(!second.cancelled);
    assert_eq!(labels(&session.tree()), vec!["New", "  Y"]);
}

#[tokio::test]
async fn test_overview_streams_into_selected_node() {
    let (session, transport) = session(vec![
        Script::from_body(&sse_body_chunked(BREAKDOWN, 5), 11),
        Script::from_body(&sse_body(&["Hel", "lo"]), 9),
    ]);
    session.start_roadmap("Calculus").unwrap().wait().await.unwrap();

    let limits = session.resolve_subtopics(&["limits"]).unwrap();
    session.select_node(limits).await.unwrap();
    let summary = session.start_overview().unwrap().unwrap().wait().await.unwrap();

    assert_eq!(summary.reply, "Hello");
    assert_eq!(summary.fragments, 2);
    assert_eq!(session.conversation().messages, vec![Message::assistant("Hello")]);

    let tree = session.tree();
    let node = tree.get(limits).unwrap();
    assert_eq!(node.messages(), &[Message::assistant("Hello")]);
    assert!(node.is_read());
    assert!(tree.root().unwrap().is_expanded());

    let request = &transport.requests()[1];
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, "user");
    assert_eq!(request.messages[0].content, "Calculus -> Limits");
    assert_eq!(request.thinking_budget(), 128);

    // a node with a conversation gets no second overview
    assert!(session.start_overview().unwrap().is_none());
}

#[tokio::test]
async fn test_chat_requires_selection_and_text() {
    let (session, _) = session(vec![]);
    assert!(matches!(session.send_message("hi"), Err(SessionError::NoSelection)));
    assert!(matches!(session.send_message("  "), Err(SessionError::EmptyMessage)));
    assert!(matches!(session.start_overview(), Err(SessionError::NoSelection)));
}

#[tokio::test]
async fn test_send_resend_and_delete() {
    let (session, transport) = session(vec![
        Script::from_body(&sse_body(&["first"]), 64),
        Script::from_body(&sse_body(&["second"]), 64),
    ]);
    let root = session
        .import_snapshot(&sample_tree().to_json().unwrap())
        .await
        .unwrap();

    session.send_message("why?").unwrap().wait().await.unwrap();
    assert_eq!(
        session.conversation().messages,
        vec![Message::user("why?"), Message::assistant("first")]
    );

    session.resend_from(1).unwrap().wait().await.unwrap();
    assert_eq!(
        session.conversation().messages,
        vec![Message::user("why?"), Message::assistant("second")]
    );
    let resent = &transport.requests()[1];
    assert_eq!(resent.messages.len(), 1);
    assert_eq!(resent.messages[0].content, "why?");

    session.delete_from(0).unwrap();
    session.flush().await.unwrap();
    assert!(session.conversation().is_empty());
    assert!(session.tree().get(root).unwrap().messages().is_empty());
}

#[tokio::test]
async fn test_stop_chat_keeps_received_text() {
    let script = Script::new(vec![sse_frame("Hel").into_bytes()]).hold_open();
    let (session, _) = session(vec![script]);
    session
        .import_snapshot(&sample_tree().to_json().unwrap())
        .await
        .unwrap();

    let mut updates = session.subscribe_conversation();
    let handle = session.send_message("hi").unwrap();
    updates
        .wait_for(|c| c.messages.last().is_some_and(|m| m.content == "Hel"))
        .await
        .unwrap();

    session.stop_chat();
    let summary = handle.wait().await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.reply, "Hel");
    assert_eq!(
        session.conversation().messages,
        vec![Message::user("hi"), Message::assistant("Hel")]
    );
}

#[tokio::test]
async fn test_select_hides_placeholder_leftovers() {
    let mut tree = sample_tree();
    let limits = tree.find_by_label("Limits").unwrap();
    tree.set_messages(limits, vec![Message::user("q"), Message::assistant("...")])
        .unwrap();
    let (session, _) = session(vec![]);
    session.import_snapshot(&tree.to_json().unwrap()).await.unwrap();

    session.select_node(limits).await.unwrap();
    assert_eq!(session.conversation().messages, vec![Message::user("q")]);
    assert_eq!(session.conversation().node, Some(limits));
}

#[tokio::test]
async fn test_notes_only_update_selected_node() {
    let (session, _) = session(vec![]);
    let root = session
        .import_snapshot(&sample_tree().to_json().unwrap())
        .await
        .unwrap();
    let limits = session.resolve_subtopics(&["Limits"]).unwrap();

    assert!(!session.update_notes(limits, "ignored").await.unwrap());
    assert!(session.update_notes(root, "mine").await.unwrap());
    assert!(!session.update_notes(root, "mine").await.unwrap());

    let tree = session.tree();
    assert_eq!(tree.get(root).unwrap().notes(), Some("mine"));
    assert_eq!(tree.get(limits).unwrap().notes(), None);
}

#[tokio::test]
async fn test_expansion_controls() {
    let (session, _) = session(vec![]);
    let root = session
        .import_snapshot(&sample_tree().to_json().unwrap())
        .await
        .unwrap();
    let limits = session.resolve_subtopics(&["limits"]).unwrap();

    assert!(session.toggle_expanded(limits).await.unwrap());
    assert!(session.expand_all().await.unwrap());
    assert!(session.tree().all_expanded());
    assert!(session.collapse_all().await.unwrap());

    let tree = session.tree();
    assert!(tree.get(root).unwrap().is_expanded());
    assert!(!tree.get(limits).unwrap().is_expanded());
}

#[tokio::test]
async fn test_snapshot_round_trip_through_session() {
    let (session, _) = session(vec![]);
    let root = session
        .import_snapshot(&sample_tree().to_json().unwrap())
        .await
        .unwrap();
    assert_eq!(session.selected(), Some(root));
    assert_eq!(session.topic().as_deref(), Some("Calculus"));

    let exported = session.export_snapshot().await.unwrap();
    let back = TopicTree::from_json(&exported).unwrap();
    assert_eq!(labels(&back), labels(&sample_tree()));
    assert!(back.get(root).unwrap().is_read());

    let tree = session.tree();
    let chain_rule = session.resolve_subtopics(&["derivatives", "chain-rule"]).unwrap();
    assert_eq!(tree.get(chain_rule).unwrap().label(), "Chain rule");
    let partial = session.resolve_subtopics(&["derivatives", "quotient-rule"]).unwrap();
    assert_eq!(tree.get(partial).unwrap().label(), "Derivatives");
    assert_eq!(session.find_matching("rule").len(), 2);
}

#[tokio::test]
async fn test_import_rejects_garbage() {
    let (session, _) = session(vec![]);
    let err = session.import_snapshot("not json").await.unwrap_err();
    assert!(matches!(err, SessionError::Tree(_)));
    assert!(!err.is_user_visible());
}

#[tokio::test]
async fn test_selection_from_replaced_tree_is_rejected() {
    let (session, _) = session(vec![Script::from_body(&sse_body(&["New: Y\n"]), 64)]);
    session
        .import_snapshot(&sample_tree().to_json().unwrap())
        .await
        .unwrap();
    let limits = session.resolve_subtopics(&["limits"]).unwrap();

    // queue the select, then start a new topic before the queue reaches it
    let mut select = Box::pin(session.select_node(limits));
    assert!(futures::poll!(select.as_mut()).is_pending());
    let roadmap = session.start_roadmap("New").unwrap();

    let err = select.await.unwrap_err();
    assert!(matches!(err, SessionError::Tree(TreeError::NodeNotFound(id)) if id == limits));
    assert_eq!(session.selected(), None);
    assert_eq!(session.conversation().node, None);

    roadmap.wait().await.unwrap();
    assert_eq!(labels(&session.tree()), vec!["New", "  Y"]);
}

#[tokio::test]
async fn test_new_message_supersedes_pending_reply() {
    let pending = Script::new(vec![sse_frame("late").into_bytes()])
        .with_delay(std::time::Duration::from_millis(50));
    let (session, transport) = session(vec![pending, Script::from_body(&sse_body(&["fresh"]), 64)]);
    let root = session
        .import_snapshot(&sample_tree().to_json().unwrap())
        .await
        .unwrap();

    let first = session.send_message("one").unwrap();
    while transport.requests().is_empty() {
        tokio::task::yield_now().await;
    }
    let second = session.send_message("two").unwrap();
    second.wait().await.unwrap();
    assert!(first.wait().await.unwrap().cancelled);
    session.flush().await.unwrap();

    let expected = vec![Message::user("one"), Message::user("two"), Message::assistant("fresh")];
    assert_eq!(session.conversation().messages, expected);
    assert_eq!(session.tree().get(root).unwrap().messages(), expected.as_slice());

    // the unanswered placeholder is not sent with the second request
    let sent: Vec<_> = transport.requests()[1]
        .messages
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(sent, vec!["one", "two"]);
}
