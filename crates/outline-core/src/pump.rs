//! Fragment read loop
//!
//! Drives a [`ByteStream`] through a [`FragmentDecoder`] until the stream
//! ends, fails, or the token is cancelled. Cancellation wins over a chunk
//! that is ready at the same moment.

use crate::error::TransportError;
use crate::transport::ByteStream;
use futures::StreamExt;
use outline_stream::FragmentDecoder;
use tokio_util::sync::CancellationToken;

/// How a read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// Stream reached its end
    Completed,
    /// Token was cancelled first
    Cancelled,
}

/// Read `stream` to the end, handing each fragment to `on_fragment`
///
/// Fragments decoded from a chunk are all delivered even if the token is
/// cancelled meanwhile; no further chunk is read after cancellation.
///
/// # Errors
/// Returns the transport error that ended the stream. Fragments delivered
/// before it stay delivered.
pub async fn pump_fragments<F>(
    mut stream: ByteStream,
    cancel: &CancellationToken,
    mut on_fragment: F,
) -> Result<PumpEnd, TransportError>
where
    F: FnMut(String),
{
    let mut decoder = FragmentDecoder::new();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("stream cancelled");
                return Ok(PumpEnd::Cancelled);
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => decoder.push(&chunk).into_iter().for_each(&mut on_fragment),
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    let discarded = decoder.finish();
    if discarded > 0 {
        tracing::debug!(bytes = discarded, "dropped unterminated trailing line");
    }
    Ok(PumpEnd::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn frame(text: &str) -> Vec<u8> {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
        )
        .into_bytes()
    }

    fn byte_stream(chunks: Vec<Result<Vec<u8>, TransportError>>) -> ByteStream {
        stream::iter(chunks).boxed()
    }

    #[tokio::test]
    async fn delivers_fragments_in_order() {
        let stream = byte_stream(vec![Ok(frame("a")), Ok(frame("b")), Ok(b"data: [DONE]\n".to_vec())]);
        let mut seen = Vec::new();
        let end = pump_fragments(stream, &CancellationToken::new(), |f| seen.push(f))
            .await
            .unwrap();
        assert_eq!(end, PumpEnd::Completed);
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn cancelled_token_reads_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let mut seen = Vec::new();
        let end = pump_fragments(byte_stream(vec![Ok(frame("a"))]), &token, |f| seen.push(f))
            .await
            .unwrap();
        assert_eq!(end, PumpEnd::Cancelled);
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn transport_error_ends_loop_after_earlier_fragments() {
        let stream = byte_stream(vec![
            Ok(frame("kept")),
            Err(TransportError::Status { status: 502, body: String::new() }),
            Ok(frame("never")),
        ]);
        let mut seen = Vec::new();
        let result = pump_fragments(stream, &CancellationToken::new(), |f| seen.push(f)).await;
        assert!(matches!(result, Err(TransportError::Status { status: 502, .. })));
        assert_eq!(seen, vec!["kept"]);
    }
}
