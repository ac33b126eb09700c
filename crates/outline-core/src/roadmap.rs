//! Breakdown stream driver
//!
//! Runs one breakdown request: fragments feed a [`RecordAssembler`], each
//! closed record is queued as a merge tagged with the run's generation.

use crate::error::SessionError;
use crate::pump::{pump_fragments, PumpEnd};
use crate::request::ChatRequest;
use crate::store::TreeStore;
use crate::transport::CompletionTransport;
use outline_stream::RecordAssembler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of a breakdown run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoadmapSummary {
    /// Generation the run merged into
    pub generation: u64,
    /// Records queued for merging
    pub records: usize,
    /// Malformed lines dropped
    pub dropped: usize,
    /// Time from request to first non-blank fragment
    pub first_token_after: Option<Duration>,
    /// Whether the run was cancelled before the stream ended
    pub cancelled: bool,
}

/// Everything one breakdown run needs
pub(crate) struct RoadmapRun {
    pub(crate) transport: Arc<dyn CompletionTransport>,
    pub(crate) request: ChatRequest,
    pub(crate) store: TreeStore,
    pub(crate) generation: u64,
    pub(crate) flush_trailing_record: bool,
}

impl RoadmapRun {
    /// Start the run on its own task
    pub(crate) fn spawn(self, cancel: CancellationToken) -> RoadmapHandle {
        let (first_token_tx, first_token) = watch::channel(false);
        let generation = self.generation;
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let result = self.run(&task_cancel, &first_token_tx).await;
            // releases first_token() waiters even when no token arrived
            first_token_tx.send_replace(true);
            result
        });
        RoadmapHandle {
            generation,
            cancel,
            first_token,
            task,
        }
    }

    async fn run(
        self,
        cancel: &CancellationToken,
        first_token: &watch::Sender<bool>,
    ) -> Result<RoadmapSummary, SessionError> {
        let started = Instant::now();
        tracing::info!(generation = self.generation, model = %self.request.model, "breakdown stream starting");

        let stream = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Ok(RoadmapSummary {
                    generation: self.generation,
                    records: 0,
                    dropped: 0,
                    first_token_after: None,
                    cancelled: true,
                });
            }
            opened = self.transport.open(&self.request) => opened?,
        };

        let mut assembler = RecordAssembler::new();
        let mut records = 0;
        let mut first_token_after = None;
        let mut queue_error = None;

        let end = pump_fragments(stream, cancel, |fragment| {
            if first_token_after.is_none() && !fragment.trim().is_empty() {
                let elapsed = started.elapsed();
                first_token_after = Some(elapsed);
                first_token.send_replace(true);
                tracing::info!(
                    generation = self.generation,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "first token received"
                );
            }
            for record in assembler.push(&fragment) {
                records += 1;
                if let Err(e) = self.store.merge(self.generation, record) {
                    queue_error.get_or_insert(e);
                }
            }
        })
        .await;

        if let Some(e) = queue_error {
            return Err(e.into());
        }
        let end = end?;

        let dropped = assembler.dropped();
        if end == PumpEnd::Completed && self.flush_trailing_record {
            if let Some(record) = assembler.finish() {
                records += 1;
                self.store.merge(self.generation, record)?;
            }
        }
        self.store.flush().await?;

        let summary = RoadmapSummary {
            generation: self.generation,
            records,
            dropped,
            first_token_after,
            cancelled: end == PumpEnd::Cancelled,
        };
        tracing::info!(
            generation = self.generation,
            records,
            dropped,
            cancelled = summary.cancelled,
            "breakdown stream finished"
        );
        Ok(summary)
    }
}

/// Handle to a running breakdown
#[derive(Debug)]
pub struct RoadmapHandle {
    generation: u64,
    cancel: CancellationToken,
    first_token: watch::Receiver<bool>,
    task: JoinHandle<Result<RoadmapSummary, SessionError>>,
}

impl RoadmapHandle {
    /// Generation this run merges into
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop reading; records already merged stay merged
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the run has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the first non-blank fragment, or the end of the run
    pub async fn first_token(&mut self) {
        let _ = self.first_token.wait_for(|seen| *seen).await;
    }

    /// Wait for the run to end and every merge it queued to land
    ///
    /// # Errors
    /// Returns [`SessionError::Transport`] if the stream failed, or
    /// [`SessionError::Queue`] if merges could not be queued.
    pub async fn wait(self) -> Result<RoadmapSummary, SessionError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(SessionError::Cancelled),
        }
    }
}
