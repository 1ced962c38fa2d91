use std::{
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::StreamExt;
use readings_core::{
    db::{ReadingStore, StoreError},
    validation::{validate_and_prepare, CandidateReading},
    MeterReading,
};

use crate::pipeline::{Envelope, PipelineError, Sink, SubmitError, SubmitOutcome, Submission};

/// Writer of the reading log.
///
/// Submissions are handled one at a time. Each candidate is validated against
/// the latest stored reading and appended through the store's checked append,
/// so concurrent writers (a backfill run next to the server) cannot both pass
/// validation against the same stale tail.
#[derive(Clone)]
pub struct StoreWriterSink {
    store: Arc<dyn ReadingStore>,
    unit: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl StoreWriterSink {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        unit: impl Into<String>,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            unit: unit.into(),
            max_retries,
            retry_backoff,
        }
    }

    async fn with_retries<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, SubmitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(error = %e, attempt, op, "store operation failed, retrying with backoff");
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, op, "store operation failed, giving up");
                    metrics::counter!("readings_store_errors_total").increment(1);
                    return Err(SubmitError::Store(e.to_string()));
                }
            }
        }
    }

    async fn accept(&self, candidate: &CandidateReading) -> SubmitOutcome {
        let check = |latest: Option<&MeterReading>| {
            validate_and_prepare(candidate.value, candidate.date, latest, &self.unit)
        };

        let verdict = self
            .with_retries("append_checked", || self.store.append_checked(&check))
            .await?;

        Ok(verdict?)
    }

    fn record(&self, outcome: &SubmitOutcome, received_at: SystemTime) {
        match outcome {
            Ok(reading) => {
                metrics::counter!("readings_accepted_total").increment(1);
                if let Ok(dur) = SystemTime::now().duration_since(received_at) {
                    metrics::histogram!("readings_append_latency_seconds").record(dur.as_secs_f64());
                }
                tracing::info!(
                    cumulative = reading.cumulative,
                    reading_date = %reading.reading_date,
                    "reading appended"
                );
            }
            Err(SubmitError::Rejected(reason)) => {
                metrics::counter!("readings_rejected_total", "reason" => reason.kind()).increment(1);
                tracing::warn!(%reason, "reading rejected");
            }
            // Already logged and counted by `with_retries`.
            Err(SubmitError::Store(_)) => {}
        }
    }
}

#[async_trait::async_trait]
impl Sink<Submission> for StoreWriterSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Submission>, PipelineError>> + Send + Unpin + 'static,
    {
        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for StoreWriterSink");
                    continue;
                }
            };

            let Envelope {
                payload: Submission { candidate, reply },
                received_at,
            } = env;

            let outcome = self.accept(&candidate).await;
            self.record(&outcome, received_at);

            if let Some(reply) = reply {
                // The submitter may have gone away; the outcome is already logged.
                let _ = reply.send(outcome);
            }
        }

        Ok(())
    }
}
