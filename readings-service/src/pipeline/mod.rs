use std::{marker::PhantomData, pin::Pin, time::SystemTime};

use futures::Stream;
use readings_core::{
    validation::{CandidateReading, RejectionReason},
    MeterReading,
};
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
}

/// Why a submission did not make it into the store.
#[derive(thiserror::Error, Debug, Clone)]
pub enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] RejectionReason),
    #[error("store error: {0}")]
    Store(String),
}

pub type SubmitOutcome = Result<MeterReading, SubmitError>;

/// A parsed reading waiting for the writer, plus where to send the verdict.
#[derive(Debug)]
pub struct Submission {
    pub candidate: CandidateReading,
    /// `None` for fire-and-forget sources such as backfill files.
    pub reply: Option<oneshot::Sender<SubmitOutcome>>,
}

impl Submission {
    pub fn detached(candidate: CandidateReading) -> Self {
        Self {
            candidate,
            reply: None,
        }
    }
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub struct Pipeline<S, T, K> {
    pub source: S,
    pub sink: K,
    _payload: PhantomData<fn() -> T>,
}

impl<T, S, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
    K: Sink<T> + Send + Sync + 'static,
{
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            _payload: PhantomData,
        }
    }

    pub async fn run(self) -> Result<(), PipelineError> {
        let stream = self.source.stream().await;
        self.sink.run(stream).await
    }
}
