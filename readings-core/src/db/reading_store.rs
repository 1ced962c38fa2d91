use time::OffsetDateTime;

use crate::{validation::RejectionReason, MeterReading};

/// Inclusive date bounds for a history scan. A missing bound leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.start.map_or(true, |start| ts >= start) && self.end.map_or(true, |end| ts <= end)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Decides, given the current latest reading, what to append.
pub type AppendCheck<'a> =
    &'a (dyn Fn(Option<&MeterReading>) -> Result<MeterReading, RejectionReason> + Send + Sync);

/// Ordered, append-only log of meter readings.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    /// Readings within `range`, ascending by date.
    async fn fetch_ascending(&self, range: DateRange) -> Result<Vec<MeterReading>, StoreError>;

    /// The reading with the latest date, if any.
    async fn fetch_latest(&self) -> Result<Option<MeterReading>, StoreError>;

    /// Unchecked append.
    async fn append(&self, reading: &MeterReading) -> Result<(), StoreError>;

    /// Runs `check` against the latest reading and appends what it returns,
    /// as one step: no other checked append can land between the read and the
    /// write, in this process or any other sharing the store.
    ///
    /// A rejection leaves the store untouched and comes back as `Ok(Err(_))`.
    async fn append_checked(
        &self,
        check: AppendCheck<'_>,
    ) -> Result<Result<MeterReading, RejectionReason>, StoreError>;
}
