use tokio::sync::RwLock;

use super::{AppendCheck, DateRange, ReadingStore, StoreError};
use crate::{validation::RejectionReason, MeterReading};

/// Process-local store, kept sorted by reading date.
#[derive(Debug, Default)]
pub struct InMemoryReadingStore {
    readings: RwLock<Vec<MeterReading>>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readings(mut readings: Vec<MeterReading>) -> Self {
        readings.sort_by_key(|r| r.reading_date);
        Self {
            readings: RwLock::new(readings),
        }
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn fetch_ascending(&self, range: DateRange) -> Result<Vec<MeterReading>, StoreError> {
        let readings = self.readings.read().await;
        Ok(readings
            .iter()
            .filter(|r| range.contains(r.reading_date))
            .cloned()
            .collect())
    }

    async fn fetch_latest(&self) -> Result<Option<MeterReading>, StoreError> {
        Ok(self.readings.read().await.last().cloned())
    }

    async fn append(&self, reading: &MeterReading) -> Result<(), StoreError> {
        let mut readings = self.readings.write().await;
        insert_sorted(&mut readings, reading.clone());
        Ok(())
    }

    async fn append_checked(
        &self,
        check: AppendCheck<'_>,
    ) -> Result<Result<MeterReading, RejectionReason>, StoreError> {
        // The write guard spans both the check and the insert.
        let mut readings = self.readings.write().await;
        let reading = match check(readings.last()) {
            Ok(reading) => reading,
            Err(reason) => return Ok(Err(reason)),
        };
        insert_sorted(&mut readings, reading.clone());
        Ok(Ok(reading))
    }
}

fn insert_sorted(readings: &mut Vec<MeterReading>, reading: MeterReading) {
    let at = readings.partition_point(|r| r.reading_date <= reading.reading_date);
    readings.insert(at, reading);
}
