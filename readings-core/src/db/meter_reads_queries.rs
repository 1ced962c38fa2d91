use sqlx::{postgres::PgExecutor, PgPool, Postgres, QueryBuilder};

use super::{AppendCheck, DateRange, ReadingStore, StoreError};
use crate::{validation::RejectionReason, MeterReading};

/// Advisory lock key serializing checked appends across every process that
/// writes to `meter_reads`.
const APPEND_LOCK_KEY: i64 = 0x7265_6164_696e_6773;

const APPEND_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock($1)";

/// Create the `meter_reads` table if it does not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meter_reads (
            cumulative   DOUBLE PRECISION NOT NULL,
            reading_date TIMESTAMPTZ      NOT NULL,
            unit         TEXT             NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS meter_reads_reading_date_idx ON meter_reads (reading_date)")
        .execute(pool)
        .await?;

    Ok(())
}

fn ascending_query(range: DateRange) -> QueryBuilder<'static, Postgres> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT cumulative, reading_date, unit FROM meter_reads");

    if let Some(start) = range.start {
        builder.push(" WHERE reading_date >= ").push_bind(start);
    }
    if let Some(end) = range.end {
        builder
            .push(if range.start.is_some() { " AND" } else { " WHERE" })
            .push(" reading_date <= ")
            .push_bind(end);
    }

    builder.push(" ORDER BY reading_date ASC");
    builder
}

/// Fetch the date-ordered reading history, optionally bounded.
pub async fn fetch_ascending(pool: &PgPool, range: DateRange) -> Result<Vec<MeterReading>, StoreError> {
    let rows = ascending_query(range)
        .build_query_as::<MeterReading>()
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn fetch_latest<'e, E: PgExecutor<'e>>(executor: E) -> Result<Option<MeterReading>, StoreError> {
    let row = sqlx::query_as::<_, MeterReading>(
        r#"
        SELECT cumulative, reading_date, unit
        FROM meter_reads
        ORDER BY reading_date DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

pub async fn insert_reading<'e, E: PgExecutor<'e>>(executor: E, reading: &MeterReading) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO meter_reads (cumulative, reading_date, unit) VALUES ($1, $2, $3)")
        .bind(reading.cumulative)
        .bind(reading.reading_date)
        .bind(&reading.unit)
        .execute(executor)
        .await?;

    Ok(())
}

/// `ReadingStore` over a Postgres-wire connection pool.
#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        ensure_schema(&self.pool).await
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn fetch_ascending(&self, range: DateRange) -> Result<Vec<MeterReading>, StoreError> {
        fetch_ascending(&self.pool, range).await
    }

    async fn fetch_latest(&self) -> Result<Option<MeterReading>, StoreError> {
        fetch_latest(&self.pool).await
    }

    async fn append(&self, reading: &MeterReading) -> Result<(), StoreError> {
        insert_reading(&self.pool, reading).await
    }

    async fn append_checked(
        &self,
        check: AppendCheck<'_>,
    ) -> Result<Result<MeterReading, RejectionReason>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Held until commit or rollback.
        sqlx::query(APPEND_LOCK_SQL)
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let latest = fetch_latest(&mut *tx).await?;
        let reading = match check(latest.as_ref()) {
            Ok(reading) => reading,
            Err(reason) => {
                tx.rollback().await?;
                return Ok(Err(reason));
            }
        };

        insert_reading(&mut *tx, &reading).await?;
        tx.commit().await?;

        Ok(Ok(reading))
    }
}
