use time::OffsetDateTime;

/// Unit label stamped on stored readings when none is configured.
pub const DEFAULT_UNIT: &str = "kWh";

/// A cumulative reading as kept in the ordered `meter_reads` log.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MeterReading {
    pub reading_date: OffsetDateTime,
    pub cumulative: f64,
    pub unit: String,
}
