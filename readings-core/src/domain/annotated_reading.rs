use serde::Serialize;
use time::OffsetDateTime;

use super::MeterReading;

/// A stored reading plus its month-end estimation, as returned to callers.
///
/// Never persisted: recomputed from the ordered history on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedReading {
    #[serde(with = "time::serde::rfc3339")]
    pub reading_date: OffsetDateTime,
    pub cumulative: f64,
    pub unit: String,
    /// Interpolated cumulative value at the end of the reading's month.
    /// `None` when there is nothing to estimate (window edges, month-end readings).
    pub estimation: Option<i64>,
}

impl AnnotatedReading {
    pub fn new(reading: &MeterReading, estimation: Option<i64>) -> Self {
        Self {
            reading_date: reading.reading_date,
            cumulative: reading.cumulative,
            unit: reading.unit.clone(),
            estimation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn serializes_with_camel_case_keys_and_null_estimation() {
        let reading = MeterReading {
            reading_date: datetime!(2019-01-10 00:00:00 UTC),
            cumulative: 130.0,
            unit: "kWh".to_string(),
        };

        let json = serde_json::to_value(AnnotatedReading::new(&reading, None)).unwrap();
        assert_eq!(json["readingDate"], "2019-01-10T00:00:00Z");
        assert_eq!(json["cumulative"], 130.0);
        assert_eq!(json["unit"], "kWh");
        assert!(json["estimation"].is_null());
    }

    #[test]
    fn zero_estimation_is_not_null() {
        let reading = MeterReading {
            reading_date: datetime!(2019-01-10 00:00:00 UTC),
            cumulative: 0.0,
            unit: "kWh".to_string(),
        };

        let json = serde_json::to_value(AnnotatedReading::new(&reading, Some(0))).unwrap();
        assert_eq!(json["estimation"], 0);
    }
}
