//! Gatekeeping for new readings before they are appended to the ordered log.

use serde_json::Value;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::{dates, MeterReading};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RejectionReason {
    #[error("the reading {raw} is not a valid non-negative number")]
    InvalidValue { raw: String },
    #[error("the date {raw:?} is not valid")]
    InvalidDate { raw: String },
    #[error("the date {candidate} of the reading is older or equal than the last one {previous}")]
    DateNotAfterPrevious { candidate: Date, previous: Date },
    #[error("a reading for the month of {candidate} is already introduced")]
    DuplicateMonth { candidate: Date },
    #[error("the last reading {previous} is greater than the new reading {candidate}")]
    CumulativeRegression { previous: f64, candidate: f64 },
}

impl RejectionReason {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidValue { .. } => "invalid_value",
            Self::InvalidDate { .. } => "invalid_date",
            Self::DateNotAfterPrevious { .. } => "date_not_after_previous",
            Self::DuplicateMonth { .. } => "duplicate_month",
            Self::CumulativeRegression { .. } => "cumulative_regression",
        }
    }
}

/// A submitted reading whose raw value and date have been parsed, not yet
/// checked against the stored history.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateReading {
    pub value: f64,
    pub date: OffsetDateTime,
}

impl CandidateReading {
    pub fn parse(raw_value: &Value, raw_date: &str) -> Result<Self, RejectionReason> {
        Ok(Self {
            value: parse_value(raw_value)?,
            date: parse_reading_date(raw_date)?,
        })
    }
}

/// True for strings holding a finite number, surrounding whitespace allowed.
pub fn is_numeric(raw: &str) -> bool {
    raw.trim()
        .parse::<f64>()
        .map(f64::is_finite)
        .unwrap_or(false)
}

pub fn is_valid_date(raw: &str) -> bool {
    parse_reading_date(raw).is_ok()
}

/// Parses a cumulative value given either as a JSON number or a numeric string.
pub fn parse_value(raw: &Value) -> Result<f64, RejectionReason> {
    let value = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if is_numeric(s) => s.trim().parse().ok(),
        _ => None,
    };

    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| RejectionReason::InvalidValue {
            raw: raw.to_string(),
        })
}

/// Parses a reading date.
///
/// Accepted forms:
/// - RFC 3339 instant (`2020-01-15T10:30:00Z`, `2020-01-15T10:30:00.000+01:00`)
/// - `YYYY-MM-DDTHH:MM:SS`, taken as UTC
/// - `YYYY-MM-DD`, midnight UTC
///
/// Numeric strings are never dates, whatever they would parse to.
pub fn parse_reading_date(raw: &str) -> Result<OffsetDateTime, RejectionReason> {
    let trimmed = raw.trim();
    let invalid = || RejectionReason::InvalidDate {
        raw: raw.to_string(),
    };

    if trimmed.is_empty() || is_numeric(trimmed) {
        return Err(invalid());
    }

    if let Ok(ts) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(ts);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        trimmed,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Ok(dt.assume_utc());
    }
    if let Ok(date) = Date::parse(trimmed, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc());
    }

    Err(invalid())
}

/// Decides whether a candidate reading may follow `last_stored` in the log.
///
/// Dates are compared by calendar day (UTC); the accepted reading keeps the
/// exact instant that was supplied.
pub fn validate_and_prepare(
    candidate_value: f64,
    candidate_date: OffsetDateTime,
    last_stored: Option<&MeterReading>,
    unit: &str,
) -> Result<MeterReading, RejectionReason> {
    if !candidate_value.is_finite() || candidate_value < 0.0 {
        return Err(RejectionReason::InvalidValue {
            raw: candidate_value.to_string(),
        });
    }

    if let Some(last) = last_stored {
        let candidate_day = dates::truncate_to_midnight(candidate_date);
        let last_day = dates::truncate_to_midnight(last.reading_date);

        if candidate_day <= last_day {
            return Err(RejectionReason::DateNotAfterPrevious {
                candidate: candidate_day.date(),
                previous: last_day.date(),
            });
        }

        if dates::same_month(candidate_day, last_day) {
            return Err(RejectionReason::DuplicateMonth {
                candidate: candidate_day.date(),
            });
        }

        if last.cumulative > candidate_value {
            return Err(RejectionReason::CumulativeRegression {
                previous: last.cumulative,
                candidate: candidate_value,
            });
        }
    }

    Ok(MeterReading {
        reading_date: candidate_date,
        cumulative: candidate_value,
        unit: unit.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::{date, datetime};

    fn last_reading() -> MeterReading {
        MeterReading {
            reading_date: datetime!(2020-01-15 00:00:00 UTC),
            cumulative: 500.0,
            unit: "kWh".to_string(),
        }
    }

    #[test]
    fn same_month_is_a_duplicate() {
        let last = last_reading();
        let res = validate_and_prepare(600.0, datetime!(2020-01-20 00:00:00 UTC), Some(&last), "kWh");
        assert_eq!(
            res,
            Err(RejectionReason::DuplicateMonth {
                candidate: date!(2020-01-20)
            })
        );
    }

    #[test]
    fn lower_value_is_a_regression() {
        let last = last_reading();
        let res = validate_and_prepare(450.0, datetime!(2020-02-01 00:00:00 UTC), Some(&last), "kWh");
        assert_eq!(
            res,
            Err(RejectionReason::CumulativeRegression {
                previous: 500.0,
                candidate: 450.0
            })
        );
    }

    #[test]
    fn earlier_date_is_rejected() {
        let last = last_reading();
        let res = validate_and_prepare(600.0, datetime!(2019-12-01 00:00:00 UTC), Some(&last), "kWh");
        assert_eq!(
            res,
            Err(RejectionReason::DateNotAfterPrevious {
                candidate: date!(2019-12-01),
                previous: date!(2020-01-15)
            })
        );
    }

    #[test]
    fn same_day_later_time_is_not_after_previous() {
        let last = last_reading();
        let res = validate_and_prepare(600.0, datetime!(2020-01-15 18:00:00 UTC), Some(&last), "kWh");
        assert!(matches!(res, Err(RejectionReason::DateNotAfterPrevious { .. })));
    }

    #[test]
    fn next_month_with_higher_value_is_accepted_untruncated() {
        let last = last_reading();
        let supplied = datetime!(2020-02-01 09:30:00 UTC);
        let accepted = validate_and_prepare(600.0, supplied, Some(&last), "kWh").unwrap();
        assert_eq!(accepted.reading_date, supplied);
        assert_eq!(accepted.cumulative, 600.0);
        assert_eq!(accepted.unit, "kWh");
    }

    #[test]
    fn equal_value_in_a_later_month_is_accepted() {
        let last = last_reading();
        let res = validate_and_prepare(500.0, datetime!(2020-03-01 00:00:00 UTC), Some(&last), "kWh");
        assert!(res.is_ok());
    }

    #[test]
    fn first_reading_is_always_accepted() {
        let res = validate_and_prepare(0.0, datetime!(1999-06-01 00:00:00 UTC), None, "kWh");
        assert!(res.is_ok());
    }

    #[test]
    fn negative_or_non_finite_values_are_invalid() {
        let when = datetime!(2020-02-01 00:00:00 UTC);
        for value in [-1.0, f64::NAN, f64::INFINITY] {
            let res = validate_and_prepare(value, when, None, "kWh");
            assert!(matches!(res, Err(RejectionReason::InvalidValue { .. })));
        }
    }

    #[test]
    fn numeric_strings_are_not_dates() {
        assert!(is_numeric("12345"));
        assert!(!is_valid_date("12345"));
        assert!(!is_valid_date(" 2020 "));
        assert!(!is_valid_date(""));
        assert!(!is_valid_date("Some date"));
    }

    #[test]
    fn supported_date_forms_parse() {
        assert_eq!(
            parse_reading_date("2020-01-15T10:30:00Z").unwrap(),
            datetime!(2020-01-15 10:30:00 UTC)
        );
        assert_eq!(
            parse_reading_date("2020-01-15T10:30:00.000+01:00").unwrap(),
            datetime!(2020-01-15 10:30:00 +01:00)
        );
        assert_eq!(
            parse_reading_date("2020-01-15T10:30:00").unwrap(),
            datetime!(2020-01-15 10:30:00 UTC)
        );
        assert_eq!(
            parse_reading_date("2020-01-15").unwrap(),
            datetime!(2020-01-15 00:00:00 UTC)
        );
        assert!(!is_valid_date("2020-02-30"));
    }

    #[test]
    fn values_parse_from_numbers_and_numeric_strings() {
        assert_eq!(parse_value(&json!(30000)).unwrap(), 30000.0);
        assert_eq!(parse_value(&json!("30000.5")).unwrap(), 30000.5);
        assert_eq!(parse_value(&json!(0)).unwrap(), 0.0);

        for bad in [json!(null), json!(true), json!("abc"), json!("12abc"), json!(-3), json!("NaN")] {
            assert!(
                matches!(parse_value(&bad), Err(RejectionReason::InvalidValue { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn candidate_parse_reports_the_first_failure() {
        let ok = CandidateReading::parse(&json!(42), "2020-03-01").unwrap();
        assert_eq!(ok.value, 42.0);
        assert_eq!(ok.date, datetime!(2020-03-01 00:00:00 UTC));

        let bad_date = CandidateReading::parse(&json!(42), "12345");
        assert!(matches!(bad_date, Err(RejectionReason::InvalidDate { .. })));
    }
}
