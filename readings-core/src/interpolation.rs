//! Month-end estimation over an ordered reading history.

use crate::{dates, AnnotatedReading, MeterReading};

/// Offset applied to day-of-year positions of readings that fall in the year
/// after the window's first reading. Applied once, leap years are not
/// accounted for, and neighbours more than a year apart are not supported.
const YEAR_ROLLOVER_DAYS: i32 = 365;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("reading {index} has a non-finite cumulative value")]
    NonFiniteCumulative { index: usize },
    #[error("reading {index} is dated before the reading preceding it")]
    Unordered { index: usize },
    #[error("the neighbours of reading {index} share the same day-of-year position")]
    DegenerateSpan { index: usize },
}

/// Linear interpolation of `y` at `x` on the line through `(x0, y0)` and `(x1, y1)`.
pub fn lerp(x0: f64, x1: f64, y0: f64, y1: f64, x: f64) -> f64 {
    y0 + (x - x0) * ((y1 - y0) / (x1 - x0))
}

/// Annotates every reading of an ascending history with its month-end estimation.
///
/// The first and last reading never get an estimation. An interior reading
/// taken on the last day of its month already is the month-end value, so it
/// doesn't get one either. Every other interior reading is estimated from its
/// two neighbours, positioned on a day-of-year axis.
pub fn interpolate(readings: &[MeterReading]) -> Result<Vec<AnnotatedReading>, InterpolationError> {
    check_preconditions(readings)?;

    let last = readings.len().saturating_sub(1);
    readings
        .iter()
        .enumerate()
        .map(|(i, current)| {
            let estimation = if i == 0 || i == last {
                None
            } else {
                estimate_month_end(i, &readings[i - 1], current, &readings[i + 1])?
            };
            Ok(AnnotatedReading::new(current, estimation))
        })
        .collect()
}

fn check_preconditions(readings: &[MeterReading]) -> Result<(), InterpolationError> {
    for (index, reading) in readings.iter().enumerate() {
        if !reading.cumulative.is_finite() {
            return Err(InterpolationError::NonFiniteCumulative { index });
        }
        if index > 0 && reading.reading_date < readings[index - 1].reading_date {
            return Err(InterpolationError::Unordered { index });
        }
    }
    Ok(())
}

fn estimate_month_end(
    index: usize,
    prev: &MeterReading,
    current: &MeterReading,
    post: &MeterReading,
) -> Result<Option<i64>, InterpolationError> {
    if dates::is_last_day_of_month(current.reading_date) {
        return Ok(None);
    }

    let prev_pos = dates::day_of_year(prev.reading_date);

    let mut current_pos = dates::day_of_year(current.reading_date)
        + dates::days_until_month_end(current.reading_date);
    if dates::years_differ(prev.reading_date, current.reading_date) {
        current_pos += YEAR_ROLLOVER_DAYS;
    }

    let mut post_pos = dates::day_of_year(post.reading_date);
    if dates::years_differ(prev.reading_date, post.reading_date) {
        post_pos += YEAR_ROLLOVER_DAYS;
    }

    if post_pos == prev_pos {
        return Err(InterpolationError::DegenerateSpan { index });
    }

    let estimate = lerp(
        f64::from(prev_pos),
        f64::from(post_pos),
        prev.cumulative,
        post.cumulative,
        f64::from(current_pos),
    );
    Ok(Some(estimate.round() as i64))
}
