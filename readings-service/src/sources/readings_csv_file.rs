use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use futures::Stream;
use readings_core::validation::CandidateReading;
use serde_json::Value;

use crate::pipeline::{Envelope, PipelineError, Source, Submission};

/// CSV backfill/source for meter readings.
///
/// Expected header columns (by name):
/// - reading_date (RFC3339 timestamp or YYYY-MM-DD)
/// - cumulative
///
/// Any other column (such as a `unit` column) is ignored; stored readings carry
/// the service's configured unit. Rows must be in ascending date order, since
/// each one is validated against the reading before it.
pub struct ReadingsCsvFileSource {
    path: PathBuf,
}

impl ReadingsCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn record_to_candidate(record: &StringRecord, headers: &StringRecord) -> Result<CandidateReading, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in CSV record")))
    };

    let reading_date = get("reading_date")?;
    let cumulative = get("cumulative")?;

    CandidateReading::parse(&Value::String(cumulative.to_string()), reading_date)
        .map_err(|e| PipelineError::Source(format!("invalid CSV record: {e}")))
}

#[async_trait::async_trait]
impl Source<Submission> for ReadingsCsvFileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<Submission>, PipelineError>> + Send>> {
        // Blocking CSV reader inside a single async task; backfill files are small.
        let path = self.path.clone();
        let s = async_stream::stream! {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to open CSV file: {e}")));
                    return;
                }
            };
            let mut rdr = csv::Reader::from_reader(file);
            let headers = match rdr.headers() {
                Ok(h) => h.clone(),
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to read CSV headers: {e}")));
                    return;
                }
            };

            for result in rdr.records() {
                let record = match result {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("readings_csv_parse_errors_total").increment(1);
                        yield Err(PipelineError::Source(format!("failed to read CSV record: {e}")));
                        continue;
                    }
                };

                match record_to_candidate(&record, &headers) {
                    Ok(candidate) => yield Ok(Envelope::new(Submission::detached(candidate))),
                    Err(e) => {
                        metrics::counter!("readings_csv_parse_errors_total").increment(1);
                        yield Err(e);
                    }
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use time::macros::datetime;

    fn write_fixture(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.csv", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn record_uses_named_columns() {
        let headers = StringRecord::from(vec!["cumulative", "unit", "reading_date"]);
        let record = StringRecord::from(vec!["17580", "kWh", "2017-03-28T00:00:00Z"]);

        let candidate = record_to_candidate(&record, &headers).unwrap();
        assert_eq!(candidate.value, 17580.0);
        assert_eq!(candidate.date, datetime!(2017-03-28 00:00:00 UTC));
    }

    #[test]
    fn record_without_cumulative_is_an_error() {
        let headers = StringRecord::from(vec!["reading_date"]);
        let record = StringRecord::from(vec!["2017-03-28"]);
        assert!(matches!(
            record_to_candidate(&record, &headers),
            Err(PipelineError::Source(_))
        ));
    }

    #[tokio::test]
    async fn bad_rows_are_reported_and_skipped() {
        let path = write_fixture(
            "readings-csv-source",
            "reading_date,cumulative,unit\n\
             2017-03-28,17580,kWh\n\
             12345,17759,kWh\n\
             2017-05-31,abc,kWh\n\
             2017-06-30,18002,kWh\n",
        );

        let items: Vec<_> = ReadingsCsvFileSource::new(&path).stream().await.collect().await;
        std::fs::remove_file(&path).ok();

        assert_eq!(items.len(), 4);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
        assert!(items[2].is_err());
        let last = items[3].as_ref().unwrap();
        assert_eq!(last.payload.candidate.value, 18002.0);
        assert!(last.payload.reply.is_none());
    }

    #[tokio::test]
    async fn missing_file_yields_a_single_error() {
        let items: Vec<_> = ReadingsCsvFileSource::new("/nonexistent/readings.csv")
            .stream()
            .await
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
