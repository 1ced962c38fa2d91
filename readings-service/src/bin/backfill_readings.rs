use anyhow::{bail, Result};
use readings_service::{
    config::{AppConfig, StoreKind},
    observability,
    pipeline::{Pipeline, Submission},
    sinks::StoreWriterSink,
    sources::ReadingsCsvFileSource,
    store,
};
use std::{env, time::Duration};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_readings <csv_file_path>");
    }
    let file_path = &args[1];

    // Load configuration (can point READINGS_CONFIG to a backfill-specific file).
    let cfg = AppConfig::load()?;
    if cfg.store.kind == StoreKind::Memory {
        tracing::warn!("backfilling into the in-memory store; nothing will be persisted");
    }

    let store = store::connect(&cfg.store).await?;

    let sink = StoreWriterSink::new(
        store,
        cfg.unit.clone(),
        cfg.writer.max_retries,
        Duration::from_millis(cfg.writer.retry_backoff_ms),
    );

    let source = ReadingsCsvFileSource::new(file_path);

    let pipeline: Pipeline<_, Submission, _> = Pipeline::new(source, sink);

    pipeline.run().await?;

    tracing::info!(path = %file_path, "backfill finished");

    Ok(())
}
