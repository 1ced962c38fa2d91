use anyhow::Result;
use readings_service::{
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::{Pipeline, Submission},
    sinks::StoreWriterSink,
    sources::{HttpReadingsSource, ReadingsCsvFileSource},
    store,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store = store::connect(&cfg.store).await?;

    // Single writer shared by the seed run and the HTTP pipeline; the seed run
    // finishes before the HTTP source exists, so appends never interleave.
    let writer = StoreWriterSink::new(
        store.clone(),
        cfg.unit.clone(),
        cfg.writer.max_retries,
        Duration::from_millis(cfg.writer.retry_backoff_ms),
    );

    if let Some(seed_file) = &cfg.seed_file {
        if store.fetch_latest().await?.is_none() {
            tracing::info!(path = %seed_file.display(), "seeding empty store");
            let seed: Pipeline<_, Submission, _> =
                Pipeline::new(ReadingsCsvFileSource::new(seed_file), writer.clone());
            seed.run().await?;
        } else {
            tracing::info!(path = %seed_file.display(), "store already holds readings, skipping seed file");
        }
    }

    let source = HttpReadingsSource::new(&cfg.http, store).await?;
    let pipeline: Pipeline<_, Submission, _> = Pipeline::new(source, writer);

    pipeline.run().await?;

    Ok(())
}
