use std::sync::Arc;

use readings_core::db::{InMemoryReadingStore, PgReadingStore, ReadingStore};
use sqlx::postgres::PgPoolOptions;

use crate::config::{StoreConfig, StoreKind};

/// Open the reading store described by `cfg`, creating the table if needed.
pub async fn connect(cfg: &StoreConfig) -> anyhow::Result<Arc<dyn ReadingStore>> {
    match cfg.kind {
        StoreKind::Pgwire => {
            let pool = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .connect(&cfg.uri)
                .await?;
            let store = PgReadingStore::new(pool);
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        StoreKind::Memory => {
            tracing::warn!("using the in-memory store; readings are lost on shutdown");
            Ok(Arc::new(InMemoryReadingStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_kind_starts_empty() {
        let cfg = StoreConfig {
            kind: StoreKind::Memory,
            uri: String::new(),
            max_connections: 1,
        };
        let store = connect(&cfg).await.unwrap();
        assert!(store.fetch_latest().await.unwrap().is_none());
    }
}
