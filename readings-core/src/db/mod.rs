pub mod in_memory;
pub mod meter_reads_queries;
pub mod reading_store;

pub use in_memory::InMemoryReadingStore;
pub use meter_reads_queries::PgReadingStore;
pub use reading_store::{AppendCheck, DateRange, ReadingStore, StoreError};
