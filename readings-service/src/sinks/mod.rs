pub mod store_writer;

pub use store_writer::StoreWriterSink;
