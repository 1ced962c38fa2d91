pub mod http_readings;
pub mod readings_csv_file;

pub use http_readings::HttpReadingsSource;
pub use readings_csv_file::ReadingsCsvFileSource;
