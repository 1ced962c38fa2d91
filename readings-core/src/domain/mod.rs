mod annotated_reading;
mod meter_reading;

pub use annotated_reading::AnnotatedReading;
pub use meter_reading::{MeterReading, DEFAULT_UNIT};
