pub mod dates;
pub mod db;
pub mod domain;
pub mod interpolation;
pub mod validation;

pub use domain::{AnnotatedReading, MeterReading};
