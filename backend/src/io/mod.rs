//! File formats read and written by the command-line driver.

pub mod dataset;

pub use dataset::{Dataset, LightCurveEntry};
