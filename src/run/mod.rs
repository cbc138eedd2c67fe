//! Recorded run data
//!
//! - [`RunData`] - Lock-protected, append-only (until cleared) sample buffer
//! - [`export`] - CSV serialization of a buffer snapshot

pub mod buffer;
pub mod export;

pub use buffer::RunData;
pub use export::{default_export_name, export_csv, write_csv, CSV_HEADER};
