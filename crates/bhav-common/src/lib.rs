//! Bhav Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the bhav workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`BhavError`] and the crate-wide [`Result`] alias
//! - **Calendar**: trading-day checks, `YYYY-MM-DD` dates and `HH:MM` times
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use bhav_common::types::{is_weekend, parse_date};
//!
//! fn main() -> bhav_common::Result<()> {
//!     let date = parse_date("2024-01-06")?;
//!     assert!(is_weekend(date));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{BhavError, Result};
