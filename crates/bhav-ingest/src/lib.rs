//! Bhav Ingest Library
//!
//! Scheduled acquisition and transformation of exchange end-of-day files.
//!
//! # Supported Sources
//!
//! - **NSE Bhavcopy**: daily equity trade summary (zipped CSV)
//! - **NSE Delivery**: per-symbol delivery statistics (CSV)
//! - **BSE Bhavcopy**: daily equity trade summary (zipped CSV)
//!
//! # Example
//!
//! ```no_run
//! use bhav_ingest::acquire::{Acquirer, AcquisitionRequest, Downloader};
//! use bhav_ingest::registry::{JobType, SourceRegistry};
//! use chrono::NaiveDate;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let downloader = Downloader::new(SourceRegistry::exchanges(), "./downloads")?;
//!     let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap_or_default();
//!     let outcome = downloader
//!         .acquire(AcquisitionRequest::new(date, JobType::NseDelivery))
//!         .await?;
//!     println!("{}", outcome.message());
//!     Ok(())
//! }
//! ```

pub mod acquire;
pub mod config;
pub mod decompression;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod transform;

pub use acquire::{AcquireError, Acquirer, AcquisitionOutcome, AcquisitionRequest, Downloader};
pub use registry::{JobType, SourceRegistry};
pub use service::{IngestService, SaveReport, ServiceError};
