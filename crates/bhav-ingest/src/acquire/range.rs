//! Manual multi-date download
//!
//! Dates are fetched one after another, never in parallel, to keep the
//! request rate toward the exchanges polite.

use bhav_common::types::{date_range, is_weekend};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AcquireError, Acquirer, AcquisitionRequest};
use crate::registry::JobType;

/// Tally of a range download
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// One line per calendar date in the range
    pub details: Vec<String>,
}

impl RangeReport {
    pub fn summary(&self) -> String {
        format!(
            "Download completed: {} successful, {} failed",
            self.succeeded, self.failed
        )
    }
}

/// Acquire every weekday between `from` and `to`, inclusive.
///
/// Fails up front with [`AcquireError::UnknownJobType`] if the acquirer has no
/// source for `job_type`; per-date failures are only counted.
pub async fn acquire_range(
    acquirer: &dyn Acquirer,
    from: NaiveDate,
    to: NaiveDate,
    job_type: JobType,
) -> Result<RangeReport, AcquireError> {
    if !acquirer.supports(job_type) {
        return Err(AcquireError::UnknownJobType(job_type.to_string()));
    }

    info!(job_type = %job_type, from = %from, to = %to, "Starting range download");

    let mut report = RangeReport::default();
    for date in date_range(from, to) {
        if is_weekend(date) {
            report.skipped += 1;
            report.details.push(format!("Skipped {} (weekend)", date));
            continue;
        }

        let outcome = acquirer.acquire(AcquisitionRequest::new(date, job_type)).await?;
        if outcome.is_success() {
            report.succeeded += 1;
        } else {
            report.failed += 1;
        }
        report.details.push(outcome.message());
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "{}",
        report.summary()
    );
    Ok(report)
}
