//! Acquisition unit
//!
//! Fetches one exchange file for one trading date, stores it verbatim in the
//! download directory and unpacks it when it is an archive.
//!
//! Outcomes are values, not errors:
//! - HTTP 404 means the exchange has not published yet (or it was a holiday)
//!   and becomes [`AcquisitionOutcome::NotYetAvailable`]
//! - any other failure becomes [`AcquisitionOutcome::HardFailure`]
//!
//! The only error is [`AcquireError::UnknownJobType`], raised before any
//! request is made.
//!
//! Two overlapping acquisitions of the same date and job type write the same
//! file name; whichever finishes last wins.

pub mod range;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::decompression::extract_archive;
use crate::registry::{ArchiveKind, JobType, SourceRegistry};

pub use range::{acquire_range, RangeReport};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Exchange endpoints reject requests that do not look like a browser
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Errors that stop an acquisition before it starts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),
}

/// One acquisition to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    pub target_date: NaiveDate,
    pub job_type: JobType,
}

impl AcquisitionRequest {
    pub fn new(target_date: NaiveDate, job_type: JobType) -> Self {
        Self { target_date, job_type }
    }
}

/// Result of one acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AcquisitionOutcome {
    Success { saved_filename: String },
    NotYetAvailable { reason: String },
    HardFailure { reason: String },
}

impl AcquisitionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AcquisitionOutcome::Success { .. })
    }

    /// Human-readable one-liner for reports and logs
    pub fn message(&self) -> String {
        match self {
            AcquisitionOutcome::Success { saved_filename } => format!("Downloaded: {}", saved_filename),
            AcquisitionOutcome::NotYetAvailable { reason } | AcquisitionOutcome::HardFailure { reason } => {
                reason.clone()
            },
        }
    }
}

/// Something that can fetch exchange files
#[async_trait]
pub trait Acquirer: Send + Sync {
    /// Fetch and store the file for `request`
    async fn acquire(&self, request: AcquisitionRequest) -> Result<AcquisitionOutcome, AcquireError>;

    /// Whether `job_type` can be acquired at all
    fn supports(&self, job_type: JobType) -> bool;
}

/// HTTP implementation of [`Acquirer`]
pub struct Downloader {
    client: Client,
    registry: SourceRegistry,
    download_dir: PathBuf,
}

impl Downloader {
    /// Create a downloader writing into `download_dir`
    pub fn new(registry: SourceRegistry, download_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(browser_headers())
            .build()?;

        Ok(Self {
            client,
            registry,
            download_dir: download_dir.into(),
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::Other(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchFailure::NotFound);
        }
        if !status.is_success() {
            return Err(FetchFailure::Other(format!("HTTP error: {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchFailure::Other(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn store(&self, filename: &str, body: Vec<u8>, archive: ArchiveKind) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(filename);
        tokio::fs::write(&path, body).await?;

        if archive == ArchiveKind::None {
            return Ok(());
        }

        let dest = self.download_dir.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_archive(&path, archive, &dest)).await;
        match extracted {
            Ok(Ok(members)) => info!(file = %filename, members = members.len(), "Extracted archive"),
            Ok(Err(e)) => warn!(file = %filename, error = %e, "Could not extract archive, keeping as is"),
            Err(e) => warn!(file = %filename, error = %e, "Extraction task failed, keeping archive as is"),
        }
        Ok(())
    }
}

enum FetchFailure {
    NotFound,
    Other(String),
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

#[async_trait]
impl Acquirer for Downloader {
    async fn acquire(&self, request: AcquisitionRequest) -> Result<AcquisitionOutcome, AcquireError> {
        let AcquisitionRequest { target_date, job_type } = request;
        let source = self.registry.resolve(target_date, job_type)?;

        info!(job_type = %job_type, date = %target_date, url = %source.url, "Downloading");

        let body = match self.fetch(&source.url).await {
            Ok(body) => body,
            Err(FetchFailure::NotFound) => {
                let reason = format!(
                    "File not found for {} (likely holiday/weekend or data not available yet)",
                    target_date
                );
                warn!(job_type = %job_type, date = %target_date, "{}", reason);
                return Ok(AcquisitionOutcome::NotYetAvailable { reason });
            },
            Err(FetchFailure::Other(cause)) => {
                let reason = format!("Failed to download {}: {}", target_date, cause);
                error!(job_type = %job_type, date = %target_date, "{}", reason);
                return Ok(AcquisitionOutcome::HardFailure { reason });
            },
        };

        if let Err(e) = self.store(&source.filename, body, source.archive).await {
            let reason = format!("Failed to save {}: {}", source.filename, e);
            error!(job_type = %job_type, date = %target_date, "{}", reason);
            return Ok(AcquisitionOutcome::HardFailure { reason });
        }

        info!(job_type = %job_type, date = %target_date, file = %source.filename, "Successfully downloaded");
        Ok(AcquisitionOutcome::Success {
            saved_filename: source.filename,
        })
    }

    fn supports(&self, job_type: JobType) -> bool {
        self.registry.contains(job_type)
    }
}
