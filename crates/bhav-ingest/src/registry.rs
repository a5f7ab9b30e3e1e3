//! Source registry
//!
//! Maps a [`JobType`] to the rule that builds its download URL for a given
//! trading date, and to the archive decoder its payload needs. Adding a source
//! means adding one [`SourceEntry`]; nothing else changes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::acquire::AcquireError;

/// Placeholder replaced by the formatted date in a URL template
pub const DATE_PLACEHOLDER: &str = "{date}";

/// The exchange files this service knows how to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "NSE Bhavcopy")]
    NseBhavcopy,
    #[serde(rename = "NSE Delivery")]
    NseDelivery,
    #[serde(rename = "BSE Bhavcopy")]
    BseBhavcopy,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::NseBhavcopy, JobType::NseDelivery, JobType::BseBhavcopy];

    pub fn display_name(self) -> &'static str {
        match self {
            JobType::NseBhavcopy => "NSE Bhavcopy",
            JobType::NseDelivery => "NSE Delivery",
            JobType::BseBhavcopy => "BSE Bhavcopy",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            JobType::NseBhavcopy => "nse-bhavcopy",
            JobType::NseDelivery => "nse-delivery",
            JobType::BseBhavcopy => "bse-bhavcopy",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for JobType {
    type Err = AcquireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        JobType::ALL
            .into_iter()
            .find(|job| {
                job.display_name().eq_ignore_ascii_case(wanted) || job.slug().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| AcquireError::UnknownJobType(s.to_string()))
    }
}

/// Container format of a downloaded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    None,
    Zip,
    Gzip,
}

impl ArchiveKind {
    /// Archive kind implied by a file name's extension (case-insensitive)
    pub fn from_filename(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            ArchiveKind::Zip
        } else if lower.ends_with(".gz") {
            ArchiveKind::Gzip
        } else {
            ArchiveKind::None
        }
    }
}

/// How to reach one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// `chrono` strftime pattern for the date segment
    pub date_format: String,
    /// URL containing [`DATE_PLACEHOLDER`]
    pub url_template: String,
    pub archive: ArchiveKind,
}

impl SourceEntry {
    /// Entry whose archive kind follows the template's extension
    pub fn new(date_format: impl Into<String>, url_template: impl Into<String>) -> Self {
        let url_template = url_template.into();
        let archive = ArchiveKind::from_filename(&url_template);
        Self {
            date_format: date_format.into(),
            url_template,
            archive,
        }
    }

    pub fn with_archive(mut self, archive: ArchiveKind) -> Self {
        self.archive = archive;
        self
    }

    pub fn url_for(&self, date: NaiveDate) -> String {
        let formatted = date.format(&self.date_format).to_string();
        self.url_template.replace(DATE_PLACEHOLDER, &formatted)
    }
}

/// A resolved download target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub url: String,
    /// Final path segment of the URL; the name the payload is stored under
    pub filename: String,
    pub archive: ArchiveKind,
}

/// Last non-empty path segment of a URL, ignoring any query or fragment
pub fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

/// Job type -> source entry
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    entries: HashMap<JobType, SourceEntry>,
}

impl SourceRegistry {
    /// Registry with no sources
    pub fn empty() -> Self {
        Self::default()
    }

    /// The three exchange archives
    pub fn exchanges() -> Self {
        let mut registry = Self::empty();
        registry.register(
            JobType::NseBhavcopy,
            SourceEntry::new(
                "%Y%m%d",
                "https://nsearchives.nseindia.com/content/cm/BhavCopy_NSE_CM_0_0_0_{date}_F_0000.csv.zip",
            ),
        );
        registry.register(
            JobType::NseDelivery,
            SourceEntry::new(
                "%d%m%Y",
                "https://archives.nseindia.com/products/content/sec_bhavdata_full_{date}.csv",
            ),
        );
        registry.register(
            JobType::BseBhavcopy,
            SourceEntry::new(
                "%d%m%y",
                "https://www.bseindia.com/download/BhavCopy/Equity/EQ{date}_CSV.ZIP",
            ),
        );
        registry
    }

    /// Add or replace the entry for `job_type`
    pub fn register(&mut self, job_type: JobType, entry: SourceEntry) -> &mut Self {
        self.entries.insert(job_type, entry);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<&SourceEntry> {
        self.entries.get(&job_type)
    }

    pub fn contains(&self, job_type: JobType) -> bool {
        self.entries.contains_key(&job_type)
    }

    /// Build the download target for `date`.
    ///
    /// Pure in `(date, job_type)`. An unregistered job type is a wiring
    /// mistake and surfaces as [`AcquireError::UnknownJobType`].
    pub fn resolve(&self, date: NaiveDate, job_type: JobType) -> Result<ResolvedSource, AcquireError> {
        let entry = self
            .get(job_type)
            .ok_or_else(|| AcquireError::UnknownJobType(job_type.to_string()))?;

        let url = entry.url_for(date);
        let filename = filename_from_url(&url);
        Ok(ResolvedSource {
            url,
            filename,
            archive: entry.archive,
        })
    }
}
