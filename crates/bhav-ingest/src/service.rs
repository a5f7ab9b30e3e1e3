//! Service facade
//!
//! [`IngestService`] is the one object the binary talks to. It wires the
//! settings store, the acquirer, the scheduler and the transformer together
//! and keeps track of the schedule last applied to the scheduler, so that a
//! settings change reloads it exactly when a schedule-relevant field moved.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::acquire::{acquire_range, AcquireError, Acquirer, Downloader, RangeReport};
use crate::config::{ConfigError, ScheduleConfig, Settings, SettingsStore};
use crate::registry::{JobType, SourceRegistry};
use crate::scheduler::{SchedulerError, SchedulerOptions, SchedulerService, SchedulerState, SchedulerStatus};
use crate::transform::{TransformError, TransformResult, Transformer};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// What [`IngestService::save_settings`] did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub saved: bool,
    pub scheduler_reloaded: bool,
    pub scheduler_state: Option<SchedulerState>,
    pub warning: Option<String>,
}

pub struct IngestService {
    store: SettingsStore,
    acquirer: Arc<dyn Acquirer>,
    scheduler: Arc<SchedulerService>,
    transformer: Transformer,
    applied: Mutex<Option<ScheduleConfig>>,
}

impl IngestService {
    pub fn new(
        store: SettingsStore,
        acquirer: Arc<dyn Acquirer>,
        scheduler: Arc<SchedulerService>,
        transformer: Transformer,
    ) -> Self {
        Self {
            store,
            acquirer,
            scheduler,
            transformer,
            applied: Mutex::new(None),
        }
    }

    /// Build the production wiring from the settings document at `store`.
    ///
    /// Paths are read once here; changing them takes effect on restart.
    pub fn from_store(store: SettingsStore, options: SchedulerOptions) -> anyhow::Result<Self> {
        let settings = store.load()?;
        settings.validate()?;

        let downloader: Arc<dyn Acquirer> =
            Arc::new(Downloader::new(SourceRegistry::exchanges(), settings.download_dir())?);
        let scheduler = SchedulerService::new(Arc::clone(&downloader), options);
        let transformer = Transformer::new(settings.download_dir(), settings.processed_dir());

        Ok(Self::new(store, downloader, scheduler, transformer))
    }

    pub fn scheduler(&self) -> &Arc<SchedulerService> {
        &self.scheduler
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// Download every weekday in `from..=to`, one date at a time
    pub async fn acquire_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        job_type: JobType,
    ) -> Result<RangeReport, AcquireError> {
        acquire_range(self.acquirer.as_ref(), from, to, job_type).await
    }

    /// Transform a downloaded file on the blocking thread pool
    pub async fn transform(&self, input: &str) -> Result<TransformResult, TransformError> {
        let transformer = self.transformer.clone();
        let input = input.to_string();
        tokio::task::spawn_blocking(move || transformer.transform(&input))
            .await
            .map_err(|e| TransformError::ProcessingFailure(format!("Transform task failed: {}", e)))?
            .inspect_err(|e| warn!(error = %e, "Transform failed"))
    }

    pub async fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status().await
    }

    /// Apply the stored schedule; stays stopped when it is disabled
    pub async fn start_scheduler(&self) -> Result<SchedulerState, ServiceError> {
        let schedule = self.store.load()?.schedule()?;
        self.apply(schedule).await
    }

    pub async fn stop_scheduler(&self) -> bool {
        let was_running = self.scheduler.stop().await;
        // Forget the applied schedule so a later sync starts it again
        *self.applied.lock().await = None;
        was_running
    }

    pub fn get_settings(&self) -> Result<Settings, ConfigError> {
        self.store.load()
    }

    /// Validate and persist `settings`, reloading the scheduler when the
    /// schedule changed
    pub async fn save_settings(&self, settings: Settings) -> Result<SaveReport, ServiceError> {
        let schedule = settings.schedule()?;
        let previous = self.store.load().ok().and_then(|s| s.schedule().ok());

        self.store.save(&settings)?;
        info!(path = %self.store.path().display(), "Settings saved");

        let warning = settings.early_schedule_warning();
        if let Some(warning) = &warning {
            warn!("{}", warning);
        }

        let (scheduler_reloaded, scheduler_state) = if previous != Some(schedule) {
            (true, Some(self.apply(schedule).await?))
        } else {
            (false, None)
        };

        Ok(SaveReport {
            saved: true,
            scheduler_reloaded,
            scheduler_state,
            warning,
        })
    }

    /// Re-read the settings document and reload the scheduler if the
    /// schedule differs from the one last applied.
    ///
    /// Returns whether a reload happened.
    pub async fn sync_settings(&self) -> Result<bool, ServiceError> {
        let schedule = self.store.load()?.schedule()?;
        if *self.applied.lock().await == Some(schedule) {
            return Ok(false);
        }
        info!("Settings changed, reloading scheduler");
        self.apply(schedule).await?;
        Ok(true)
    }

    async fn apply(&self, schedule: ScheduleConfig) -> Result<SchedulerState, ServiceError> {
        let mut applied = self.applied.lock().await;
        let state = self.scheduler.reload(schedule).await?;
        *applied = Some(schedule);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::{AcquisitionOutcome, AcquisitionRequest};
    use async_trait::async_trait;

    struct NeverAvailable;

    #[async_trait]
    impl Acquirer for NeverAvailable {
        async fn acquire(&self, _request: AcquisitionRequest) -> Result<AcquisitionOutcome, AcquireError> {
            Ok(AcquisitionOutcome::NotYetAvailable {
                reason: "not yet".to_string(),
            })
        }

        fn supports(&self, _job_type: JobType) -> bool {
            true
        }
    }

    fn service(dir: &std::path::Path) -> IngestService {
        let acquirer: Arc<dyn Acquirer> = Arc::new(NeverAvailable);
        let scheduler = SchedulerService::new(Arc::clone(&acquirer), SchedulerOptions::default());
        IngestService::new(
            SettingsStore::new(dir.join("settings.json")),
            acquirer,
            scheduler,
            Transformer::new(dir.join("downloads"), dir.join("processed")),
        )
    }

    #[tokio::test]
    async fn test_save_reloads_only_on_schedule_change() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let enabled = Settings {
            scheduler_enabled: true,
            ..Settings::default()
        };
        let report = service.save_settings(enabled.clone()).await.unwrap();
        assert!(report.scheduler_reloaded);
        assert_eq!(report.scheduler_state, Some(SchedulerState::Running));
        assert_eq!(report.warning, None);
        assert_eq!(service.scheduler_status().await.state, SchedulerState::Running);

        let moved_path = Settings {
            download_path: "elsewhere".to_string(),
            ..enabled
        };
        let report = service.save_settings(moved_path).await.unwrap();
        assert!(!report.scheduler_reloaded);
        assert_eq!(service.get_settings().unwrap().download_path, "elsewhere");
    }

    #[tokio::test]
    async fn test_early_time_saves_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let report = service
            .save_settings(Settings {
                scheduler_enabled: true,
                scheduler_time: "09:15".to_string(),
                ..Settings::default()
            })
            .await
            .unwrap();

        assert!(report.saved);
        assert!(report.warning.unwrap().contains("18:30"));
    }

    #[tokio::test]
    async fn test_invalid_time_is_rejected_and_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let err = service
            .save_settings(Settings {
                scheduler_time: "7pm".to_string(),
                ..Settings::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Config(_)));
        assert!(service.get_settings().unwrap() == Settings::default());
        assert_eq!(service.scheduler_status().await.state, SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_sync_settings_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        assert_eq!(service.start_scheduler().await.unwrap(), SchedulerState::Stopped);
        assert!(!service.sync_settings().await.unwrap());

        let store = SettingsStore::new(dir.path().join("settings.json"));
        store
            .save(&Settings {
                scheduler_enabled: true,
                ..Settings::default()
            })
            .unwrap();

        assert!(service.sync_settings().await.unwrap());
        assert_eq!(service.scheduler_status().await.state, SchedulerState::Running);
        assert!(!service.sync_settings().await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_then_sync_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        service
            .save_settings(Settings {
                scheduler_enabled: true,
                ..Settings::default()
            })
            .await
            .unwrap();

        assert!(service.stop_scheduler().await);
        assert_eq!(service.scheduler_status().await.state, SchedulerState::Stopped);

        assert!(service.sync_settings().await.unwrap());
        assert_eq!(service.scheduler_status().await.state, SchedulerState::Running);
    }

    #[tokio::test]
    async fn test_range_delegates_to_acquirer() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();

        let report = service.acquire_range(day, day, JobType::NseDelivery).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.details, vec!["not yet".to_string()]);
    }
}
