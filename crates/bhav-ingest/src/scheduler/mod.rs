//! Scheduled acquisition
//!
//! [`SchedulerService`] owns one recurring daily trigger and at most one
//! pending one-shot retry. A background task sleeps until the earliest due
//! trigger and spawns its callback on a separate task, so a slow download
//! never blocks [`SchedulerService::status`] or a reload.
//!
//! # Run semantics
//!
//! - The daily run fetches the configured job type for today, or for the
//!   manual override date when one is set. Weekends are skipped unless an
//!   override is set.
//! - `NotYetAvailable` arms the retry 30 minutes out, replacing any pending
//!   retry.
//! - The retry runs once and never re-arms itself.
//! - A stop or a disabling reload during the download wins: the retry is
//!   dropped instead of armed.
//! - `HardFailure` is logged and not retried.

pub mod clock;
pub mod triggers;

use bhav_common::types::is_weekend;
use chrono::{DateTime, Local, NaiveDate, TimeDelta};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::acquire::{AcquireError, Acquirer, AcquisitionOutcome, AcquisitionRequest};
use crate::config::ScheduleConfig;
use crate::registry::JobType;

pub use clock::{Clock, ManualClock, SystemClock};
pub use triggers::{DueTrigger, OneShotTrigger, RecurringTrigger, TriggerTable, DAILY_JOB_KEY, RETRY_JOB_KEY};

/// Delay between a not-yet-published daily run and its retry
pub const DEFAULT_RETRY_DELAY_MINUTES: i64 = 30;

// Upper bound on a single sleep, so wall-clock jumps are noticed
const MAX_IDLE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("Schedule '{0}' has no upcoming fire time")]
    NoUpcomingFire(String),
}

/// Tunables for the scheduled run
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Job type fetched by the daily run
    pub job_type: JobType,
    pub retry_delay: TimeDelta,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            job_type: JobType::NseBhavcopy,
            retry_delay: TimeDelta::minutes(DEFAULT_RETRY_DELAY_MINUTES),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Snapshot answered by [`SchedulerService::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub next_run: Option<DateTime<Local>>,
    pub job_id: Option<String>,
    pub pending_retry: Option<OneShotTrigger>,
}

/// What a daily run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ScheduledRunReport {
    SkippedWeekend {
        date: NaiveDate,
    },
    Completed {
        date: NaiveDate,
        outcome: AcquisitionOutcome,
    },
    RetryScheduled {
        date: NaiveDate,
        at: DateTime<Local>,
        reason: String,
    },
    /// Not available yet, but the scheduler was stopped while downloading
    RetryDropped {
        date: NaiveDate,
        reason: String,
    },
    Failed {
        reason: String,
    },
}

pub struct SchedulerService {
    triggers: Mutex<TriggerTable>,
    acquirer: Arc<dyn Acquirer>,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
    wake: Notify,
}

impl SchedulerService {
    pub fn new(acquirer: Arc<dyn Acquirer>, options: SchedulerOptions) -> Arc<Self> {
        Self::with_clock(acquirer, Arc::new(SystemClock), options)
    }

    pub fn with_clock(acquirer: Arc<dyn Acquirer>, clock: Arc<dyn Clock>, options: SchedulerOptions) -> Arc<Self> {
        Arc::new(Self {
            triggers: Mutex::new(TriggerTable::default()),
            acquirer,
            clock,
            options,
            wake: Notify::new(),
        })
    }

    /// Same as [`reload`](Self::reload)
    pub async fn start(&self, config: ScheduleConfig) -> Result<SchedulerState, SchedulerError> {
        self.reload(config).await
    }

    /// Rebuild the recurring trigger from `config`.
    ///
    /// Disabled: the recurring trigger and any pending retry are removed.
    /// Enabled: the recurring trigger is replaced in one step, so callers never
    /// see both the old and the new one. A pending retry is kept.
    pub async fn reload(&self, config: ScheduleConfig) -> Result<SchedulerState, SchedulerError> {
        let mut table = self.triggers.lock().await;

        if !config.enabled {
            let removed = table.clear();
            drop(table);
            self.wake.notify_one();
            info!(removed, "Scheduler disabled");
            return Ok(SchedulerState::Stopped);
        }

        let trigger = RecurringTrigger::daily(config, self.clock.now())?;
        let next_fire = trigger.next_fire();
        let replaced = table.replace_recurring(trigger);
        drop(table);
        self.wake.notify_one();

        info!(
            job_id = DAILY_JOB_KEY,
            time = %config.time_of_day,
            manual_date = ?config.manual_override_date,
            next_run = %next_fire,
            replaced,
            "Scheduler started"
        );
        Ok(SchedulerState::Running)
    }

    /// Remove the recurring trigger and any pending retry.
    ///
    /// Returns whether the scheduler was running; stopping twice is fine.
    pub async fn stop(&self) -> bool {
        let was_running = self.triggers.lock().await.clear();
        self.wake.notify_one();

        if was_running {
            info!("Scheduler stopped");
        } else {
            debug!("Scheduler stop requested but no daily job was registered");
        }
        was_running
    }

    pub async fn status(&self) -> SchedulerStatus {
        let table = self.triggers.lock().await;
        match table.recurring() {
            Some(trigger) => SchedulerStatus {
                state: SchedulerState::Running,
                next_run: Some(trigger.next_fire()),
                job_id: Some(DAILY_JOB_KEY.to_string()),
                pending_retry: table.retry().copied(),
            },
            None => SchedulerStatus {
                state: SchedulerState::Stopped,
                next_run: None,
                job_id: None,
                pending_retry: table.retry().copied(),
            },
        }
    }

    /// The daily callback
    pub async fn run_scheduled(&self, config: ScheduleConfig) -> ScheduledRunReport {
        let job_type = self.options.job_type;
        info!(job_type = %job_type, "Running scheduled download task");

        let date = match config.manual_override_date {
            Some(date) => {
                info!(date = %date, "Using manual override date");
                date
            },
            None => {
                let today = self.clock.now().date_naive();
                if is_weekend(today) {
                    info!(date = %today, "Skipping scheduled download on weekend");
                    return ScheduledRunReport::SkippedWeekend { date: today };
                }
                today
            },
        };

        let generation = self.triggers.lock().await.generation();
        let outcome = match self.acquirer.acquire(AcquisitionRequest::new(date, job_type)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Scheduled download could not start");
                return ScheduledRunReport::Failed { reason: e.to_string() };
            },
        };

        match outcome {
            AcquisitionOutcome::NotYetAvailable { reason } => {
                let at = self.clock.now() + self.options.retry_delay;
                let armed = self.triggers.lock().await.replace_retry_if_current(
                    generation,
                    OneShotTrigger {
                        fire_at: at,
                        target_date: date,
                    },
                );
                let Some(replaced) = armed else {
                    info!(date = %date, "Scheduler stopped during download, not scheduling retry");
                    return ScheduledRunReport::RetryDropped { date, reason };
                };
                self.wake.notify_one();
                warn!(
                    job_id = RETRY_JOB_KEY,
                    date = %date,
                    retry_at = %at,
                    replaced,
                    "Data not available yet, scheduling retry"
                );
                ScheduledRunReport::RetryScheduled { date, at, reason }
            },
            AcquisitionOutcome::Success { ref saved_filename } => {
                info!(date = %date, file = %saved_filename, "Scheduled download successful");
                ScheduledRunReport::Completed { date, outcome }
            },
            AcquisitionOutcome::HardFailure { ref reason } => {
                error!(date = %date, reason = %reason, "Scheduled download failed, not retrying");
                ScheduledRunReport::Completed { date, outcome }
            },
        }
    }

    /// The retry callback: one more attempt for `date`, never re-armed
    pub async fn run_retry(&self, date: NaiveDate) -> Result<AcquisitionOutcome, AcquireError> {
        info!(date = %date, "Retrying download");
        let outcome = self
            .acquirer
            .acquire(AcquisitionRequest::new(date, self.options.job_type))
            .await
            .inspect_err(|e| error!(date = %date, error = %e, "Retry could not start"))?;

        if outcome.is_success() {
            info!(date = %date, "Retry successful: {}", outcome.message());
        } else {
            error!(date = %date, "Retry failed: {}", outcome.message());
        }
        Ok(outcome)
    }

    /// Fire everything due now, each callback on its own task
    pub async fn tick(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let now = self.clock.now();
        let due = self.triggers.lock().await.take_due(now);

        due.into_iter()
            .map(|trigger| {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    match trigger {
                        DueTrigger::Daily(config) => {
                            this.run_scheduled(config).await;
                        },
                        DueTrigger::Retry(date) => {
                            // Outcome and errors are already logged
                            let _ = this.run_retry(date).await;
                        },
                    }
                })
            })
            .collect()
    }

    /// Start the background timer loop
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_loop().await })
    }

    async fn run_loop(self: Arc<Self>) {
        info!("Scheduler loop started");
        loop {
            let next = self.triggers.lock().await.next_wake();
            let wait = match next {
                Some(at) => (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO),
                None => MAX_IDLE,
            };

            if !wait.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(wait.min(MAX_IDLE)) => {},
                    _ = self.wake.notified() => continue,
                }
            }

            self.tick().await;
        }
    }
}
