//! Trigger table
//!
//! Holds at most one recurring trigger and at most one one-shot retry.
//! Registering either kind replaces the previous one in a single step, and
//! removal reports whether anything was there instead of failing.
//!
//! [`TriggerTable::clear`] also bumps a generation counter. A callback that
//! captured the generation before a long download compares it afterwards,
//! so it never arms a retry on a table that was cleared meanwhile.

use chrono::{DateTime, Local, NaiveDate};
use cron::Schedule;
use serde::Serialize;
use std::str::FromStr;

use super::SchedulerError;
use crate::config::ScheduleConfig;

/// Key of the recurring daily trigger
pub const DAILY_JOB_KEY: &str = "daily-job";

/// Key of the pending one-shot retry
pub const RETRY_JOB_KEY: &str = "retry-job";

/// Six-field cron expression firing once a day at `hour:minute:00`
pub fn daily_cron_expression(config: &ScheduleConfig) -> String {
    format!(
        "0 {} {} * * *",
        config.time_of_day.minute(),
        config.time_of_day.hour()
    )
}

/// Fires every day at the configured time of day
#[derive(Debug, Clone)]
pub struct RecurringTrigger {
    schedule: Schedule,
    config: ScheduleConfig,
    next_fire: DateTime<Local>,
}

impl RecurringTrigger {
    pub fn daily(config: ScheduleConfig, now: DateTime<Local>) -> Result<Self, SchedulerError> {
        let expression = daily_cron_expression(&config);
        let schedule = Schedule::from_str(&expression).map_err(|e| SchedulerError::InvalidSchedule {
            expression: expression.clone(),
            reason: e.to_string(),
        })?;
        let next_fire = schedule
            .after(&now)
            .next()
            .ok_or(SchedulerError::NoUpcomingFire(expression))?;

        Ok(Self {
            schedule,
            config,
            next_fire,
        })
    }

    pub fn next_fire(&self) -> DateTime<Local> {
        self.next_fire
    }

    /// Move to the first fire time strictly after `now`
    fn advance(&mut self, now: DateTime<Local>) -> bool {
        match self.schedule.after(&now).next() {
            Some(next) => {
                self.next_fire = next;
                true
            },
            None => false,
        }
    }
}

/// Fires once, then removes itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OneShotTrigger {
    pub fire_at: DateTime<Local>,
    /// Trading date the retry acquires
    pub target_date: NaiveDate,
}

/// A trigger that came due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueTrigger {
    Daily(ScheduleConfig),
    Retry(NaiveDate),
}

#[derive(Debug, Default)]
pub struct TriggerTable {
    recurring: Option<RecurringTrigger>,
    retry: Option<OneShotTrigger>,
    generation: u64,
}

impl TriggerTable {
    pub fn recurring(&self) -> Option<&RecurringTrigger> {
        self.recurring.as_ref()
    }

    pub fn retry(&self) -> Option<&OneShotTrigger> {
        self.retry.as_ref()
    }

    /// Install `trigger`, returning whether one was replaced
    pub fn replace_recurring(&mut self, trigger: RecurringTrigger) -> bool {
        self.recurring.replace(trigger).is_some()
    }

    pub fn remove_recurring(&mut self) -> bool {
        self.recurring.take().is_some()
    }

    /// Install `trigger`, returning whether one was replaced
    pub fn replace_retry(&mut self, trigger: OneShotTrigger) -> bool {
        self.retry.replace(trigger).is_some()
    }

    pub fn remove_retry(&mut self) -> bool {
        self.retry.take().is_some()
    }

    /// Remove both triggers and start a new generation.
    ///
    /// Returns whether a recurring trigger was installed.
    pub fn clear(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        self.remove_retry();
        self.remove_recurring()
    }

    /// Bumped by every [`clear`](Self::clear)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Install `trigger` only if the table was not cleared since `generation`.
    ///
    /// `None` when the table moved on; otherwise whether a retry was replaced.
    pub fn replace_retry_if_current(&mut self, generation: u64, trigger: OneShotTrigger) -> Option<bool> {
        (self.generation == generation).then(|| self.replace_retry(trigger))
    }

    /// Earliest time anything is due
    pub fn next_wake(&self) -> Option<DateTime<Local>> {
        let daily = self.recurring.as_ref().map(|t| t.next_fire);
        let retry = self.retry.as_ref().map(|t| t.fire_at);
        match (daily, retry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Collect everything due at `now`.
    ///
    /// The recurring trigger advances to its next fire time; the retry is
    /// removed.
    pub fn take_due(&mut self, now: DateTime<Local>) -> Vec<DueTrigger> {
        let mut due = Vec::new();

        if let Some(trigger) = self.recurring.as_mut().filter(|t| t.next_fire <= now) {
            due.push(DueTrigger::Daily(trigger.config));
            if !trigger.advance(now) {
                self.recurring = None;
            }
        }

        if self.retry.is_some_and(|t| t.fire_at <= now) {
            if let Some(retry) = self.retry.take() {
                due.push(DueTrigger::Retry(retry.target_date));
            }
        }

        due
    }
}
