//! Boot-time companion: waits for the management service and restarts
//! guests configured to start with the host.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use vzupgrade_core::{GuestState, Settings};

use crate::guests::GuestControl;

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.retry_interval(),
            max_attempts: settings.retry_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Connected { value: T, attempts: u32 },
    GaveUp { attempts: u32, last_error: String },
}

/// Calls `attempt` until it succeeds or `max_attempts` calls have failed,
/// sleeping `interval` between calls. Never sleeps after the final attempt.
pub fn connect_with_retry<T, F>(
    policy: RetryPolicy,
    sleeper: &mut dyn Sleeper,
    mut attempt: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for number in 1..=max_attempts {
        match attempt(number) {
            Ok(value) => {
                return RetryOutcome::Connected {
                    value,
                    attempts: number,
                };
            }
            Err(err) => {
                last_error = format!("{err:#}");
                tracing::debug!(attempt = number, error = %last_error, "connection attempt failed");
            }
        }
        if number < max_attempts {
            sleeper.sleep(policy.interval);
        }
    }

    RetryOutcome::GaveUp {
        attempts: max_attempts,
        last_error,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutostartReport {
    pub started: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped_templates: usize,
}

/// Starts every autostart guest that is neither running nor in transition.
pub fn start_autostart_guests(control: &mut dyn GuestControl) -> Result<AutostartReport> {
    let templates = control.template_ids()?;
    let roster = control.roster()?;
    let mut report = AutostartReport::default();

    for guest in roster {
        if templates.contains(&guest.id) {
            report.skipped_templates += 1;
            continue;
        }
        if !guest.autostart {
            continue;
        }
        if !matches!(guest.state, GuestState::Stopped | GuestState::Suspended) {
            continue;
        }

        tracing::info!(guest = %guest.name, "starting autostart guest");
        match control.start(&guest.id) {
            Ok(()) => report.started.push(guest.id),
            Err(err) => {
                let message = format!("{err:#}");
                tracing::warn!(guest = %guest.name, error = %message, "failed to start guest");
                report.failed.push((guest.id, message));
            }
        }
    }

    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostBootOutcome {
    Started(AutostartReport),
    GaveUp { attempts: u32 },
}

pub fn run_post_boot(
    control: &mut dyn GuestControl,
    policy: RetryPolicy,
    sleeper: &mut dyn Sleeper,
) -> Result<PostBootOutcome> {
    match connect_with_retry(policy, sleeper, |_| control.ping()) {
        RetryOutcome::Connected { attempts, .. } => {
            tracing::info!(attempts, "management service is up");
            start_autostart_guests(control).map(PostBootOutcome::Started)
        }
        RetryOutcome::GaveUp {
            attempts,
            last_error,
        } => {
            tracing::warn!(attempts, error = %last_error, "management service did not come up, giving up");
            Ok(PostBootOutcome::GaveUp { attempts })
        }
    }
}
