use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::fetcher::{Pacing, RequestConfig, DEFAULT_USER_AGENT};
use crate::scheduler::ScheduleConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: PathBuf,
    pub bind: SocketAddr,
    pub schedule: ScheduleConfig,
    pub schedule_enabled: bool,
    pub pacing: Pacing,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl AppConfig {
    /// Header, timeout and pacing template shared by every source.
    pub fn request_template(&self) -> RequestConfig {
        RequestConfig::new(String::new())
            .with_user_agent(&self.user_agent)
            .with_timeout(self.request_timeout)
            .with_pacing(self.pacing)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("houses.db"),
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            schedule: ScheduleConfig::default(),
            schedule_enabled: true,
            pacing: Pacing::default(),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Converts a user-supplied number of seconds into a delay.
pub fn delay_from_secs(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .with_context(|| format!("{} must be a finite, non-negative number of seconds, got {}", name, secs))
}

/// Converts a user-supplied number of hours into a schedule period of at least one hour.
pub fn period_from_hours(hours: u64) -> Result<Duration> {
    hours
        .max(1)
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("schedule interval of {} hours is too large", hours))
}
