use std::env;
use std::time::Duration;

/// Runtime tunables, read from the environment once at boot.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Follow-up scheduler cadence.
    pub tick_interval: Duration,
    /// Mailbox polling cadence when IDLE is unsupported.
    pub poll_interval: Duration,
    /// Keepalive NOOP cadence while an IMAP connection is held.
    pub keepalive_interval: Duration,
    /// Bounded IMAP reconnect policy.
    pub sync_retry_max: u32,
    pub sync_retry_delay: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://funnelpost.db".into());
        Config {
            database_url,
            tick_interval: duration_var("SCHEDULER_TICK_SECS", 60),
            poll_interval: duration_var("IMAP_POLL_SECS", 30),
            keepalive_interval: duration_var("IMAP_KEEPALIVE_SECS", 30),
            sync_retry_max: env::var("IMAP_RETRY_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            sync_retry_delay: duration_var("IMAP_RETRY_DELAY_SECS", 15),
        }
    }
}

fn duration_var(key: &str, default_secs: u64) -> Duration {
    let secs = env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
