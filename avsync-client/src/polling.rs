//! Bounded retry with a fixed delay.

use crate::config::SyncConfig;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for PollPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self::new(config.poll_attempts, config.poll_interval())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The check succeeded on this attempt (1-based).
    Found { attempt: u32 },
    TimedOut,
}

impl PollOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, PollOutcome::Found { .. })
    }
}

/// Run `check` up to `policy.attempts` times, sleeping `policy.interval`
/// after every miss. A check error stops the loop and is returned.
///
/// Always terminates; callers needing cancellation drop the future.
pub async fn poll_until<F, Fut, E>(policy: PollPolicy, mut check: F) -> Result<PollOutcome, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    for attempt in 1..=policy.attempts {
        if check(attempt).await? {
            return Ok(PollOutcome::Found { attempt });
        }
        tracing::debug!(attempt, attempts = policy.attempts, "poll miss");
        tokio::time::sleep(policy.interval).await;
    }
    Ok(PollOutcome::TimedOut)
}
