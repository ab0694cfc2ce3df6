//! Connection and reconnection settings.

use std::time::Duration;

/// Settings for opening a channel.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Deadline for the transport to come up, including the Engine.IO
    /// and namespace handshakes. Default: 20 seconds.
    pub connect_timeout: Duration,

    /// What the transport does after an unrequested drop.
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Library-level retry policy for a dropped transport.
///
/// The delay doubles per attempt from `base_delay` up to `max_delay`, then
/// is spread by up to `jitter` (a fraction of the delay) in either
/// direction so clients dropped together do not reconnect together.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Whether to reconnect at all. Default: `true`.
    pub enabled: bool,

    /// Give up after this many failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,

    /// Delay before the first attempt. Default: 1 second.
    pub base_delay: Duration,

    /// Upper bound on the delay between attempts. Default: 5 seconds.
    pub max_delay: Duration,

    /// Randomization factor in `0.0..=1.0`. Default: 0.5.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: None,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: 0.5,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnection attempt `attempt` (1-based).
    ///
    /// `random` is a sample from `0.0..1.0`; 0.5 yields the un-jittered
    /// delay.
    pub fn delay_for_attempt(&self, attempt: u32, random: f64) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let ms = (base_ms * f64::from(1_u32 << shift)).min(max_ms);

        let jitter = self.jitter.clamp(0.0, 1.0);
        let deviation = (random.clamp(0.0, 1.0) * 2.0 - 1.0) * jitter * ms;
        let jittered = (ms + deviation).clamp(0.0, max_ms);
        Duration::from_millis(jittered as u64)
    }

    /// Returns `true` once `failed` attempts exhaust the policy.
    pub fn is_exhausted(&self, failed: u32) -> bool {
        self.max_attempts.is_some_and(|max| failed >= max)
    }
}
