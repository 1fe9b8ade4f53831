use crate::config::PolitenessConfig;
use std::time::Duration;

/// Resolved delay settings for one politeness key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Politeness {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub delay_factor: f64,
}

impl Politeness {
    pub fn from_config(config: &PolitenessConfig) -> Self {
        Self {
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            delay_factor: config.delay_factor,
        }
    }

    /// Computes how long a key snoozes after a fetch that took `fetch_duration`
    ///
    /// The delay is `fetch_duration * delay_factor`, bounded below by
    /// `min_delay` and above by `max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use sumi_frontier::state::Politeness;
    ///
    /// let p = Politeness {
    ///     min_delay: Duration::from_secs(1),
    ///     max_delay: Duration::from_secs(10),
    ///     delay_factor: 5.0,
    /// };
    /// assert_eq!(p.delay_after(Duration::from_millis(100)), Duration::from_secs(1));
    /// assert_eq!(p.delay_after(Duration::from_secs(1)), Duration::from_secs(5));
    /// assert_eq!(p.delay_after(Duration::from_secs(4)), Duration::from_secs(10));
    /// ```
    pub fn delay_after(&self, fetch_duration: Duration) -> Duration {
        let scaled = Duration::try_from_secs_f64(fetch_duration.as_secs_f64() * self.delay_factor)
            .unwrap_or(self.max_delay);

        scaled.min(self.max_delay).max(self.min_delay)
    }
}
