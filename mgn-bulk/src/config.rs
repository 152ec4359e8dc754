use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENT: usize = 10;
pub const DEFAULT_RATE_LIMIT_CALLS: usize = 50;
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Tuning for bulk operations
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkConfig {
    /// Upper bound on remote calls in flight at once
    pub max_concurrent: usize,
    /// Calls admitted per `rate_limit_window`
    pub rate_limit_calls: usize,
    pub rate_limit_window: Duration,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            rate_limit_calls: DEFAULT_RATE_LIMIT_CALLS,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
        }
    }
}

impl BulkConfig {
    pub fn new(max_concurrent: usize, rate_limit_calls: usize, rate_limit_window: Duration) -> Self {
        Self {
            max_concurrent,
            rate_limit_calls,
            rate_limit_window,
        }
        .normalized()
    }

    /// Zero bounds would stall every operation; treat them as 1
    pub fn normalized(mut self) -> Self {
        self.max_concurrent = self.max_concurrent.max(1);
        self.rate_limit_calls = self.rate_limit_calls.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BulkConfig::default();
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.rate_limit_calls, 50);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
    }

    #[test]
    fn test_zero_bounds_are_clamped() {
        let config = BulkConfig::new(0, 0, Duration::from_secs(1));
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.rate_limit_calls, 1);
    }
}
