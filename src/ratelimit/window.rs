//! Fixed window policy and admission outcomes.

use std::time::Duration;

use crate::config::RateLimitConfig;

/// A fixed window: at most `max_requests` within `duration` of the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    max_requests: u64,
    duration: Duration,
}

impl RateWindow {
    pub fn new(max_requests: u64, duration: Duration) -> Self {
        Self {
            max_requests,
            duration,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    /// Requests allowed per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Length of a window, counted from the first request.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether the request that brought the counter to `count` is allowed.
    pub fn admits(&self, count: u64) -> bool {
        count <= self.max_requests
    }

    /// Requests left in the window once the counter is at `count`.
    pub fn remaining(&self, count: u64) -> u64 {
        self.max_requests.saturating_sub(count)
    }

    /// Human readable window length, e.g. "1 minute".
    pub fn describe(&self) -> String {
        let secs = self.duration.as_secs();
        let (value, unit) = if secs >= 3600 && secs % 3600 == 0 {
            (secs / 3600, "hour")
        } else if secs >= 60 && secs % 60 == 0 {
            (secs / 60, "minute")
        } else {
            (secs, "second")
        };

        if value == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", value, unit)
        }
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Within budget
    Allowed { count: u64, remaining: u64 },
    /// Over budget; the request still counted
    Denied { count: u64 },
    /// The counter could not be read or updated, so the request was let through
    FailedOpen,
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Denied { .. })
    }

    /// Requests left in the window, when known.
    pub fn remaining(&self) -> Option<u64> {
        match self {
            Admission::Allowed { remaining, .. } => Some(*remaining),
            Admission::Denied { .. } => Some(0),
            Admission::FailedOpen => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window() {
        let window = RateWindow::default();
        assert_eq!(window.max_requests(), 10);
        assert_eq!(window.duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_admits_up_to_max() {
        let window = RateWindow::new(5, Duration::from_secs(1));

        assert!(window.admits(1));
        assert!(window.admits(5));
        assert!(!window.admits(6));
    }

    #[test]
    fn test_remaining() {
        let window = RateWindow::new(10, Duration::from_secs(60));

        assert_eq!(window.remaining(1), 9);
        assert_eq!(window.remaining(10), 0);
        assert_eq!(window.remaining(15), 0);
    }

    #[test]
    fn test_describe() {
        assert_eq!(RateWindow::new(1, Duration::from_secs(60)).describe(), "1 minute");
        assert_eq!(RateWindow::new(1, Duration::from_secs(120)).describe(), "2 minutes");
        assert_eq!(RateWindow::new(1, Duration::from_secs(3600)).describe(), "1 hour");
        assert_eq!(RateWindow::new(1, Duration::from_secs(90)).describe(), "90 seconds");
        assert_eq!(RateWindow::new(1, Duration::from_secs(1)).describe(), "1 second");
    }

    #[test]
    fn test_admission_is_allowed() {
        assert!(Admission::Allowed { count: 1, remaining: 9 }.is_allowed());
        assert!(Admission::FailedOpen.is_allowed());
        assert!(!Admission::Denied { count: 11 }.is_allowed());

        assert_eq!(Admission::FailedOpen.remaining(), None);
        assert_eq!(Admission::Denied { count: 11 }.remaining(), Some(0));
    }
}
