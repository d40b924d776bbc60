//! Human-shaped wall-clock durations.
//!
//! Job time limits and accounting records use an hours/minutes/seconds
//! triple rather than a raw millisecond count, matching how schedulers
//! express walltime requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// A wall-clock duration expressed as hours, minutes and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleDuration {
    /// Whole hours.
    pub hours: u32,
    /// Minutes, 0-59.
    pub minutes: u32,
    /// Seconds, 0-59.
    pub seconds: u32,
}

impl SimpleDuration {
    /// Creates a duration, validating the minute and second components.
    ///
    /// # Errors
    ///
    /// Returns an error if `minutes` or `seconds` is 60 or more.
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Result<Self> {
        if minutes >= 60 || seconds >= 60 {
            return Err(Error::InvalidDuration {
                message: format!("minutes and seconds must be below 60, got {minutes}m{seconds}s"),
            });
        }
        Ok(Self {
            hours,
            minutes,
            seconds,
        })
    }

    /// Returns the total duration in milliseconds.
    #[must_use]
    pub const fn to_millis(&self) -> u64 {
        (self.hours as u64 * 3600 + self.minutes as u64 * 60 + self.seconds as u64) * 1000
    }

    /// Converts to a standard library duration.
    #[must_use]
    pub const fn to_std(&self) -> Duration {
        Duration::from_millis(self.to_millis())
    }
}

impl fmt::Display for SimpleDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_millis() {
        let d = SimpleDuration::new(1, 30, 15).unwrap();
        assert_eq!(d.to_millis(), (3600 + 30 * 60 + 15) * 1000);
    }

    #[test]
    fn duration_rejects_overflowing_components() {
        assert!(SimpleDuration::new(0, 60, 0).is_err());
        assert!(SimpleDuration::new(0, 0, 61).is_err());
    }

    #[test]
    fn duration_display_pads() {
        let d = SimpleDuration::new(2, 5, 0).unwrap();
        assert_eq!(d.to_string(), "02:05:00");
    }
}
