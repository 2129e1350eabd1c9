use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{LeadDeskError, Result};

/// How long a lead may wait for its first agent reply before it counts as missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedChatTimer {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl Default for MissedChatTimer {
    fn default() -> Self {
        Self {
            hour: 1,
            minute: 0,
            second: 0,
        }
    }
}

impl MissedChatTimer {
    pub fn total_seconds(&self) -> i64 {
        i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second)
    }

    /// `None` for a zero timer, which disables missed-chat flagging.
    pub fn threshold(&self) -> Option<Duration> {
        match self.total_seconds() {
            0 => None,
            secs => Some(Duration::seconds(secs)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.minute >= 60 || self.second >= 60 {
            return Err(LeadDeskError::validation(
                "missed_chat_timer minute and second must be below 60",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatSettings {
    pub missed_chat_timer: MissedChatTimer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timer_is_one_hour() {
        let timer = MissedChatTimer::default();
        assert_eq!(timer.total_seconds(), 3600);
        assert_eq!(timer.threshold(), Some(Duration::hours(1)));
    }

    #[test]
    fn test_zero_timer_disables_threshold() {
        let timer = MissedChatTimer {
            hour: 0,
            minute: 0,
            second: 0,
        };
        assert_eq!(timer.threshold(), None);
    }

    #[test]
    fn test_validate_rejects_overflowing_minutes() {
        let timer = MissedChatTimer {
            hour: 0,
            minute: 75,
            second: 0,
        };
        assert!(matches!(timer.validate(), Err(LeadDeskError::Validation(_))));
        assert!(MissedChatTimer::default().validate().is_ok());
    }
}
