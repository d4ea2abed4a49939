//! Throttling policy for repeated error notifications

use std::fmt;

/// Gate deciding whether a consecutive-failure burst warrants an alert
#[derive(Debug, Clone, Copy)]
pub struct ErrorThrottle {
    pub threshold: u32,
    pub cooldown_ms: u64,
}

/// Outcome of evaluating the throttle for one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Both the count threshold and the cooldown are satisfied
    Send,
    /// The consecutive error count has not reached the threshold yet
    BelowThreshold { count: u32, threshold: u32 },
    /// A previous error notification is still cooling down
    CoolingDown { remaining_ms: u64 },
}

impl fmt::Display for ThrottleDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThrottleDecision::Send => write!(f, "send"),
            ThrottleDecision::BelowThreshold { count, threshold } => {
                write!(f, "{} of {} consecutive errors", count, threshold)
            }
            ThrottleDecision::CoolingDown { remaining_ms } => {
                write!(f, "cooldown has {}ms remaining", remaining_ms)
            }
        }
    }
}

impl ErrorThrottle {
    /// Decide whether an error notification should be sent now.
    ///
    /// `last_notified_ms` is the epoch time of the previous error
    /// notification, if any.
    pub fn evaluate(
        &self,
        error_count: u32,
        last_notified_ms: Option<u64>,
        now_ms: u64,
    ) -> ThrottleDecision {
        if error_count < self.threshold {
            return ThrottleDecision::BelowThreshold {
                count: error_count,
                threshold: self.threshold,
            };
        }

        let elapsed = now_ms.saturating_sub(last_notified_ms.unwrap_or(0));
        if elapsed < self.cooldown_ms {
            return ThrottleDecision::CoolingDown {
                remaining_ms: self.cooldown_ms - elapsed,
            };
        }

        ThrottleDecision::Send
    }
}
