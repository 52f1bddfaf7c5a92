//! Per-user status record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::AlertLevel;

/// Mutable status record, one per user, owned exclusively by the engine.
///
/// The record is the authoritative snapshot the escalation policy reads and
/// writes. The append-only activity log, not this snapshot, is the durable
/// audit trail of what happened when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    /// Opaque external identity.
    pub user_id: String,
    /// Last confirmed check-in. Absent if the user never checked in.
    pub last_check_in: Option<DateTime<Utc>>,
    /// When the user next needs attention. Absent means no active schedule.
    pub next_due: Option<DateTime<Utc>>,
    /// Current alert tier.
    pub alert_level: AlertLevel,
    /// When the current alert tier was entered. Present iff alerted.
    pub alert_entered_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency counter, incremented by every successful write.
    #[serde(default)]
    pub version: i64,
}

impl UserStatus {
    /// A fresh record: healthy, never checked in, no schedule.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            last_check_in: None,
            next_due: None,
            alert_level: AlertLevel::None,
            alert_entered_at: None,
            version: 0,
        }
    }

    /// Structural invariant: `alert_entered_at` is present iff the user is
    /// alerted, and `next_due` never precedes the last check-in.
    pub fn invariant_holds(&self) -> bool {
        if self.alert_level.is_alerted() != self.alert_entered_at.is_some() {
            return false;
        }
        match (self.next_due, self.last_check_in) {
            (Some(due), Some(last)) => due >= last,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_record_is_healthy() {
        let status = UserStatus::new("ada");
        assert_eq!(status.alert_level, AlertLevel::None);
        assert!(status.last_check_in.is_none());
        assert!(status.next_due.is_none());
        assert!(status.invariant_holds());
    }

    #[test]
    fn invariant_rejects_orphan_entered_at() {
        let mut status = UserStatus::new("ada");
        status.alert_entered_at = Some(Utc::now());
        assert!(!status.invariant_holds());

        status.alert_level = AlertLevel::Notice;
        assert!(status.invariant_holds());
    }

    #[test]
    fn invariant_rejects_due_before_check_in() {
        let now = Utc::now();
        let mut status = UserStatus::new("ada");
        status.last_check_in = Some(now);
        status.next_due = Some(now - Duration::hours(1));
        assert!(!status.invariant_holds());

        status.next_due = Some(now + Duration::hours(24));
        assert!(status.invariant_holds());
    }
}
