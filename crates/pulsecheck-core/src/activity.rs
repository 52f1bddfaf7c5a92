//! Append-only activity feed entries.
//!
//! Every check-in, alert transition, and conversation turn produces an
//! `ActivityEntry`. Entries are immutable once written; the feed is the
//! durable audit trail, independent of the mutable status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::AlertLevel;

/// Feed entry category, derived from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    CheckIn,
    Alert,
    Conversation,
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityKind::CheckIn => write!(f, "check-in"),
            ActivityKind::Alert => write!(f, "alert"),
            ActivityKind::Conversation => write!(f, "conversation"),
        }
    }
}

/// Closed, per-kind payload. Keeps the log machine-verifiable instead of
/// carrying opaque JSON metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ActivityPayload {
    /// A confirmed signal that the user is well.
    CheckIn {},
    /// An alert tier transition, escalation or recovery.
    Alert { from: AlertLevel, to: AlertLevel },
    /// A conversation turn, appended by external conversation logic.
    Conversation {
        conversation_id: String,
        excerpt: String,
    },
}

impl ActivityPayload {
    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityPayload::CheckIn {} => ActivityKind::CheckIn,
            ActivityPayload::Alert { .. } => ActivityKind::Alert,
            ActivityPayload::Conversation { .. } => ActivityKind::Conversation,
        }
    }
}

/// One immutable feed entry.
///
/// `seq` is a per-user monotonic sequence number assigned by the log at
/// append time. Timestamps may collide within a user; `(timestamp, seq)`
/// makes each per-user feed a strict total order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub user_id: String,
    pub seq: i64,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub payload: ActivityPayload,
}

impl ActivityEntry {
    pub fn kind(&self) -> ActivityKind {
        self.payload.kind()
    }
}

/// Standard description lines for engine-written entries.
pub(crate) fn check_in_description() -> String {
    "Checked in".to_string()
}

pub(crate) fn alert_description(from: AlertLevel, to: AlertLevel) -> String {
    if to == AlertLevel::None {
        format!("Recovered from {from} alert")
    } else if from == AlertLevel::None {
        format!("Missed check-in, alert raised to {to}")
    } else {
        format!("Alert escalated from {from} to {to}")
    }
}
