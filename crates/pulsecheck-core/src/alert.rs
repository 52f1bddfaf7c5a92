//! Alert severity tiers.
//!
//! A user's alert level reflects how overdue their check-in is. Levels are
//! ordered: `None < Notice < Elevated < Severe < Critical`. Automatic
//! escalation walks one tier at a time; only a check-in clears back to
//! `None`.

use serde::{Deserialize, Serialize};

/// Ordered alert severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Resting/healthy state - check-in is not overdue
    None,
    /// First missed check-in
    Notice,
    /// One escalation step past Notice
    Elevated,
    /// One escalation step past Elevated
    Severe,
    /// Terminal tier - automatic escalation stops here, only a check-in clears it
    Critical,
}

impl AlertLevel {
    /// Numeric tier code (0-4), used for persistence and ordering.
    pub fn as_u8(self) -> u8 {
        match self {
            AlertLevel::None => 0,
            AlertLevel::Notice => 1,
            AlertLevel::Elevated => 2,
            AlertLevel::Severe => 3,
            AlertLevel::Critical => 4,
        }
    }

    /// Convert from a numeric tier code. Values above 4 clamp to Critical.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => AlertLevel::None,
            1 => AlertLevel::Notice,
            2 => AlertLevel::Elevated,
            3 => AlertLevel::Severe,
            _ => AlertLevel::Critical,
        }
    }

    /// The next tier up. Critical stays Critical.
    pub fn next(self) -> Self {
        match self {
            AlertLevel::None => AlertLevel::Notice,
            AlertLevel::Notice => AlertLevel::Elevated,
            AlertLevel::Elevated => AlertLevel::Severe,
            AlertLevel::Severe | AlertLevel::Critical => AlertLevel::Critical,
        }
    }

    /// Whether this tier is still eligible for automatic escalation.
    pub fn can_escalate(self) -> bool {
        !matches!(self, AlertLevel::Critical)
    }

    /// Whether the user is currently alerted at all.
    pub fn is_alerted(self) -> bool {
        self != AlertLevel::None
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::None => write!(f, "none"),
            AlertLevel::Notice => write!(f, "notice"),
            AlertLevel::Elevated => write!(f, "elevated"),
            AlertLevel::Severe => write!(f, "severe"),
            AlertLevel::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_code_roundtrip() {
        for code in 0..=4u8 {
            assert_eq!(AlertLevel::from_u8(code).as_u8(), code);
        }
        assert_eq!(AlertLevel::from_u8(9), AlertLevel::Critical);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(AlertLevel::None < AlertLevel::Notice);
        assert!(AlertLevel::Notice < AlertLevel::Elevated);
        assert!(AlertLevel::Elevated < AlertLevel::Severe);
        assert!(AlertLevel::Severe < AlertLevel::Critical);
    }

    #[test]
    fn next_walks_one_tier() {
        assert_eq!(AlertLevel::None.next(), AlertLevel::Notice);
        assert_eq!(AlertLevel::Notice.next(), AlertLevel::Elevated);
        assert_eq!(AlertLevel::Elevated.next(), AlertLevel::Severe);
        assert_eq!(AlertLevel::Severe.next(), AlertLevel::Critical);
        assert_eq!(AlertLevel::Critical.next(), AlertLevel::Critical);
    }

    #[test]
    fn critical_cannot_escalate() {
        assert!(AlertLevel::Severe.can_escalate());
        assert!(!AlertLevel::Critical.can_escalate());
    }
}
