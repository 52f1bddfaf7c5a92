//! Escalation policy.
//!
//! The policy is a pure function over wall-clock time. It never touches
//! storage or timers - the caller supplies `now` and persists the result.
//! Both the sweep loop and the check-in handler funnel through this module,
//! so there is one code path for every status transition and the two can
//! never disagree on what "due" means.
//!
//! ## Escalation walk
//!
//! ```text
//! None -(check-in overdue)-> Notice -(step elapsed)-> Elevated -> Severe -> Critical
//! any tier -(check-in)-> None
//! ```
//!
//! Escalation moves exactly one tier per `evaluate` call, however much time
//! has elapsed; repeated sweeps walk through each tier. Critical is terminal
//! for automatic escalation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::AlertLevel;
use crate::status::UserStatus;

/// Escalation timing, supplied by configuration.
///
/// `check_in_frequency_min` is how long a user may go without a check-in
/// before the first alert. `escalation_step_min` is how long each alert tier
/// holds before advancing to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_check_in_frequency_min")]
    pub check_in_frequency_min: i64,
    #[serde(default = "default_escalation_step_min")]
    pub escalation_step_min: i64,
}

fn default_check_in_frequency_min() -> i64 {
    24 * 60
}

fn default_escalation_step_min() -> i64 {
    6 * 60
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            check_in_frequency_min: default_check_in_frequency_min(),
            escalation_step_min: default_escalation_step_min(),
        }
    }
}

impl PolicyConfig {
    pub fn check_in_frequency(&self) -> Duration {
        Duration::minutes(self.check_in_frequency_min)
    }

    pub fn escalation_step(&self) -> Duration {
        Duration::minutes(self.escalation_step_min)
    }
}

/// One alert tier change, escalation or recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: AlertLevel,
    pub to: AlertLevel,
    pub at: DateTime<Utc>,
}

/// Result of a policy step: the (possibly unchanged) status, and the
/// transition if one occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub status: UserStatus,
    pub transition: Option<Transition>,
}

impl Evaluation {
    fn unchanged(status: UserStatus) -> Self {
        Self {
            status,
            transition: None,
        }
    }
}

/// Advance the alert clock for one user.
///
/// Idempotent: once a transition has been applied, re-running with the same
/// `now` is a no-op, because every transition re-anchors the due clock to
/// the moment of the state change. A user with no `next_due` has no active
/// schedule and is never escalated - the schedule is registered by the first
/// check-in.
pub fn evaluate(now: DateTime<Utc>, status: &UserStatus, config: &PolicyConfig) -> Evaluation {
    match status.alert_level {
        AlertLevel::None => {
            let Some(due) = status.next_due else {
                return Evaluation::unchanged(status.clone());
            };
            if now < due {
                return Evaluation::unchanged(status.clone());
            }
            apply_escalation(now, status, config, AlertLevel::Notice)
        }
        AlertLevel::Notice | AlertLevel::Elevated | AlertLevel::Severe => {
            let Some(entered) = status.alert_entered_at else {
                // Should not happen for an alerted user; leave untouched
                // rather than guess at a missing anchor.
                return Evaluation::unchanged(status.clone());
            };
            if now - entered < config.escalation_step() {
                return Evaluation::unchanged(status.clone());
            }
            apply_escalation(now, status, config, status.alert_level.next())
        }
        AlertLevel::Critical => Evaluation::unchanged(status.clone()),
    }
}

fn apply_escalation(
    now: DateTime<Utc>,
    status: &UserStatus,
    config: &PolicyConfig,
    to: AlertLevel,
) -> Evaluation {
    let from = status.alert_level;
    let mut next = status.clone();
    next.alert_level = to;
    next.alert_entered_at = Some(now);
    // Anchor the due clock to this state change so a runaway sweep cannot
    // re-fire the same transition. Critical has no further auto-transition,
    // so nothing is due until a manual check-in.
    next.next_due = if to.can_escalate() {
        Some(now + config.escalation_step())
    } else {
        None
    };
    Evaluation {
        status: next,
        transition: Some(Transition { from, to, at: now }),
    }
}

/// The check-in branch of the policy: reset to baseline.
///
/// Always clears the alert tier and re-arms the schedule at
/// `last_check_in + check_in_frequency`. A stale writer racing a newer
/// check-in never regresses the clock: the later of `now` and the recorded
/// check-in wins. Returns a recovery transition iff the prior tier was
/// alerted, so the audit trail shows the recovery rather than silence.
pub fn reset(now: DateTime<Utc>, status: &UserStatus, config: &PolicyConfig) -> Evaluation {
    let effective = match status.last_check_in {
        Some(prev) if prev > now => prev,
        _ => now,
    };
    let from = status.alert_level;
    let mut next = status.clone();
    next.last_check_in = Some(effective);
    next.next_due = Some(effective + config.check_in_frequency());
    next.alert_level = AlertLevel::None;
    next.alert_entered_at = None;
    let transition = from.is_alerted().then_some(Transition {
        from,
        to: AlertLevel::None,
        at: now,
    });
    Evaluation {
        status: next,
        transition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn config() -> PolicyConfig {
        PolicyConfig {
            check_in_frequency_min: 24 * 60,
            escalation_step_min: 6 * 60,
        }
    }

    fn checked_in_at(at: DateTime<Utc>) -> UserStatus {
        reset(at, &UserStatus::new("ada"), &config()).status
    }

    #[test]
    fn unregistered_user_is_never_due() {
        let status = UserStatus::new("ada");
        let eval = evaluate(t0() + Duration::days(30), &status, &config());
        assert!(eval.transition.is_none());
        assert_eq!(eval.status, status);
    }

    #[test]
    fn healthy_user_before_due_is_untouched() {
        let status = checked_in_at(t0());
        let eval = evaluate(t0() + Duration::hours(23), &status, &config());
        assert!(eval.transition.is_none());
        assert_eq!(eval.status.alert_level, AlertLevel::None);
    }

    #[test]
    fn overdue_user_raises_notice() {
        let status = checked_in_at(t0());
        let now = t0() + Duration::hours(30);
        let eval = evaluate(now, &status, &config());
        let transition = eval.transition.expect("expected a transition");
        assert_eq!(transition.from, AlertLevel::None);
        assert_eq!(transition.to, AlertLevel::Notice);
        assert_eq!(eval.status.alert_entered_at, Some(now));
        assert_eq!(eval.status.next_due, Some(now + Duration::hours(6)));
        assert!(eval.status.invariant_holds());
    }

    #[test]
    fn escalation_walks_the_documented_scenario() {
        // frequency 24h, step 6h, check-in at t0:
        // t0+30h -> notice, t0+36h -> elevated, t0+54h -> critical.
        let cfg = config();
        let mut status = checked_in_at(t0());

        let eval = evaluate(t0() + Duration::hours(30), &status, &cfg);
        assert_eq!(eval.status.alert_level, AlertLevel::Notice);
        status = eval.status;

        let eval = evaluate(t0() + Duration::hours(36), &status, &cfg);
        assert_eq!(eval.status.alert_level, AlertLevel::Elevated);
        status = eval.status;

        let eval = evaluate(t0() + Duration::hours(42), &status, &cfg);
        assert_eq!(eval.status.alert_level, AlertLevel::Severe);
        status = eval.status;

        let eval = evaluate(t0() + Duration::hours(54), &status, &cfg);
        assert_eq!(eval.status.alert_level, AlertLevel::Critical);
        assert!(eval.status.next_due.is_none());
        status = eval.status;

        // Critical is terminal for automatic escalation.
        let eval = evaluate(t0() + Duration::hours(500), &status, &cfg);
        assert!(eval.transition.is_none());
        assert_eq!(eval.status.alert_level, AlertLevel::Critical);
    }

    #[test]
    fn evaluate_is_idempotent_at_fixed_now() {
        let now = t0() + Duration::hours(30);
        let status = checked_in_at(t0());
        let first = evaluate(now, &status, &config());
        assert!(first.transition.is_some());
        let second = evaluate(now, &first.status, &config());
        assert!(second.transition.is_none());
        assert_eq!(second.status, first.status);
    }

    #[test]
    fn reset_clears_any_tier() {
        let cfg = config();
        let mut status = checked_in_at(t0());
        for hours in [30, 36, 42, 54] {
            status = evaluate(t0() + Duration::hours(hours), &status, &cfg).status;
        }
        assert_eq!(status.alert_level, AlertLevel::Critical);

        let now = t0() + Duration::hours(60);
        let eval = reset(now, &status, &cfg);
        assert_eq!(eval.status.alert_level, AlertLevel::None);
        assert_eq!(eval.status.last_check_in, Some(now));
        assert_eq!(eval.status.next_due, Some(now + Duration::hours(24)));
        let transition = eval.transition.expect("recovery should be recorded");
        assert_eq!(transition.from, AlertLevel::Critical);
        assert_eq!(transition.to, AlertLevel::None);
        assert!(eval.status.invariant_holds());
    }

    #[test]
    fn reset_of_healthy_user_emits_no_transition() {
        let status = checked_in_at(t0());
        let eval = reset(t0() + Duration::minutes(1), &status, &config());
        assert!(eval.transition.is_none());
        assert_eq!(eval.status.alert_level, AlertLevel::None);
    }

    #[test]
    fn stale_reset_never_regresses_the_clock() {
        let later = t0() + Duration::milliseconds(1);
        let status = checked_in_at(later);
        let eval = reset(t0(), &status, &config());
        assert_eq!(eval.status.last_check_in, Some(later));
        assert_eq!(eval.status.next_due, Some(later + Duration::hours(24)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        // Build a structurally valid status at an arbitrary tier.
        fn status_at(level_code: u8, entered_offset_min: i64) -> UserStatus {
            let level = AlertLevel::from_u8(level_code);
            let mut status = UserStatus::new("ada");
            status.last_check_in = Some(t0());
            status.alert_level = level;
            if level.is_alerted() {
                let entered = t0() + Duration::minutes(entered_offset_min);
                status.alert_entered_at = Some(entered);
                status.next_due = level
                    .can_escalate()
                    .then(|| entered + config().escalation_step());
            } else {
                status.next_due = Some(t0() + config().check_in_frequency());
            }
            status
        }

        proptest! {
            #[test]
            fn escalates_at_most_one_tier(
                level_code in 0u8..=4,
                entered_offset_min in 0i64..10_000,
                elapsed_min in 0i64..1_000_000,
            ) {
                let status = status_at(level_code, entered_offset_min);
                let now = t0() + Duration::minutes(entered_offset_min + elapsed_min);
                let eval = evaluate(now, &status, &config());
                let from = status.alert_level.as_u8();
                let to = eval.status.alert_level.as_u8();
                prop_assert!(to == from || to == from + 1);
                if let Some(transition) = eval.transition {
                    prop_assert_eq!(transition.from.as_u8(), from);
                    prop_assert_eq!(transition.to.as_u8(), to);
                }
            }

            #[test]
            fn evaluate_preserves_invariant_and_is_idempotent(
                level_code in 0u8..=4,
                entered_offset_min in 0i64..10_000,
                elapsed_min in 0i64..1_000_000,
            ) {
                let status = status_at(level_code, entered_offset_min);
                let now = t0() + Duration::minutes(entered_offset_min + elapsed_min);
                let first = evaluate(now, &status, &config());
                prop_assert!(first.status.invariant_holds());
                let second = evaluate(now, &first.status, &config());
                prop_assert!(second.transition.is_none());
                prop_assert_eq!(second.status, first.status);
            }

            #[test]
            fn reset_always_returns_to_baseline(
                level_code in 0u8..=4,
                entered_offset_min in 0i64..10_000,
                reset_offset_min in 0i64..1_000_000,
            ) {
                let status = status_at(level_code, entered_offset_min);
                let now = t0() + Duration::minutes(reset_offset_min);
                let eval = reset(now, &status, &config());
                prop_assert_eq!(eval.status.alert_level, AlertLevel::None);
                prop_assert!(eval.status.alert_entered_at.is_none());
                prop_assert!(eval.status.invariant_holds());
                prop_assert_eq!(
                    eval.transition.is_some(),
                    status.alert_level.is_alerted()
                );
            }
        }
    }
}
