//! Check-in engine.
//!
//! The engine is the only writer of user status. The check-in handler and
//! the sweep both funnel through the pure policy in [`crate::policy`] and
//! persist results through the versioned conditional write in
//! [`crate::store::Database`], so exactly one writer produces any given
//! transition; the loser of a race observes the updated row and re-reads.
//!
//! Writers append to the activity log in the same transaction as the status
//! write, then signal the broadcast topic. Subscribers receive deltas; the
//! log remains the source of truth, so a lagging subscriber loses nothing
//! that cannot be re-read.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::activity::{self, ActivityEntry, ActivityPayload};
use crate::error::StoreError;
use crate::policy::{self, Evaluation};
use crate::status::UserStatus;
use crate::store::database::{AlertCounts, NewActivity};
use crate::store::{Config, Database};

/// Bounded retries when a concurrent writer wins the per-user race.
const CONFLICT_RETRIES: u32 = 3;
/// Bounded exponential backoff for transient storage failures.
const BACKOFF_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 50;

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepOutcome {
    /// Users whose due clock had passed.
    pub scanned: usize,
    /// Transitions applied and logged.
    pub transitions: usize,
    /// Users skipped after storage failures; retried next tick.
    pub failures: usize,
}

/// The check-in scheduling and alert-escalation engine.
///
/// Cheap to share behind an `Arc`; all methods take `&self`. The embedded
/// mutex only guards individual storage calls - the read-evaluate-write
/// cycle itself is protected by the per-user version check, not by holding
/// a lock across it.
pub struct CheckinEngine {
    db: Mutex<Database>,
    config: Config,
    events: broadcast::Sender<ActivityEntry>,
}

impl CheckinEngine {
    pub fn new(db: Database, config: Config) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            db: Mutex::new(db),
            config,
            events,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to activity entries as they are appended. Lossy for slow
    /// subscribers; the log itself is the durable record.
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEntry> {
        self.events.subscribe()
    }

    // === Check-in handler ===

    /// Record a confirmed check-in: reset the alert tier to baseline and
    /// re-arm the schedule.
    ///
    /// Appends one check-in entry, plus one recovery entry when the prior
    /// tier was alerted. Unknown users are registered lazily unless
    /// `require_registration` is configured.
    ///
    /// # Errors
    /// `NotFound` for unknown users when pre-registration is required;
    /// `Conflict` if the per-user race was lost on every retry;
    /// `Unavailable` after transient storage failures exhausted backoff.
    pub fn record_check_in(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserStatus, StoreError> {
        let mut last_err = None;
        for _ in 0..CONFLICT_RETRIES {
            let status = match self.load_or_register(user_id)? {
                Some(status) => status,
                None => continue, // lost the creation race; re-read
            };

            let eval = policy::reset(now, &status, &self.config.policy_for(user_id));
            let mut entries = vec![NewActivity {
                timestamp: now,
                description: activity::check_in_description(),
                payload: ActivityPayload::CheckIn {},
            }];
            if let Some(transition) = eval.transition {
                entries.push(NewActivity {
                    timestamp: now,
                    description: activity::alert_description(transition.from, transition.to),
                    payload: ActivityPayload::Alert {
                        from: transition.from,
                        to: transition.to,
                    },
                });
            }

            match self.commit(&eval, &entries) {
                Ok(stored) => {
                    tracing::info!(user_id, at = %now, "check-in recorded");
                    return Ok(stored);
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(user_id, "check-in lost a write race, retrying");
                    last_err = Some(StoreError::Conflict {
                        user_id: user_id.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(StoreError::Conflict {
            user_id: user_id.to_string(),
        }))
    }

    /// Append a conversation activity from the external conversation layer.
    ///
    /// This does not touch the escalation path: a conversation is not a
    /// wellbeing confirmation unless `conversation_implies_check_in` is
    /// configured, in which case the reset runs first.
    pub fn record_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<String>,
        excerpt: &str,
        now: DateTime<Utc>,
    ) -> Result<ActivityEntry, StoreError> {
        if self.config.engine.conversation_implies_check_in {
            self.record_check_in(user_id, now)?;
        }

        let conversation_id =
            conversation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let entry = NewActivity {
            timestamp: now,
            description: excerpt.to_string(),
            payload: ActivityPayload::Conversation {
                conversation_id,
                excerpt: excerpt.to_string(),
            },
        };
        let appended = with_backoff(|| {
            let mut db = self.lock_db();
            db.activity_append(user_id, &entry)
        })?;
        self.publish(&appended);
        Ok(appended)
    }

    // === Observer queries ===

    /// Status snapshot, or `None` for a user the engine has never seen.
    pub fn get_status(&self, user_id: &str) -> Result<Option<UserStatus>, StoreError> {
        self.lock_db().status_get(user_id)
    }

    /// All known status snapshots.
    pub fn all_statuses(&self) -> Result<Vec<UserStatus>, StoreError> {
        self.lock_db().status_all()
    }

    /// Per-user feed, most recent first.
    pub fn recent_activities(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        self.lock_db().activities_recent(user_id, limit)
    }

    /// Cross-user feed, most recent first.
    pub fn global_activities(&self, limit: usize) -> Result<Vec<ActivityEntry>, StoreError> {
        self.lock_db().activities_global(limit)
    }

    /// Count of users at each alert tier.
    pub fn alert_summary(&self) -> Result<AlertCounts, StoreError> {
        self.lock_db().alert_counts()
    }

    // === Sweep ===

    /// Evaluate every due user once.
    ///
    /// Per-user failures are isolated: a failing user is logged, counted,
    /// and picked up again next tick; the rest of the sweep continues.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepOutcome, StoreError> {
        let due = with_backoff(|| self.lock_db().status_due(now))?;

        let mut outcome = SweepOutcome {
            scanned: due.len(),
            ..SweepOutcome::default()
        };
        for status in due {
            match self.escalate_user(&status.user_id, now) {
                Ok(true) => outcome.transitions += 1,
                Ok(false) => {}
                Err(e) => {
                    outcome.failures += 1;
                    tracing::warn!(
                        user_id = %status.user_id,
                        error = %e,
                        "sweep: user skipped, will retry next tick"
                    );
                }
            }
        }
        Ok(outcome)
    }

    /// Run the policy for one user and persist the result if a transition
    /// occurred. Returns whether a transition was applied.
    fn escalate_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        for _ in 0..CONFLICT_RETRIES {
            // Re-read inside the retry loop: a check-in may have landed
            // since the due scan, and its reset must win.
            let Some(status) = with_backoff(|| self.lock_db().status_get(user_id))? else {
                return Ok(false);
            };

            let eval = policy::evaluate(now, &status, &self.config.policy_for(user_id));
            let Some(transition) = eval.transition else {
                return Ok(false);
            };

            let entries = [NewActivity {
                timestamp: now,
                description: activity::alert_description(transition.from, transition.to),
                payload: ActivityPayload::Alert {
                    from: transition.from,
                    to: transition.to,
                },
            }];
            match self.commit(&eval, &entries) {
                Ok(_) => {
                    tracing::info!(
                        user_id,
                        from = %transition.from,
                        to = %transition.to,
                        "alert level changed"
                    );
                    return Ok(true);
                }
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        // Every attempt lost the race; the winners' writes are the truth.
        Ok(false)
    }

    // === Internal ===

    fn lock_db(&self) -> std::sync::MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read the status record, registering it lazily when allowed. Returns
    /// `None` when the creation race was lost and the caller should re-read.
    fn load_or_register(&self, user_id: &str) -> Result<Option<UserStatus>, StoreError> {
        if let Some(status) = with_backoff(|| self.lock_db().status_get(user_id))? {
            return Ok(Some(status));
        }
        if self.config.engine.require_registration {
            return Err(StoreError::NotFound {
                user_id: user_id.to_string(),
            });
        }
        let fresh = UserStatus::new(user_id);
        match with_backoff(|| self.lock_db().status_insert(&fresh)) {
            Ok(()) => Ok(Some(fresh)),
            Err(StoreError::Conflict { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist an evaluation and its audit entries atomically, then publish.
    fn commit(
        &self,
        eval: &Evaluation,
        entries: &[NewActivity],
    ) -> Result<UserStatus, StoreError> {
        let (stored, appended) = with_backoff(|| {
            let mut db = self.lock_db();
            db.apply(&eval.status, entries)
        })?;
        debug_assert!(stored.invariant_holds());
        for entry in &appended {
            self.publish(entry);
        }
        Ok(stored)
    }

    fn publish(&self, entry: &ActivityEntry) {
        // No receivers is fine; the log is the durable record.
        let _ = self.events.send(entry.clone());
    }
}

/// Retry a storage call with bounded exponential backoff on transient
/// failures. Non-transient errors surface immediately.
fn with_backoff<T>(
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut delay = std::time::Duration::from_millis(BACKOFF_BASE_MS);
    for attempt in 1..=BACKOFF_ATTEMPTS {
        match op() {
            Err(e) if e.is_transient() && attempt < BACKOFF_ATTEMPTS => {
                tracing::debug!(error = %e, attempt, "transient storage failure, backing off");
                std::thread::sleep(delay);
                delay *= 2;
            }
            other => return other,
        }
    }
    unreachable!("backoff loop always returns on the final attempt")
}
