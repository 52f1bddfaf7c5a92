//! SQLite-backed status store and activity log.
//!
//! One connection-owning struct covers both tables because a status write
//! and its audit entries must commit in a single transaction: an escalation
//! is never persisted without its activity entry, nor the other way around.
//!
//! Status rows carry a `version` counter. Writers update conditionally on
//! the version they read (`UPDATE ... WHERE version = ?`); losing the race
//! surfaces as [`StoreError::Conflict`] and the caller re-reads. Activity
//! rows are append-only; a per-user `seq` assigned at append time breaks
//! timestamp ties so every per-user feed is a strict total order.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::{data_dir, migrations};
use crate::activity::{ActivityEntry, ActivityPayload};
use crate::alert::AlertLevel;
use crate::error::StoreError;
use crate::status::UserStatus;

/// An activity waiting to be appended; the log assigns `seq`.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub payload: ActivityPayload,
}

/// Count of users at each alert tier.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct AlertCounts {
    pub none: u64,
    pub notice: u64,
    pub elevated: u64,
    pub severe: u64,
    pub critical: u64,
}

impl AlertCounts {
    pub fn alerted(&self) -> u64 {
        self.notice + self.elevated + self.severe + self.critical
    }
}

// === Row codecs ===

/// Format a timestamp for storage. Fixed precision keeps lexicographic
/// order equal to chronological order for the TEXT comparisons below.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

fn row_to_status(row: &rusqlite::Row) -> rusqlite::Result<UserStatus> {
    let level: u8 = row.get(3)?;
    Ok(UserStatus {
        user_id: row.get(0)?,
        last_check_in: parse_opt_ts(1, row.get(1)?)?,
        next_due: parse_opt_ts(2, row.get(2)?)?,
        alert_level: AlertLevel::from_u8(level),
        alert_entered_at: parse_opt_ts(4, row.get(4)?)?,
        version: row.get(5)?,
    })
}

fn row_to_activity(row: &rusqlite::Row) -> rusqlite::Result<ActivityEntry> {
    let payload_json: String = row.get(4)?;
    let payload: ActivityPayload = serde_json::from_str(&payload_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(ActivityEntry {
        user_id: row.get(0)?,
        seq: row.get(1)?,
        timestamp: parse_ts(3, &row.get::<_, String>(3)?)?,
        description: row.get(2)?,
        payload,
    })
}

const STATUS_COLUMNS: &str =
    "user_id, last_check_in, next_due, alert_level, alert_entered_at, version";
const ACTIVITY_COLUMNS: &str = "user_id, seq, description, timestamp, payload";

/// SQLite database holding user status snapshots and the activity feed.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `<data_dir>/pulsecheck.db`, creating the file
    /// and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::open_at(&dir.join("pulsecheck.db"))
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: PathBuf::from(path),
            source,
        })?;
        // Writers back off instead of failing immediately on a busy database.
        conn.busy_timeout(std::time::Duration::from_millis(250))
            .map_err(StoreError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    #[cfg(test)]
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        migrations::migrate(&self.conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))
    }

    // === User status ===

    /// Fetch one user's status snapshot.
    pub fn status_get(&self, user_id: &str) -> Result<Option<UserStatus>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STATUS_COLUMNS} FROM user_status WHERE user_id = ?1"
        ))?;
        Ok(stmt
            .query_row(params![user_id], row_to_status)
            .optional()?)
    }

    /// Insert a brand-new status row (lazy registration).
    ///
    /// # Errors
    /// Returns `Conflict` if a concurrent writer created the row first.
    pub fn status_insert(&self, status: &UserStatus) -> Result<(), StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO user_status
                 (user_id, last_check_in, next_due, alert_level, alert_entered_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                status.user_id,
                status.last_check_in.map(format_ts),
                status.next_due.map(format_ts),
                status.alert_level.as_u8(),
                status.alert_entered_at.map(format_ts),
                status.version,
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::Conflict {
                user_id: status.user_id.clone(),
            });
        }
        Ok(())
    }

    /// All status rows, ordered by user id.
    pub fn status_all(&self) -> Result<Vec<UserStatus>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STATUS_COLUMNS} FROM user_status ORDER BY user_id"
        ))?;
        let rows = stmt.query_map([], row_to_status)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Users whose due clock has passed and who can still auto-escalate.
    /// Ordered most-overdue first.
    pub fn status_due(&self, now: DateTime<Utc>) -> Result<Vec<UserStatus>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STATUS_COLUMNS} FROM user_status
             WHERE next_due IS NOT NULL AND next_due <= ?1 AND alert_level < ?2
             ORDER BY next_due ASC"
        ))?;
        let rows = stmt.query_map(
            params![format_ts(now), AlertLevel::Critical.as_u8()],
            row_to_status,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Count users at each alert tier.
    pub fn alert_counts(&self) -> Result<AlertCounts, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT alert_level, COUNT(*) FROM user_status GROUP BY alert_level")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, u8>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut counts = AlertCounts::default();
        for row in rows {
            let (level, count) = row?;
            match AlertLevel::from_u8(level) {
                AlertLevel::None => counts.none += count,
                AlertLevel::Notice => counts.notice += count,
                AlertLevel::Elevated => counts.elevated += count,
                AlertLevel::Severe => counts.severe += count,
                AlertLevel::Critical => counts.critical += count,
            }
        }
        Ok(counts)
    }

    // === Atomic status + activity commit ===

    /// Persist a policy result: conditionally update the status row keyed on
    /// the version it was read at, and append the accompanying activity
    /// entries, all in one transaction.
    ///
    /// `status` carries the version of the snapshot the caller read; on
    /// success the stored (and returned) row has `version + 1`.
    ///
    /// # Errors
    /// Returns `Conflict` if a concurrent writer advanced the row first; the
    /// transaction rolls back and nothing is appended.
    pub fn apply(
        &mut self,
        status: &UserStatus,
        entries: &[NewActivity],
    ) -> Result<(UserStatus, Vec<ActivityEntry>), StoreError> {
        let tx = self.conn.transaction()?;

        let updated = tx.execute(
            "UPDATE user_status
             SET last_check_in = ?2, next_due = ?3, alert_level = ?4,
                 alert_entered_at = ?5, version = ?6
             WHERE user_id = ?1 AND version = ?7",
            params![
                status.user_id,
                status.last_check_in.map(format_ts),
                status.next_due.map(format_ts),
                status.alert_level.as_u8(),
                status.alert_entered_at.map(format_ts),
                status.version + 1,
                status.version,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::Conflict {
                user_id: status.user_id.clone(),
            });
        }

        let mut appended = Vec::with_capacity(entries.len());
        for entry in entries {
            appended.push(append_in_tx(&tx, &status.user_id, entry)?);
        }
        tx.commit()?;

        let mut stored = status.clone();
        stored.version += 1;
        Ok((stored, appended))
    }

    // === Activity log ===

    /// Append one entry outside the status path (conversation activities).
    pub fn activity_append(
        &mut self,
        user_id: &str,
        entry: &NewActivity,
    ) -> Result<ActivityEntry, StoreError> {
        let tx = self.conn.transaction()?;
        let appended = append_in_tx(&tx, user_id, entry)?;
        tx.commit()?;
        Ok(appended)
    }

    /// Most recent entries for one user, newest first. Snapshot query;
    /// `limit` is respected exactly.
    pub fn activities_recent(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities
             WHERE user_id = ?1
             ORDER BY timestamp DESC, seq DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![user_id, limit as i64], row_to_activity)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Most recent entries across all users, newest first. Row id is the
    /// stable tie-break for colliding timestamps across users.
    pub fn activities_global(&self, limit: usize) -> Result<Vec<ActivityEntry>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_activity)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Append one entry inside an open transaction, assigning the next per-user
/// sequence number. SQLite's single-writer transactions make the MAX+1 read
/// safe against concurrent appends for the same user.
fn append_in_tx(
    conn: &Connection,
    user_id: &str,
    entry: &NewActivity,
) -> Result<ActivityEntry, StoreError> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM activities WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    let payload_json = serde_json::to_string(&entry.payload)
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
    conn.execute(
        "INSERT INTO activities (user_id, seq, kind, description, timestamp, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            seq,
            entry.payload.kind().to_string(),
            entry.description,
            format_ts(entry.timestamp),
            payload_json,
        ],
    )?;
    Ok(ActivityEntry {
        user_id: user_id.to_string(),
        seq,
        timestamp: entry.timestamp,
        description: entry.description.clone(),
        payload: entry.payload.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityPayload;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn check_in(at: DateTime<Utc>) -> NewActivity {
        NewActivity {
            timestamp: at,
            description: "Checked in".into(),
            payload: ActivityPayload::CheckIn {},
        }
    }

    #[test]
    fn status_roundtrip() {
        let db = Database::open_memory().unwrap();
        let mut status = UserStatus::new("ada");
        status.last_check_in = Some(t0());
        status.next_due = Some(t0() + Duration::hours(24));
        db.status_insert(&status).unwrap();

        let loaded = db.status_get("ada").unwrap().unwrap();
        assert_eq!(loaded, status);
        assert!(db.status_get("ghost").unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_is_a_conflict() {
        let db = Database::open_memory().unwrap();
        db.status_insert(&UserStatus::new("ada")).unwrap();
        let err = db.status_insert(&UserStatus::new("ada")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn apply_bumps_version_and_appends() {
        let mut db = Database::open_memory().unwrap();
        db.status_insert(&UserStatus::new("ada")).unwrap();

        let mut status = db.status_get("ada").unwrap().unwrap();
        status.last_check_in = Some(t0());
        status.next_due = Some(t0() + Duration::hours(24));
        let (stored, appended) = db.apply(&status, &[check_in(t0())]).unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].seq, 1);

        let loaded = db.status_get("ada").unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.last_check_in, Some(t0()));
    }

    #[test]
    fn apply_with_stale_version_conflicts_and_appends_nothing() {
        let mut db = Database::open_memory().unwrap();
        db.status_insert(&UserStatus::new("ada")).unwrap();

        let status = db.status_get("ada").unwrap().unwrap();
        db.apply(&status, &[]).unwrap();

        // Same snapshot again: the version has moved on.
        let err = db.apply(&status, &[check_in(t0())]).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(db.activities_recent("ada", 10).unwrap().is_empty());
    }

    #[test]
    fn feed_orders_by_timestamp_then_seq() {
        let mut db = Database::open_memory().unwrap();
        // Two entries share a timestamp; seq breaks the tie.
        db.activity_append("ada", &check_in(t0())).unwrap();
        db.activity_append("ada", &check_in(t0())).unwrap();
        db.activity_append("ada", &check_in(t0() + Duration::hours(1)))
            .unwrap();

        let feed = db.activities_recent("ada", 10).unwrap();
        assert_eq!(feed.len(), 3);
        assert_eq!(feed[0].timestamp, t0() + Duration::hours(1));
        assert_eq!((feed[1].seq, feed[2].seq), (2, 1));

        let limited = db.activities_recent("ada", 2).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn seq_is_per_user() {
        let mut db = Database::open_memory().unwrap();
        db.activity_append("ada", &check_in(t0())).unwrap();
        let bob = db.activity_append("bob", &check_in(t0())).unwrap();
        assert_eq!(bob.seq, 1);
    }

    #[test]
    fn global_feed_spans_users() {
        let mut db = Database::open_memory().unwrap();
        db.activity_append("ada", &check_in(t0())).unwrap();
        db.activity_append("bob", &check_in(t0() + Duration::minutes(5)))
            .unwrap();

        let feed = db.activities_global(10).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].user_id, "bob");
        assert_eq!(feed[1].user_id, "ada");
    }

    #[test]
    fn due_query_skips_critical_and_unscheduled() {
        let db = Database::open_memory().unwrap();

        let mut due = UserStatus::new("due");
        due.next_due = Some(t0());
        db.status_insert(&due).unwrap();

        let mut critical = UserStatus::new("critical");
        critical.alert_level = AlertLevel::Critical;
        critical.alert_entered_at = Some(t0());
        db.status_insert(&critical).unwrap();

        db.status_insert(&UserStatus::new("unscheduled")).unwrap();

        let found = db.status_due(t0() + Duration::hours(1)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, "due");
    }

    #[test]
    fn alert_counts_groups_by_tier() {
        let db = Database::open_memory().unwrap();
        for (user, level) in [
            ("a", AlertLevel::None),
            ("b", AlertLevel::Notice),
            ("c", AlertLevel::Notice),
            ("d", AlertLevel::Critical),
        ] {
            let mut status = UserStatus::new(user);
            status.alert_level = level;
            if level.is_alerted() {
                status.alert_entered_at = Some(t0());
            }
            db.status_insert(&status).unwrap();
        }
        let counts = db.alert_counts().unwrap();
        assert_eq!(counts.none, 1);
        assert_eq!(counts.notice, 2);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.alerted(), 3);
    }
}
