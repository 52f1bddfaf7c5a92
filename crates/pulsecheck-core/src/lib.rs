//! # Pulsecheck Core Library
//!
//! Core business logic for Pulsecheck, a wellness check-in application.
//! The library tracks, per user, when the last check-in happened, when the
//! next one is due, and escalates an alert level as time passes without
//! contact. It implements a CLI-first philosophy: all operations are
//! available via a standalone CLI binary, with any richer front end being a
//! thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Escalation Policy**: a pure, wall-clock-based state machine - the
//!   caller supplies `now`, the policy returns the next status and the
//!   transition, if any
//! - **Engine**: the only writer of user status; check-ins and the sweep
//!   both funnel through the policy and commit through per-user versioned
//!   writes, with the activity log appended in the same transaction
//! - **Storage**: SQLite-backed status snapshots and append-only activity
//!   feed, TOML-based configuration
//! - **Sweep Loop**: recurring evaluation of all due users with graceful
//!   shutdown
//!
//! ## Key Components
//!
//! - [`CheckinEngine`]: check-in handling, feeds, sweeps, subscriptions
//! - [`policy::evaluate`] / [`policy::reset`]: the escalation state machine
//! - [`Database`]: status and activity persistence
//! - [`SweepLoop`]: the scheduler loop
//! - [`Config`]: escalation timing and engine behavior

pub mod activity;
pub mod alert;
pub mod engine;
pub mod error;
pub mod policy;
pub mod status;
pub mod store;
pub mod sweep;

pub use activity::{ActivityEntry, ActivityKind, ActivityPayload};
pub use alert::AlertLevel;
pub use engine::{CheckinEngine, SweepOutcome};
pub use error::{ConfigError, CoreError, StoreError};
pub use policy::{Evaluation, PolicyConfig, Transition};
pub use status::UserStatus;
pub use store::{AlertCounts, Config, Database};
pub use sweep::{ShutdownHandle, SweepLoop};
