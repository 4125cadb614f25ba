//! # Interpool Core Library
//!
//! Core business logic for Interpool, the interpreter auto-assignment
//! engine. Given a stream of bookings, the engine decides per booking
//! whether to assign an interpreter now, hold the booking in a pool until
//! its decision moment, or escalate it for manual handling.
//!
//! ## Architecture
//!
//! - **Engine**: orchestrates a decision — validate, pool or score,
//!   commit, audit
//! - **Pool**: bookings deferred until their per-mode readiness threshold
//! - **Scoring**: fairness / urgency / least-recently-served weighting with
//!   a deterministic tie-break
//! - **DR history**: consecutive-assignment policy for the DR meeting class
//! - **Batch optimiser**: Balance-mode draining that minimises the
//!   post-assignment workload spread
//! - **Stores**: capability traits with in-memory and SQLite backends
//!
//! ## Key Components
//!
//! - [`Engine`]: the orchestrator (`assign`, `tick`, `drain`)
//! - [`AssignmentPolicy`]: process-wide policy with mode-locked weights
//! - [`MemoryStore`] / [`SqliteStore`]: the two store backends

pub mod audit;
pub mod batch;
pub mod booking;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod fairness;
mod hash;
pub mod history;
pub mod policy;
pub mod pool;
pub mod roster;
pub mod scoring;
pub mod store;

pub use audit::{AssignmentLogEntry, AuditOutcome};
pub use batch::{BatchAssignmentResult, ProvisionalPick};
pub use booking::{Booking, BookingStatus, Interpreter, MeetingType};
pub use config::EngineConfig;
pub use conflict::Conflict;
pub use engine::{reasons, Engine, EngineOptions, Outcome, TickReport};
pub use error::{ConfigError, EngineError, PolicyError, StoreError, ValidationError};
pub use fairness::HoursMap;
pub use history::{DrFilter, DrState};
pub use policy::{
    check_compatibility, AssignMode, AssignmentPolicy, Compatibility, DrPolicy, DrScope,
    ModeThreshold, PolicyBundle, PolicyMetadata, PolicyPatch, ThresholdResolver, Weights,
    POLICY_BUNDLE_VERSION,
};
pub use pool::{PoolEntry, PoolState, PoolStats};
pub use roster::{RosterChange, RosterSnapshot};
pub use scoring::{CandidateBreakdown, CandidateSnapshot, RankOutcome, ScoredCandidate};
pub use store::{
    BookingStore, Clock, CommitOutcome, EngineStore, FixedClock, LogSink, MemoryStore,
    PolicyStore, PoolStore, RosterStore, SqliteStore, SystemClock,
};
