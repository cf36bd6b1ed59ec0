//! # relabel-engine: batch-logged rename engine
//!
//! Renames a value in one or many rows of a target table while recording
//! every intended and applied change in an audit log (possibly in another
//! database), so any batch can later be reversed.
//!
//! The pieces, leaves first: [`security`] sanitizes identifiers, [`ledger`]
//! keeps one row per batch, [`detail`] keeps one row per affected record,
//! [`executor`] runs select-then-update on the target, [`orchestrator`]
//! sequences them into single and bulk workflows, and [`rollback`] reverses
//! a recorded batch. [`session`] wires them to live stores.

pub mod backends;
pub mod config;
pub mod detail;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod orchestrator;
pub mod rollback;
pub mod security;
pub mod session;

pub use backends::{AnyBackend, DatabaseBackendType, DatabasePool, DatabasePoolConfig, SqlDialect};
pub use config::{EnvironmentConfig, LogConfig, StoreConfig, TargetConfig};
pub use detail::{DetailRecord, DetailRecorder, DetailRow};
pub use error::{ConfigError, EngineError, EngineResult};
pub use executor::{AffectedRow, MatchPredicate, MutationExecutor, MutationOutcome, SnapshotSink};
pub use ledger::{Batch, BatchLedger, BatchMode, BatchStatus};
pub use orchestrator::{
    prepare_rows, BatchOrchestrator, BatchOutcome, BatchProgress, BulkRow, MutationRequest,
    RowWarning, SingleOutcome, SkipReason,
};
pub use rollback::{check_eligibility, RollbackEligibility, RollbackEngine, RollbackReport};
pub use session::{StoreHealth, StoreSession};
