//! Provably-fair outcome and stake-settlement engine.
//!
//! Players commit to wagers before the server seed is disclosed; outcomes
//! are drawn by HMAC over the committed seeds and every settled round can be
//! re-verified from its published record. Money paths are integer-only
//! fixed-point; settlement is idempotent end to end.

pub mod amount;
pub mod api;
pub mod commitment;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod limiter;
pub mod round;
pub mod selector;
pub mod store;

pub use amount::Amount;
pub use config::{ConfigLoader, ConfigPort, EngineConfig, StaticConfig};
pub use engine::{Engine, SpinCommitRequest};
pub use errors::{EngineError, EngineResult};
pub use ledger::{InMemoryLedger, LedgerPort};
pub use round::{Round, RoundKind, RoundStatus};
pub use store::RoundStore;
