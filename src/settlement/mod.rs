//! Session Settlement Engine
//!
//! Turns a closed card-game session's buy-in / cash-out ledger into the
//! minimal list of peer-to-peer transfers, exactly once per session.
//!
//! ```text
//! entries ──► aggregator ──► validation ──► calculator ──► transfers ──► pay state
//!                 │               (gate)        (under session lock)        │
//!                 └──────────────────────── audit ◄─────────────────────────┘
//! ```
//!
//! - [`aggregator`]: participant accumulators kept equal to their entries
//! - [`validation`]: amount rules and the session balance gate
//! - [`calculator`]: greedy debt netting
//! - [`service`]: units of work, locking, idempotent settlement, pay state
//! - [`store`]: PostgreSQL and in-memory backends
//! - [`audit`]: append-only change log

pub mod aggregator;
pub mod audit;
pub mod calculator;
pub mod error;
#[cfg(test)]
mod integration_tests;
pub mod service;
pub mod state;
pub mod store;
pub mod types;
pub mod validation;

pub use audit::{AuditOp, AuditRecord, AuditTable};
pub use calculator::{DebtNetting, NetPosition, PlannedTransfer};
pub use error::{ErrorKind, SettlementError};
pub use service::SettlementService;
pub use state::{PayState, SessionState};
pub use store::{LedgerStore, LedgerTx, MemoryStore, PgStore};
pub use types::{
    Entry, EntryKind, EntryPatch, Participant, Session, SettlementView, Transfer, TransferId,
};
pub use validation::{AmountBounds, BalanceReport, ValidationError};
