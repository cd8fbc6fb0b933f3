//! Settle Engine - ledger and debt-netting settlement for card-game sessions
//!
//! Members record buy-ins and cash-outs during a session; once the host
//! closes it, the engine checks that the books balance and computes a short
//! list of transfers that clears every net position.
//!
//! # Modules
//!
//! - [`core_types`] - Id aliases (UserId, SessionId, ...)
//! - [`money`] - 2-decimal currency parsing and rounding
//! - [`settlement`] - Aggregator, validator, netting, ledger store, audit
//! - [`gateway`] - axum HTTP API
//! - [`db`] - PostgreSQL pool and schema migrations
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

// Core types - must be first!
pub mod core_types;
pub mod money;

pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod settlement;

// Convenient re-exports at crate root
pub use config::{AppConfig, SettlementConfig};
pub use core_types::{EntryId, ParticipantId, SessionId, UserId};
pub use settlement::{
    DebtNetting, LedgerStore, MemoryStore, PgStore, SettlementError, SettlementService,
};
