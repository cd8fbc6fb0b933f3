//! Ledger Store
//!
//! Transactional storage behind the settlement engine. Every service
//! operation opens one [`LedgerTx`], performs all reads, locks and writes
//! through it, and commits. Dropping a transaction without committing rolls
//! it back.
//!
//! # Locking contract
//!
//! - `lock_*` methods take an exclusive lock held until commit/rollback and
//!   fail with `ConcurrencyTimeout` when the bounded wait expires.
//! - `get_*` / `list_*` methods read without locking.
//! - Writes of one transaction are invisible to others until commit.
//!
//! Backends:
//! - [`PgStore`]: PostgreSQL row locks (`SELECT … FOR UPDATE`)
//! - [`MemoryStore`]: per-session keyed mutex + staged writes

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::audit::{AuditRecord, AuditTable, NewAuditRecord};
use super::error::SettlementError;
use super::types::{
    Entry, EntryId, NewEntry, Participant, ParticipantId, Session, SessionId, Transfer,
    TransferId, UserId,
};

/// Factory for units of work
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Begin a new unit of work
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, SettlementError>;

    /// Cheap liveness probe
    async fn health_check(&self) -> Result<(), SettlementError>;
}

/// One atomic unit of work
#[async_trait]
pub trait LedgerTx: Send {
    // === Sessions ===
    async fn insert_session(
        &mut self,
        host_id: UserId,
        name: &str,
    ) -> Result<Session, SettlementError>;

    async fn get_session(&mut self, id: SessionId) -> Result<Option<Session>, SettlementError>;

    async fn lock_session(&mut self, id: SessionId) -> Result<Option<Session>, SettlementError>;

    /// Persist `state`, `closed_at` and `settled_at`
    async fn update_session(&mut self, session: &Session) -> Result<(), SettlementError>;

    // === Participants ===
    async fn insert_participant(
        &mut self,
        session_id: SessionId,
        user_id: UserId,
        display_name: &str,
    ) -> Result<Participant, SettlementError>;

    async fn get_participant(
        &mut self,
        id: ParticipantId,
    ) -> Result<Option<Participant>, SettlementError>;

    async fn lock_participant(
        &mut self,
        id: ParticipantId,
    ) -> Result<Option<Participant>, SettlementError>;

    /// Lock every participant of the session, ordered by id
    async fn lock_participants(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Participant>, SettlementError>;

    async fn list_participants(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Participant>, SettlementError>;

    async fn update_participant_totals(
        &mut self,
        id: ParticipantId,
        total_credit: Decimal,
        total_debit: Decimal,
    ) -> Result<(), SettlementError>;

    // === Entries ===
    async fn insert_entry(&mut self, entry: &NewEntry) -> Result<Entry, SettlementError>;

    async fn lock_entry(&mut self, id: EntryId) -> Result<Option<Entry>, SettlementError>;

    /// Persist `participant_id`, `kind` and `amount`; returns the stored row
    async fn update_entry(&mut self, entry: &Entry) -> Result<Entry, SettlementError>;

    async fn delete_entry(&mut self, id: EntryId) -> Result<(), SettlementError>;

    async fn list_entries(&mut self, session_id: SessionId)
    -> Result<Vec<Entry>, SettlementError>;

    async fn list_participant_entries(
        &mut self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Entry>, SettlementError>;

    // === Transfers ===
    async fn insert_transfers(&mut self, transfers: &[Transfer]) -> Result<(), SettlementError>;

    /// All transfers of the session, ordered by `seq`
    async fn list_transfers(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Transfer>, SettlementError>;

    async fn lock_transfer(&mut self, id: TransferId)
    -> Result<Option<Transfer>, SettlementError>;

    /// Persist `pay_state`, `payment_method` and `paid_at`
    async fn update_transfer_payment(&mut self, transfer: &Transfer)
    -> Result<(), SettlementError>;

    // === Audit ===
    async fn append_audit(
        &mut self,
        record: NewAuditRecord,
    ) -> Result<AuditRecord, SettlementError>;

    /// Audit records of one row, oldest first
    async fn audit_history(
        &mut self,
        table: AuditTable,
        record_id: &str,
    ) -> Result<Vec<AuditRecord>, SettlementError>;

    /// Make every write of this unit visible and release its locks
    async fn commit(self: Box<Self>) -> Result<(), SettlementError>;
}
