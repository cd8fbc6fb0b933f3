//! In-memory ledger store
//!
//! Isolation model:
//! - one `tokio::sync::Mutex` per session, held by a transaction until it
//!   commits or drops. Every `lock_*` call resolves to the owning session's
//!   lock, which is re-entrant within one transaction.
//! - writes are staged in the transaction and applied to shared state in one
//!   step at commit. Dropping the transaction discards them.
//!
//! Shared state sits behind a `std::sync::Mutex` that is never held across
//! an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::OwnedMutexGuard;

use super::{LedgerStore, LedgerTx};
use crate::core_types::AuditId;
use crate::settlement::audit::{AuditRecord, AuditTable, NewAuditRecord};
use crate::settlement::error::SettlementError;
use crate::settlement::state::SessionState;
use crate::settlement::types::{
    Entry, EntryId, NewEntry, Participant, ParticipantId, Session, SessionId, Transfer,
    TransferId, UserId, db_now,
};

/// Default bounded lock wait
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Default)]
struct MemoryState {
    last_session_id: SessionId,
    last_participant_id: ParticipantId,
    last_entry_id: EntryId,
    last_audit_id: AuditId,
    sessions: BTreeMap<SessionId, Session>,
    participants: BTreeMap<ParticipantId, Participant>,
    entries: BTreeMap<EntryId, Entry>,
    transfers: BTreeMap<TransferId, Transfer>,
    audit: Vec<AuditRecord>,
}

struct Shared {
    state: Mutex<MemoryState>,
    session_locks: DashMap<SessionId, Arc<tokio::sync::Mutex<()>>>,
    lock_timeout: Duration,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-local store for tests and single-node deployments
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MemoryState::default()),
                session_locks: DashMap::new(),
                lock_timeout,
            }),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.shared.lock_timeout
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, SettlementError> {
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            held: HashMap::new(),
            sessions: Staged::default(),
            participants: Staged::default(),
            entries: Staged::default(),
            transfers: Staged::default(),
            audit: Vec::new(),
        }))
    }

    async fn health_check(&self) -> Result<(), SettlementError> {
        Ok(())
    }
}

/// Transaction-local overlay; `None` marks a staged delete
struct Staged<K, V> {
    writes: BTreeMap<K, Option<V>>,
}

impl<K, V> Default for Staged<K, V> {
    fn default() -> Self {
        Self {
            writes: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy, V: Clone> Staged<K, V> {
    fn get(&self, key: &K, base: &BTreeMap<K, V>) -> Option<V> {
        match self.writes.get(key) {
            Some(staged) => staged.clone(),
            None => base.get(key).cloned(),
        }
    }

    fn put(&mut self, key: K, value: V) {
        self.writes.insert(key, Some(value));
    }

    fn remove(&mut self, key: K) {
        self.writes.insert(key, None);
    }

    /// Merged view in key order
    fn scan(&self, base: &BTreeMap<K, V>, pred: impl Fn(&V) -> bool) -> Vec<V> {
        let mut merged: BTreeMap<&K, &V> = base
            .iter()
            .filter(|(k, _)| !self.writes.contains_key(*k))
            .collect();
        for (k, v) in &self.writes {
            if let Some(v) = v {
                merged.insert(k, v);
            }
        }
        merged.into_values().filter(|v| pred(v)).cloned().collect()
    }

    fn apply(self, base: &mut BTreeMap<K, V>) {
        for (k, v) in self.writes {
            match v {
                Some(v) => {
                    base.insert(k, v);
                }
                None => {
                    base.remove(&k);
                }
            }
        }
    }
}

pub struct MemoryTx {
    shared: Arc<Shared>,
    held: HashMap<SessionId, OwnedMutexGuard<()>>,
    sessions: Staged<SessionId, Session>,
    participants: Staged<ParticipantId, Participant>,
    entries: Staged<EntryId, Entry>,
    transfers: Staged<TransferId, Transfer>,
    audit: Vec<AuditRecord>,
}

impl MemoryTx {
    /// Take the session lock unless this transaction already holds it
    async fn acquire(&mut self, session_id: SessionId) -> Result<(), SettlementError> {
        if self.held.contains_key(&session_id) {
            return Ok(());
        }
        let lock = self
            .shared
            .session_locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();

        match tokio::time::timeout(self.shared.lock_timeout, lock.lock_owned()).await {
            Ok(guard) => {
                self.held.insert(session_id, guard);
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    session_id,
                    timeout_ms = self.shared.lock_timeout.as_millis() as u64,
                    "Session lock wait timed out"
                );
                Err(SettlementError::ConcurrencyTimeout(format!(
                    "session {} lock wait exceeded {} ms",
                    session_id,
                    self.shared.lock_timeout.as_millis()
                )))
            }
        }
    }

    fn read_session(&self, id: SessionId) -> Option<Session> {
        self.sessions.get(&id, &self.shared.state().sessions)
    }

    fn read_participant(&self, id: ParticipantId) -> Option<Participant> {
        self.participants
            .get(&id, &self.shared.state().participants)
    }

    fn read_entry(&self, id: EntryId) -> Option<Entry> {
        self.entries.get(&id, &self.shared.state().entries)
    }

    fn read_transfer(&self, id: TransferId) -> Option<Transfer> {
        self.transfers.get(&id, &self.shared.state().transfers)
    }

    fn scan_participants(&self, session_id: SessionId) -> Vec<Participant> {
        self.participants.scan(&self.shared.state().participants, |p| {
            p.session_id == session_id
        })
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn insert_session(
        &mut self,
        host_id: UserId,
        name: &str,
    ) -> Result<Session, SettlementError> {
        let id = {
            let mut state = self.shared.state();
            state.last_session_id += 1;
            state.last_session_id
        };
        let session = Session {
            id,
            host_id,
            name: name.to_string(),
            state: SessionState::Open,
            created_at: db_now(),
            closed_at: None,
            settled_at: None,
        };
        self.sessions.put(id, session.clone());
        Ok(session)
    }

    async fn get_session(&mut self, id: SessionId) -> Result<Option<Session>, SettlementError> {
        Ok(self.read_session(id))
    }

    async fn lock_session(&mut self, id: SessionId) -> Result<Option<Session>, SettlementError> {
        if self.read_session(id).is_none() {
            return Ok(None);
        }
        self.acquire(id).await?;
        Ok(self.read_session(id))
    }

    async fn update_session(&mut self, session: &Session) -> Result<(), SettlementError> {
        let Some(mut current) = self.read_session(session.id) else {
            return Err(SettlementError::SessionNotFound(session.id));
        };
        current.state = session.state;
        current.closed_at = session.closed_at;
        current.settled_at = session.settled_at;
        self.sessions.put(session.id, current);
        Ok(())
    }

    async fn insert_participant(
        &mut self,
        session_id: SessionId,
        user_id: UserId,
        display_name: &str,
    ) -> Result<Participant, SettlementError> {
        let id = {
            let mut state = self.shared.state();
            state.last_participant_id += 1;
            state.last_participant_id
        };
        let participant = Participant {
            id,
            session_id,
            user_id,
            display_name: display_name.to_string(),
            total_credit: Decimal::new(0, 2),
            total_debit: Decimal::new(0, 2),
        };
        self.participants.put(id, participant.clone());
        Ok(participant)
    }

    async fn get_participant(
        &mut self,
        id: ParticipantId,
    ) -> Result<Option<Participant>, SettlementError> {
        Ok(self.read_participant(id))
    }

    async fn lock_participant(
        &mut self,
        id: ParticipantId,
    ) -> Result<Option<Participant>, SettlementError> {
        let Some(current) = self.read_participant(id) else {
            return Ok(None);
        };
        self.acquire(current.session_id).await?;
        Ok(self.read_participant(id))
    }

    async fn lock_participants(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Participant>, SettlementError> {
        self.acquire(session_id).await?;
        Ok(self.scan_participants(session_id))
    }

    async fn list_participants(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Participant>, SettlementError> {
        Ok(self.scan_participants(session_id))
    }

    async fn update_participant_totals(
        &mut self,
        id: ParticipantId,
        total_credit: Decimal,
        total_debit: Decimal,
    ) -> Result<(), SettlementError> {
        let Some(mut participant) = self.read_participant(id) else {
            return Err(SettlementError::ParticipantNotFound(id));
        };
        participant.total_credit = total_credit;
        participant.total_debit = total_debit;
        self.participants.put(id, participant);
        Ok(())
    }

    async fn insert_entry(&mut self, entry: &NewEntry) -> Result<Entry, SettlementError> {
        let id = {
            let mut state = self.shared.state();
            state.last_entry_id += 1;
            state.last_entry_id
        };
        let now = db_now();
        let stored = Entry {
            id,
            session_id: entry.session_id,
            participant_id: entry.participant_id,
            kind: entry.kind,
            amount: entry.amount,
            created_at: now,
            updated_at: now,
        };
        self.entries.put(id, stored.clone());
        Ok(stored)
    }

    async fn lock_entry(&mut self, id: EntryId) -> Result<Option<Entry>, SettlementError> {
        let Some(current) = self.read_entry(id) else {
            return Ok(None);
        };
        self.acquire(current.session_id).await?;
        // May have been deleted while we waited
        Ok(self.read_entry(id))
    }

    async fn update_entry(&mut self, entry: &Entry) -> Result<Entry, SettlementError> {
        let Some(mut stored) = self.read_entry(entry.id) else {
            return Err(SettlementError::EntryNotFound(entry.id));
        };
        stored.participant_id = entry.participant_id;
        stored.kind = entry.kind;
        stored.amount = entry.amount;
        stored.updated_at = db_now();
        self.entries.put(entry.id, stored.clone());
        Ok(stored)
    }

    async fn delete_entry(&mut self, id: EntryId) -> Result<(), SettlementError> {
        if self.read_entry(id).is_none() {
            return Err(SettlementError::EntryNotFound(id));
        }
        self.entries.remove(id);
        Ok(())
    }

    async fn list_entries(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Entry>, SettlementError> {
        Ok(self
            .entries
            .scan(&self.shared.state().entries, |e| e.session_id == session_id))
    }

    async fn list_participant_entries(
        &mut self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Entry>, SettlementError> {
        Ok(self.entries.scan(&self.shared.state().entries, |e| {
            e.participant_id == participant_id
        }))
    }

    async fn insert_transfers(&mut self, transfers: &[Transfer]) -> Result<(), SettlementError> {
        for transfer in transfers {
            if self.read_transfer(transfer.id).is_some() {
                return Err(SettlementError::DatabaseError(format!(
                    "duplicate transfer id {}",
                    transfer.id
                )));
            }
            self.transfers.put(transfer.id, transfer.clone());
        }
        Ok(())
    }

    async fn list_transfers(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Transfer>, SettlementError> {
        let mut transfers = self
            .transfers
            .scan(&self.shared.state().transfers, |t| t.session_id == session_id);
        transfers.sort_by_key(|t| t.seq);
        Ok(transfers)
    }

    async fn lock_transfer(
        &mut self,
        id: TransferId,
    ) -> Result<Option<Transfer>, SettlementError> {
        let Some(current) = self.read_transfer(id) else {
            return Ok(None);
        };
        self.acquire(current.session_id).await?;
        Ok(self.read_transfer(id))
    }

    async fn update_transfer_payment(
        &mut self,
        transfer: &Transfer,
    ) -> Result<(), SettlementError> {
        let Some(mut stored) = self.read_transfer(transfer.id) else {
            return Err(SettlementError::TransferNotFound(transfer.id.to_string()));
        };
        stored.pay_state = transfer.pay_state;
        stored.payment_method = transfer.payment_method.clone();
        stored.paid_at = transfer.paid_at;
        self.transfers.put(transfer.id, stored);
        Ok(())
    }

    async fn append_audit(
        &mut self,
        record: NewAuditRecord,
    ) -> Result<AuditRecord, SettlementError> {
        let id = {
            let mut state = self.shared.state();
            state.last_audit_id += 1;
            state.last_audit_id
        };
        let stored = record.into_record(id, db_now());
        self.audit.push(stored.clone());
        Ok(stored)
    }

    async fn audit_history(
        &mut self,
        table: AuditTable,
        record_id: &str,
    ) -> Result<Vec<AuditRecord>, SettlementError> {
        let matches = |r: &&AuditRecord| r.table == table && r.record_id == record_id;
        let mut history: Vec<AuditRecord> = {
            let state = self.shared.state();
            state.audit.iter().filter(matches).cloned().collect()
        };
        history.extend(self.audit.iter().filter(matches).cloned());
        history.sort_by_key(|r| r.id);
        Ok(history)
    }

    async fn commit(self: Box<Self>) -> Result<(), SettlementError> {
        let MemoryTx {
            shared,
            held,
            sessions,
            participants,
            entries,
            transfers,
            audit,
        } = *self;

        {
            let mut state = shared.state();
            sessions.apply(&mut state.sessions);
            participants.apply(&mut state.participants);
            entries.apply(&mut state.entries);
            transfers.apply(&mut state.transfers);
            state.audit.extend(audit);
        }

        drop(held);
        Ok(())
    }
}
