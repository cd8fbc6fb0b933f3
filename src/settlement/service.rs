//! Settlement Service
//!
//! Entry point for every engine operation. Each public method runs as one
//! unit of work on the [`LedgerStore`]: begin, lock, read, write, audit,
//! commit. An error anywhere drops the transaction and nothing is written.
//!
//! Lock order (both backends): entry → session → participants (by id) →
//! transfer. Settlement takes the session lock first, so entry writes and
//! settlement for one session serialize while other sessions proceed.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::config::SettlementConfig;

use super::aggregator::{net_positions, refresh_participant};
use super::audit::{AuditRecord, AuditTable, NewAuditRecord};
use super::calculator::DebtNetting;
use super::error::{ErrorKind, SettlementError};
use super::state::{PayState, SessionState};
use super::store::{LedgerStore, LedgerTx};
use super::types::{
    Entry, EntryId, EntryKind, EntryPatch, NewEntry, Participant, ParticipantId, Session,
    SessionId, SettlementView, Transfer, TransferId, UserId, db_now,
};
use super::validation::{
    self, BalanceReport, ValidationError, check_session_balance, validate_payment_method,
};

/// Log a failed operation at the level its kind deserves
fn rejected(op: &'static str) -> impl Fn(&SettlementError) {
    move |e: &SettlementError| match e.kind() {
        ErrorKind::Internal => error!(op, code = e.code(), error = %e, "Settlement operation failed"),
        _ => warn!(op, code = e.code(), error = %e, "Settlement operation rejected"),
    }
}

fn authorize_entry(
    session: &Session,
    participant: &Participant,
    actor_id: UserId,
    action: &'static str,
) -> Result<(), SettlementError> {
    if actor_id == session.host_id || actor_id == participant.user_id {
        Ok(())
    } else {
        Err(SettlementError::Forbidden { actor_id, action })
    }
}

pub struct SettlementService {
    store: Arc<dyn LedgerStore>,
    config: SettlementConfig,
    netting: DebtNetting,
}

impl SettlementService {
    pub fn new(store: Arc<dyn LedgerStore>, config: SettlementConfig) -> Self {
        let netting = DebtNetting::new(config.tolerance);
        Self {
            store,
            config,
            netting,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    pub async fn health_check(&self) -> Result<(), SettlementError> {
        self.store.health_check().await
    }

    // ========================================================================
    // Sessions & roster
    // ========================================================================

    pub async fn open_session(
        &self,
        host_id: UserId,
        name: &str,
    ) -> Result<Session, SettlementError> {
        let name = validation::validate_name("name", name)
            .map_err(SettlementError::from)
            .inspect_err(rejected("open_session"))?;

        let mut tx = self.store.begin().await?;
        let session = tx.insert_session(host_id, &name).await?;
        tx.commit().await.inspect_err(rejected("open_session"))?;

        info!(session_id = session.id, host_id, "Session opened");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: SessionId) -> Result<Session, SettlementError> {
        let mut tx = self.store.begin().await?;
        tx.get_session(session_id)
            .await?
            .ok_or(SettlementError::SessionNotFound(session_id))
    }

    /// Open → Closed; host only
    pub async fn close_session(
        &self,
        session_id: SessionId,
        actor_id: UserId,
    ) -> Result<Session, SettlementError> {
        let mut tx = self.store.begin().await?;
        let session = Self::close_session_in(tx.as_mut(), session_id, actor_id)
            .await
            .inspect_err(rejected("close_session"))?;
        tx.commit().await.inspect_err(rejected("close_session"))?;

        info!(session_id, actor_id, "Session closed");
        Ok(session)
    }

    async fn close_session_in(
        tx: &mut dyn LedgerTx,
        session_id: SessionId,
        actor_id: UserId,
    ) -> Result<Session, SettlementError> {
        let mut session = tx
            .lock_session(session_id)
            .await?
            .ok_or(SettlementError::SessionNotFound(session_id))?;
        if actor_id != session.host_id {
            return Err(SettlementError::Forbidden {
                actor_id,
                action: "close session",
            });
        }
        if session.is_closed() {
            return Err(SettlementError::SessionAlreadyClosed(session_id));
        }

        session.state = SessionState::Closed;
        session.closed_at = Some(db_now());
        tx.update_session(&session).await?;
        Ok(session)
    }

    /// Join a user to an open session; the host or the user themself may do it
    pub async fn add_participant(
        &self,
        session_id: SessionId,
        user_id: UserId,
        display_name: &str,
        actor_id: UserId,
    ) -> Result<Participant, SettlementError> {
        let display_name = validation::validate_name("display_name", display_name)
            .map_err(SettlementError::from)
            .inspect_err(rejected("add_participant"))?;

        let mut tx = self.store.begin().await?;
        let participant =
            Self::add_participant_in(tx.as_mut(), session_id, user_id, &display_name, actor_id)
                .await
                .inspect_err(rejected("add_participant"))?;
        tx.commit().await.inspect_err(rejected("add_participant"))?;

        info!(
            session_id,
            participant_id = participant.id,
            user_id,
            "Participant added"
        );
        Ok(participant)
    }

    async fn add_participant_in(
        tx: &mut dyn LedgerTx,
        session_id: SessionId,
        user_id: UserId,
        display_name: &str,
        actor_id: UserId,
    ) -> Result<Participant, SettlementError> {
        let session = tx
            .lock_session(session_id)
            .await?
            .ok_or(SettlementError::SessionNotFound(session_id))?;
        if actor_id != session.host_id && actor_id != user_id {
            return Err(SettlementError::Forbidden {
                actor_id,
                action: "add participants",
            });
        }
        if session.is_closed() {
            return Err(SettlementError::SessionAlreadyClosed(session_id));
        }
        let roster = tx.list_participants(session_id).await?;
        if roster.iter().any(|p| p.user_id == user_id) {
            return Err(SettlementError::ParticipantExists {
                session_id,
                user_id,
            });
        }
        tx.insert_participant(session_id, user_id, display_name)
            .await
    }

    pub async fn list_participants(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Participant>, SettlementError> {
        let mut tx = self.store.begin().await?;
        if tx.get_session(session_id).await?.is_none() {
            return Err(SettlementError::SessionNotFound(session_id));
        }
        tx.list_participants(session_id).await
    }

    // ========================================================================
    // Entries
    // ========================================================================

    /// Record a buy-in (debit) or cash-out (credit)
    ///
    /// Rejected once the session's settlement has been computed.
    pub async fn record_entry(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        kind: EntryKind,
        amount: Decimal,
        actor_id: UserId,
    ) -> Result<Entry, SettlementError> {
        let amount = validation::validate_amount(amount, &self.config.entry_bounds)
            .map_err(SettlementError::from)
            .inspect_err(rejected("record_entry"))?;

        let mut tx = self.store.begin().await?;
        let entry = Self::record_entry_in(
            tx.as_mut(),
            NewEntry {
                session_id,
                participant_id,
                kind,
                amount,
            },
            actor_id,
        )
        .await
        .inspect_err(rejected("record_entry"))?;
        tx.commit().await.inspect_err(rejected("record_entry"))?;

        info!(
            session_id,
            participant_id,
            entry_id = entry.id,
            kind = %entry.kind,
            amount = %entry.amount,
            "Entry recorded"
        );
        Ok(entry)
    }

    async fn record_entry_in(
        tx: &mut dyn LedgerTx,
        new: NewEntry,
        actor_id: UserId,
    ) -> Result<Entry, SettlementError> {
        let session = tx
            .lock_session(new.session_id)
            .await?
            .ok_or(SettlementError::SessionNotFound(new.session_id))?;
        if session.is_settled() {
            return Err(SettlementError::SettlementFrozen(session.id));
        }
        let participant = Self::lock_member(tx, &session, new.participant_id).await?;
        authorize_entry(&session, &participant, actor_id, "record entries")?;

        let entry = tx.insert_entry(&new).await?;
        tx.append_audit(NewAuditRecord::entry_inserted(&entry, actor_id))
            .await?;
        refresh_participant(tx, participant.id, actor_id).await?;
        Ok(entry)
    }

    /// Change participant, kind or amount of an entry
    pub async fn update_entry(
        &self,
        entry_id: EntryId,
        mut patch: EntryPatch,
        actor_id: UserId,
    ) -> Result<Entry, SettlementError> {
        if patch.is_empty() {
            let err = SettlementError::from(ValidationError::EmptyUpdate);
            rejected("update_entry")(&err);
            return Err(err);
        }
        if let Some(amount) = patch.amount {
            patch.amount = Some(
                validation::validate_amount(amount, &self.config.entry_bounds)
                    .map_err(SettlementError::from)
                    .inspect_err(rejected("update_entry"))?,
            );
        }

        let mut tx = self.store.begin().await?;
        let entry = Self::update_entry_in(tx.as_mut(), entry_id, patch, actor_id)
            .await
            .inspect_err(rejected("update_entry"))?;
        tx.commit().await.inspect_err(rejected("update_entry"))?;

        info!(
            entry_id,
            participant_id = entry.participant_id,
            kind = %entry.kind,
            amount = %entry.amount,
            "Entry updated"
        );
        Ok(entry)
    }

    async fn update_entry_in(
        tx: &mut dyn LedgerTx,
        entry_id: EntryId,
        patch: EntryPatch,
        actor_id: UserId,
    ) -> Result<Entry, SettlementError> {
        let before = tx
            .lock_entry(entry_id)
            .await?
            .ok_or(SettlementError::EntryNotFound(entry_id))?;
        let session = tx
            .lock_session(before.session_id)
            .await?
            .ok_or(SettlementError::SessionNotFound(before.session_id))?;
        if session.is_settled() {
            return Err(SettlementError::SettlementFrozen(session.id));
        }

        let target_id = patch.participant_id.unwrap_or(before.participant_id);
        let mut affected = vec![before.participant_id, target_id];
        affected.sort_unstable();
        affected.dedup();
        for participant_id in &affected {
            let participant = Self::lock_member(tx, &session, *participant_id).await?;
            authorize_entry(&session, &participant, actor_id, "edit entries")?;
        }

        let after = Entry {
            participant_id: target_id,
            kind: patch.kind.unwrap_or(before.kind),
            amount: patch.amount.unwrap_or(before.amount),
            ..before.clone()
        };
        if after.participant_id == before.participant_id
            && after.kind == before.kind
            && after.amount == before.amount
        {
            debug!(entry_id, "Entry update is a no-op");
            return Ok(before);
        }

        let stored = tx.update_entry(&after).await?;
        tx.append_audit(NewAuditRecord::entry_updated(&before, &stored, actor_id))
            .await?;
        for participant_id in affected {
            refresh_participant(tx, participant_id, actor_id).await?;
        }
        Ok(stored)
    }

    /// Remove an entry; returns the removed row
    pub async fn delete_entry(
        &self,
        entry_id: EntryId,
        actor_id: UserId,
    ) -> Result<Entry, SettlementError> {
        let mut tx = self.store.begin().await?;
        let entry = Self::delete_entry_in(tx.as_mut(), entry_id, actor_id)
            .await
            .inspect_err(rejected("delete_entry"))?;
        tx.commit().await.inspect_err(rejected("delete_entry"))?;

        info!(
            entry_id,
            participant_id = entry.participant_id,
            "Entry deleted"
        );
        Ok(entry)
    }

    async fn delete_entry_in(
        tx: &mut dyn LedgerTx,
        entry_id: EntryId,
        actor_id: UserId,
    ) -> Result<Entry, SettlementError> {
        let entry = tx
            .lock_entry(entry_id)
            .await?
            .ok_or(SettlementError::EntryNotFound(entry_id))?;
        let session = tx
            .lock_session(entry.session_id)
            .await?
            .ok_or(SettlementError::SessionNotFound(entry.session_id))?;
        if session.is_settled() {
            return Err(SettlementError::SettlementFrozen(session.id));
        }
        let participant = Self::lock_member(tx, &session, entry.participant_id).await?;
        authorize_entry(&session, &participant, actor_id, "delete entries")?;

        tx.delete_entry(entry_id).await?;
        tx.append_audit(NewAuditRecord::entry_deleted(&entry, actor_id))
            .await?;
        refresh_participant(tx, participant.id, actor_id).await?;
        Ok(entry)
    }

    pub async fn list_entries(&self, session_id: SessionId) -> Result<Vec<Entry>, SettlementError> {
        let mut tx = self.store.begin().await?;
        if tx.get_session(session_id).await?.is_none() {
            return Err(SettlementError::SessionNotFound(session_id));
        }
        tx.list_entries(session_id).await
    }

    /// Lock a participant and check it belongs to the session
    async fn lock_member(
        tx: &mut dyn LedgerTx,
        session: &Session,
        participant_id: ParticipantId,
    ) -> Result<Participant, SettlementError> {
        let participant = tx
            .lock_participant(participant_id)
            .await?
            .ok_or(SettlementError::ParticipantNotFound(participant_id))?;
        if participant.session_id != session.id {
            return Err(SettlementError::ParticipantSessionMismatch {
                participant_id,
                session_id: session.id,
            });
        }
        Ok(participant)
    }

    // ========================================================================
    // Integrity
    // ========================================================================

    /// Compare summed credits and debits against tolerance (read-only)
    pub async fn validate_session_balance(
        &self,
        session_id: SessionId,
    ) -> Result<BalanceReport, SettlementError> {
        let mut tx = self.store.begin().await?;
        if tx.get_session(session_id).await?.is_none() {
            return Err(SettlementError::SessionNotFound(session_id));
        }
        let participants = tx.list_participants(session_id).await?;
        Ok(check_session_balance(
            session_id,
            &participants,
            self.config.tolerance,
        ))
    }

    // ========================================================================
    // Settlement
    // ========================================================================

    /// Compute and persist the transfer list exactly once per session
    ///
    /// Repeated and concurrent calls return the set stored by the first
    /// successful call.
    pub async fn calculate_settlement(
        &self,
        session_id: SessionId,
        actor_id: UserId,
    ) -> Result<Vec<Transfer>, SettlementError> {
        let mut tx = self.store.begin().await?;
        let transfers = self
            .calculate_settlement_in(tx.as_mut(), session_id, actor_id)
            .await
            .inspect_err(rejected("calculate_settlement"))?;
        tx.commit()
            .await
            .inspect_err(rejected("calculate_settlement"))?;
        Ok(transfers)
    }

    async fn calculate_settlement_in(
        &self,
        tx: &mut dyn LedgerTx,
        session_id: SessionId,
        actor_id: UserId,
    ) -> Result<Vec<Transfer>, SettlementError> {
        let mut session = tx
            .lock_session(session_id)
            .await?
            .ok_or(SettlementError::SessionNotFound(session_id))?;
        if !session.is_closed() {
            return Err(SettlementError::SessionNotClosed(session_id));
        }

        let existing = tx.list_transfers(session_id).await?;
        if session.is_settled() || !existing.is_empty() {
            debug!(
                session_id,
                transfers = existing.len(),
                "Settlement already computed, returning stored transfers"
            );
            return Ok(existing);
        }

        let participants = tx.lock_participants(session_id).await?;
        let report = check_session_balance(session_id, &participants, self.config.tolerance);
        if !report.ok {
            return Err(SettlementError::BalanceMismatch {
                session_id,
                total_credit: report.total_credit,
                total_debit: report.total_debit,
                difference: report.difference,
                tolerance: report.tolerance,
            });
        }

        let plan = self.netting.compute(&net_positions(&participants));
        // The plan is what the balanced ledger owes; a payment over the
        // single-transfer limit is flagged, never refused
        let limit = &self.config.transfer_bounds;
        for planned in plan.iter().filter(|p| !limit.contains(p.amount)) {
            warn!(
                session_id,
                payer_id = planned.payer_id,
                payee_id = planned.payee_id,
                amount = %planned.amount,
                max = %limit.max,
                "Settlement transfer outside single-payment limit"
            );
        }

        let now = db_now();
        let transfers: Vec<Transfer> = plan
            .iter()
            .enumerate()
            .map(|(seq, planned)| Transfer {
                id: TransferId::new(),
                session_id,
                seq: seq as i32,
                payer_id: planned.payer_id,
                payee_id: planned.payee_id,
                amount: planned.amount,
                pay_state: PayState::Pending,
                payment_method: None,
                created_at: now,
                paid_at: None,
            })
            .collect();

        tx.insert_transfers(&transfers).await?;
        for transfer in &transfers {
            tx.append_audit(NewAuditRecord::transfer_created(transfer, actor_id))
                .await?;
        }
        session.settled_at = Some(now);
        tx.update_session(&session).await?;

        let total: Decimal = transfers.iter().map(|t| t.amount).sum();
        info!(
            session_id,
            actor_id,
            transfers = transfers.len(),
            participants = participants.len(),
            total = %total,
            "Settlement computed"
        );
        Ok(transfers)
    }

    /// Stored transfers, or `computed = false` before the first calculation
    pub async fn get_settlement(
        &self,
        session_id: SessionId,
    ) -> Result<SettlementView, SettlementError> {
        let mut tx = self.store.begin().await?;
        let session = tx
            .get_session(session_id)
            .await?
            .ok_or(SettlementError::SessionNotFound(session_id))?;
        let transfers = tx.list_transfers(session_id).await?;
        Ok(SettlementView {
            session_id,
            computed: session.is_settled() || !transfers.is_empty(),
            transfers,
        })
    }

    pub async fn mark_transfer_paid(
        &self,
        transfer_id: TransferId,
        payment_method: Option<&str>,
        actor_id: UserId,
    ) -> Result<Transfer, SettlementError> {
        let payment_method = validate_payment_method(payment_method)
            .map_err(SettlementError::from)
            .inspect_err(rejected("mark_transfer_paid"))?;

        let mut tx = self.store.begin().await?;
        let transfer = Self::transition_in(
            tx.as_mut(),
            transfer_id,
            PayState::Paid,
            payment_method,
            actor_id,
        )
        .await
        .inspect_err(rejected("mark_transfer_paid"))?;
        tx.commit()
            .await
            .inspect_err(rejected("mark_transfer_paid"))?;

        info!(
            transfer_id = %transfer.id,
            actor_id,
            payment_method = ?transfer.payment_method,
            "Transfer marked paid"
        );
        Ok(transfer)
    }

    pub async fn revert_transfer(
        &self,
        transfer_id: TransferId,
        actor_id: UserId,
    ) -> Result<Transfer, SettlementError> {
        let mut tx = self.store.begin().await?;
        let transfer =
            Self::transition_in(tx.as_mut(), transfer_id, PayState::Pending, None, actor_id)
                .await
                .inspect_err(rejected("revert_transfer"))?;
        tx.commit().await.inspect_err(rejected("revert_transfer"))?;

        info!(transfer_id = %transfer.id, actor_id, "Transfer reverted to pending");
        Ok(transfer)
    }

    async fn transition_in(
        tx: &mut dyn LedgerTx,
        transfer_id: TransferId,
        next: PayState,
        payment_method: Option<String>,
        actor_id: UserId,
    ) -> Result<Transfer, SettlementError> {
        let before = tx
            .lock_transfer(transfer_id)
            .await?
            .ok_or_else(|| SettlementError::TransferNotFound(transfer_id.to_string()))?;

        let session = tx
            .get_session(before.session_id)
            .await?
            .ok_or(SettlementError::SessionNotFound(before.session_id))?;
        let action = match next {
            PayState::Paid => "mark transfer paid",
            PayState::Pending => "revert transfer",
        };
        if actor_id != session.host_id {
            let mut allowed = false;
            for participant_id in [before.payer_id, before.payee_id] {
                if let Some(p) = tx.get_participant(participant_id).await?
                    && p.user_id == actor_id
                {
                    allowed = true;
                }
            }
            if !allowed {
                return Err(SettlementError::Forbidden { actor_id, action });
            }
        }

        if !before.pay_state.can_transition_to(next) {
            return Err(SettlementError::InvalidStateTransition(format!(
                "{} -> {}",
                before.pay_state, next
            )));
        }

        let mut after = before.clone();
        after.pay_state = next;
        match next {
            PayState::Paid => {
                after.payment_method = payment_method;
                after.paid_at = Some(db_now());
            }
            PayState::Pending => {
                after.payment_method = None;
                after.paid_at = None;
            }
        }

        tx.update_transfer_payment(&after).await?;
        tx.append_audit(NewAuditRecord::transfer_transitioned(&before, &after, actor_id))
            .await?;
        Ok(after)
    }

    // ========================================================================
    // Audit
    // ========================================================================

    /// Audit records of one row, oldest first
    pub async fn get_audit_history(
        &self,
        table: AuditTable,
        record_id: &str,
    ) -> Result<Vec<AuditRecord>, SettlementError> {
        let mut tx = self.store.begin().await?;
        tx.audit_history(table, record_id).await
    }
}
