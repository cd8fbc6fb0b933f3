//! Ledger Aggregator
//!
//! Keeps `total_credit` / `total_debit` of each participant equal to the sum
//! of their entries. Refreshes run inside the same unit of work as the entry
//! mutation that triggered them.

use rust_decimal::Decimal;

use crate::money;

use super::audit::NewAuditRecord;
use super::calculator::NetPosition;
use super::error::SettlementError;
use super::store::LedgerTx;
use super::types::{Entry, EntryKind, Participant, ParticipantId, UserId};

/// Per-kind entry sums, rounded to 2 decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub credit: Decimal,
    pub debit: Decimal,
}

impl Totals {
    pub fn of(entries: &[Entry]) -> Self {
        let sum = |kind: EntryKind| {
            money::round2(
                entries
                    .iter()
                    .filter(|e| e.kind == kind)
                    .map(|e| e.amount)
                    .sum(),
            )
        };
        Self {
            credit: sum(EntryKind::Credit),
            debit: sum(EntryKind::Debit),
        }
    }
}

/// Recompute one participant's accumulators from their entries
///
/// Writes and audits only the fields that changed. Returns the participant
/// as stored after the refresh.
pub async fn refresh_participant(
    tx: &mut dyn LedgerTx,
    participant_id: ParticipantId,
    actor_id: UserId,
) -> Result<Participant, SettlementError> {
    let mut participant = tx
        .get_participant(participant_id)
        .await?
        .ok_or(SettlementError::ParticipantNotFound(participant_id))?;
    let entries = tx.list_participant_entries(participant_id).await?;
    let totals = Totals::of(&entries);

    let credit_changed = totals.credit != participant.total_credit;
    let debit_changed = totals.debit != participant.total_debit;
    if !credit_changed && !debit_changed {
        return Ok(participant);
    }

    tx.update_participant_totals(participant_id, totals.credit, totals.debit)
        .await?;

    if credit_changed {
        tx.append_audit(NewAuditRecord::accumulator_changed(
            participant_id,
            "total_credit",
            participant.total_credit,
            totals.credit,
            actor_id,
        ))
        .await?;
    }
    if debit_changed {
        tx.append_audit(NewAuditRecord::accumulator_changed(
            participant_id,
            "total_debit",
            participant.total_debit,
            totals.debit,
            actor_id,
        ))
        .await?;
    }

    tracing::debug!(
        participant_id,
        total_credit = %totals.credit,
        total_debit = %totals.debit,
        entries = entries.len(),
        "Participant totals refreshed"
    );

    participant.total_credit = totals.credit;
    participant.total_debit = totals.debit;
    Ok(participant)
}

/// Net positions of every participant, in the given order
pub fn net_positions(participants: &[Participant]) -> Vec<NetPosition> {
    participants
        .iter()
        .map(|p| NetPosition::new(p.id, p.net_position()))
        .collect()
}
