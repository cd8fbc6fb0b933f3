//! Audit Trail
//!
//! Append-only record of every write to entries, participant accumulators and
//! transfers. Records are written inside the unit of work that performs the
//! mutation; a failed audit insert fails the whole unit.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AuditId, ParticipantId, UserId};

use super::types::{Entry, Transfer};

/// Audited table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditTable {
    Entries,
    Participants,
    Transfers,
}

impl AuditTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditTable::Entries => "entries",
            AuditTable::Participants => "participants",
            AuditTable::Transfers => "transfers",
        }
    }
}

impl fmt::Display for AuditTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AuditTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entries" => Ok(AuditTable::Entries),
            "participants" => Ok(AuditTable::Participants),
            "transfers" => Ok(AuditTable::Transfers),
            _ => Err(format!("unknown audit table: {}", s)),
        }
    }
}

/// Mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditOp {
    Insert,
    Update,
    Delete,
}

impl AuditOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOp::Insert => "INSERT",
            AuditOp::Update => "UPDATE",
            AuditOp::Delete => "DELETE",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(AuditOp::Insert),
            "UPDATE" => Some(AuditOp::Update),
            "DELETE" => Some(AuditOp::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for AuditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditId,
    pub table: AuditTable,
    pub record_id: String,
    pub operation: AuditOp,
    pub actor_id: UserId,
    /// Column name when one row carries several audited amounts
    pub field: Option<String>,
    pub old_amount: Option<Decimal>,
    pub new_amount: Option<Decimal>,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit row to be appended (id and timestamp assigned by the store)
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    pub table: AuditTable,
    pub record_id: String,
    pub operation: AuditOp,
    pub actor_id: UserId,
    pub field: Option<String>,
    pub old_amount: Option<Decimal>,
    pub new_amount: Option<Decimal>,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
}

impl NewAuditRecord {
    fn new(table: AuditTable, record_id: String, operation: AuditOp, actor_id: UserId) -> Self {
        Self {
            table,
            record_id,
            operation,
            actor_id,
            field: None,
            old_amount: None,
            new_amount: None,
            old_state: None,
            new_state: None,
        }
    }

    pub fn entry_inserted(entry: &Entry, actor_id: UserId) -> Self {
        Self {
            new_amount: Some(entry.amount),
            new_state: Some(entry.kind.to_string()),
            ..Self::new(AuditTable::Entries, entry.id.to_string(), AuditOp::Insert, actor_id)
        }
    }

    pub fn entry_updated(before: &Entry, after: &Entry, actor_id: UserId) -> Self {
        Self {
            field: (before.participant_id != after.participant_id).then(|| {
                format!(
                    "participant {} -> {}",
                    before.participant_id, after.participant_id
                )
            }),
            old_amount: Some(before.amount),
            new_amount: Some(after.amount),
            old_state: Some(before.kind.to_string()),
            new_state: Some(after.kind.to_string()),
            ..Self::new(AuditTable::Entries, after.id.to_string(), AuditOp::Update, actor_id)
        }
    }

    pub fn entry_deleted(entry: &Entry, actor_id: UserId) -> Self {
        Self {
            old_amount: Some(entry.amount),
            old_state: Some(entry.kind.to_string()),
            ..Self::new(AuditTable::Entries, entry.id.to_string(), AuditOp::Delete, actor_id)
        }
    }

    pub fn accumulator_changed(
        participant_id: ParticipantId,
        field: &'static str,
        old: Decimal,
        new: Decimal,
        actor_id: UserId,
    ) -> Self {
        Self {
            field: Some(field.to_string()),
            old_amount: Some(old),
            new_amount: Some(new),
            ..Self::new(
                AuditTable::Participants,
                participant_id.to_string(),
                AuditOp::Update,
                actor_id,
            )
        }
    }

    pub fn transfer_created(transfer: &Transfer, actor_id: UserId) -> Self {
        Self {
            new_amount: Some(transfer.amount),
            new_state: Some(transfer.pay_state.to_string()),
            ..Self::new(
                AuditTable::Transfers,
                transfer.id.to_string(),
                AuditOp::Insert,
                actor_id,
            )
        }
    }

    pub fn transfer_transitioned(before: &Transfer, after: &Transfer, actor_id: UserId) -> Self {
        Self {
            field: after
                .payment_method
                .as_ref()
                .map(|m| format!("payment_method={}", m)),
            old_amount: Some(before.amount),
            new_amount: Some(after.amount),
            old_state: Some(before.pay_state.to_string()),
            new_state: Some(after.pay_state.to_string()),
            ..Self::new(
                AuditTable::Transfers,
                after.id.to_string(),
                AuditOp::Update,
                actor_id,
            )
        }
    }

    /// Materialize into a stored record
    pub fn into_record(self, id: AuditId, created_at: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id,
            table: self.table,
            record_id: self.record_id,
            operation: self.operation,
            actor_id: self.actor_id,
            field: self.field,
            old_amount: self.old_amount,
            new_amount: self.new_amount,
            old_state: self.old_state,
            new_state: self.new_state,
            created_at,
        }
    }
}
