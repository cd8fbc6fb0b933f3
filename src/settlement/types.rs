//! Settlement Core Types
//!
//! Rows of the settlement ledger: sessions, participants, entries, transfers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use crate::core_types::{EntryId, ParticipantId, SessionId, UserId};

use super::state::{PayState, SessionState};

/// Current time truncated to microseconds (PostgreSQL `TIMESTAMPTZ` precision)
///
/// Truncating up front keeps freshly built rows equal to the rows read back.
pub fn db_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Transfer ID - ULID-based unique identifier
///
/// Lexicographically sortable, generated without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for TransferId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TransferId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Session row (only the fields settlement depends on)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub host_id: UserId,
    pub name: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Set once, in the same unit of work that persists the transfers
    pub settled_at: Option<DateTime<Utc>>,
}

impl Session {
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Settlement has been computed (possibly with zero transfers)
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }
}

/// Participant row with its derived accumulators
///
/// `total_credit` (cash-outs) and `total_debit` (buy-ins) are a cache of the
/// entry set, rewritten by the ledger aggregator on every entry write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub display_name: String,
    pub total_credit: Decimal,
    pub total_debit: Decimal,
}

impl Participant {
    /// Credit minus debit; negative means the participant owes money
    #[inline]
    pub fn net_position(&self) -> Decimal {
        self.total_credit - self.total_debit
    }
}

/// Entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum EntryKind {
    /// Buy-in: money the participant put into the game
    Debit = 1,
    /// Cash-out: money the participant took out of the game
    Credit = 2,
}

impl EntryKind {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(EntryKind::Debit),
            2 => Some(EntryKind::Credit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Debit => "debit",
            EntryKind::Credit => "credit",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debit" | "buy_in" | "buyin" => Ok(EntryKind::Debit),
            "credit" | "cash_out" | "cashout" => Ok(EntryKind::Credit),
            _ => Err(format!("unknown entry kind: {}", s)),
        }
    }
}

/// Buy-in / cash-out record, the source of truth for participant totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entry to be inserted (id and timestamps assigned by the store)
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub kind: EntryKind,
    pub amount: Decimal,
}

/// Partial update of an entry; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub participant_id: Option<ParticipantId>,
    pub kind: Option<EntryKind>,
    pub amount: Option<Decimal>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.participant_id.is_none() && self.kind.is_none() && self.amount.is_none()
    }
}

/// Computed settlement transfer
///
/// Immutable once created except `pay_state`, `payment_method` and `paid_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub session_id: SessionId,
    /// Position in the calculator's output
    pub seq: i32,
    pub payer_id: ParticipantId,
    pub payee_id: ParticipantId,
    pub amount: Decimal,
    pub pay_state: PayState,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer[{}] session={} #{} {} -> {} amount={} state={}",
            self.id,
            self.session_id,
            self.seq,
            self.payer_id,
            self.payee_id,
            self.amount,
            self.pay_state
        )
    }
}

/// Read model of a session's settlement ledger
///
/// `computed == false` is the explicit "not yet computed" answer; a computed
/// settlement with zero transfers (everyone broke even) has `computed == true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementView {
    pub session_id: SessionId,
    pub computed: bool,
    pub transfers: Vec<Transfer>,
}
