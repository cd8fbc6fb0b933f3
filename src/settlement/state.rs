//! Settlement State Definitions
//!
//! State IDs are stored in PostgreSQL as SMALLINT.
//!
//! ```text
//! Session:   OPEN ──close──▶ CLOSED
//!
//! Transfer:  PENDING ──mark paid──▶ PAID
//!               ▲                    │
//!               └──────revert────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Session lifecycle state relevant to settlement
///
/// Richer states (scheduled, cancelled) belong to the session-management
/// collaborator and never reach this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum SessionState {
    /// Entries may be recorded, participants may join
    Open = 1,
    /// Terminal for this engine: eligible for settlement
    Closed = 2,
}

impl SessionState {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(SessionState::Open),
            2 => Some(SessionState::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Open => "OPEN",
            SessionState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pay state of a computed transfer
///
/// Two-state machine. Reverting is a compensating transition back to
/// `Pending`; a transfer row is never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum PayState {
    /// Computed, payer has not been confirmed as having paid
    Pending = 0,
    /// Manually confirmed as paid
    Paid = 10,
}

impl PayState {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(PayState::Pending),
            10 => Some(PayState::Paid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayState::Pending => "PENDING",
            PayState::Paid => "PAID",
        }
    }

    /// Check whether `self → next` is a legal transition
    #[inline]
    pub fn can_transition_to(&self, next: PayState) -> bool {
        matches!(
            (self, next),
            (PayState::Pending, PayState::Paid) | (PayState::Paid, PayState::Pending)
        )
    }
}

impl fmt::Display for PayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for PayState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        PayState::from_id(value).ok_or(())
    }
}
