//! Settlement Error Types
//!
//! One enum for every failure the engine reports. Each variant maps to a
//! stable error code, an HTTP status suggestion and an [`ErrorKind`].

use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{EntryId, ParticipantId, SessionId, UserId};
use super::validation::ValidationError;

/// Error taxonomy buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any persistence
    Validation,
    /// Session credits and debits disagree beyond tolerance
    Integrity,
    /// Operation not allowed in the current lifecycle state
    State,
    /// Actor may not perform the operation
    Forbidden,
    /// Lock not acquired in time; safe to retry
    ConcurrencyTimeout,
    /// Unknown id
    NotFound,
    /// Store failure
    Internal,
}

#[derive(Error, Debug, Clone)]
pub enum SettlementError {
    // === Validation Errors ===
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // === Integrity Errors ===
    #[error(
        "Balance mismatch in session {session_id}: total credit {total_credit}, total debit {total_debit} (difference {difference} exceeds tolerance {tolerance})"
    )]
    BalanceMismatch {
        session_id: SessionId,
        total_credit: Decimal,
        total_debit: Decimal,
        difference: Decimal,
        tolerance: Decimal,
    },

    // === State Errors ===
    #[error("Session {0} is not closed")]
    SessionNotClosed(SessionId),

    #[error("Session {0} is already closed")]
    SessionAlreadyClosed(SessionId),

    #[error("Settlement already computed for session {0}; entries are frozen")]
    SettlementFrozen(SessionId),

    #[error("Participant {participant_id} does not belong to session {session_id}")]
    ParticipantSessionMismatch {
        participant_id: ParticipantId,
        session_id: SessionId,
    },

    #[error("User {user_id} already joined session {session_id}")]
    ParticipantExists {
        session_id: SessionId,
        user_id: UserId,
    },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // === Authorization ===
    #[error("User {actor_id} is not allowed to {action}")]
    Forbidden {
        actor_id: UserId,
        action: &'static str,
    },

    // === Concurrency ===
    #[error("Lock not acquired: {0}; retry the request")]
    ConcurrencyTimeout(String),

    // === Not Found ===
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    #[error("Entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Validation(_) => ErrorKind::Validation,
            SettlementError::BalanceMismatch { .. } => ErrorKind::Integrity,
            SettlementError::SessionNotClosed(_)
            | SettlementError::SessionAlreadyClosed(_)
            | SettlementError::SettlementFrozen(_)
            | SettlementError::ParticipantSessionMismatch { .. }
            | SettlementError::ParticipantExists { .. }
            | SettlementError::InvalidStateTransition(_) => ErrorKind::State,
            SettlementError::Forbidden { .. } => ErrorKind::Forbidden,
            SettlementError::ConcurrencyTimeout(_) => ErrorKind::ConcurrencyTimeout,
            SettlementError::SessionNotFound(_)
            | SettlementError::ParticipantNotFound(_)
            | SettlementError::EntryNotFound(_)
            | SettlementError::TransferNotFound(_) => ErrorKind::NotFound,
            SettlementError::DatabaseError(_) => ErrorKind::Internal,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::Validation(_) => "VALIDATION_ERROR",
            SettlementError::BalanceMismatch { .. } => "BALANCE_MISMATCH",
            SettlementError::SessionNotClosed(_) => "SESSION_NOT_CLOSED",
            SettlementError::SessionAlreadyClosed(_) => "SESSION_ALREADY_CLOSED",
            SettlementError::SettlementFrozen(_) => "SETTLEMENT_FROZEN",
            SettlementError::ParticipantSessionMismatch { .. } => "PARTICIPANT_SESSION_MISMATCH",
            SettlementError::ParticipantExists { .. } => "PARTICIPANT_EXISTS",
            SettlementError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            SettlementError::Forbidden { .. } => "FORBIDDEN",
            SettlementError::ConcurrencyTimeout(_) => "CONCURRENCY_TIMEOUT",
            SettlementError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            SettlementError::ParticipantNotFound(_) => "PARTICIPANT_NOT_FOUND",
            SettlementError::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            SettlementError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            SettlementError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::State => 409,
            ErrorKind::Integrity => 422,
            ErrorKind::Internal => 500,
            ErrorKind::ConcurrencyTimeout => 503,
        }
    }

    /// Retrying the same request may succeed without changing the input
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ConcurrencyTimeout
    }
}

/// SQLSTATE raised when `lock_timeout` expires
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e
            && db.code().as_deref() == Some(PG_LOCK_NOT_AVAILABLE)
        {
            return SettlementError::ConcurrencyTimeout(db.message().to_string());
        }
        SettlementError::DatabaseError(e.to_string())
    }
}
