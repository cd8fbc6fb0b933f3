//! Core types used throughout the system
//!
//! Plain integer identifiers match the `BIGSERIAL` keys of the backing tables.
//! They are `i64` so they bind to PostgreSQL without casts.

/// User ID - identity supplied by the (external) membership collaborator.
///
/// # Usage:
/// - Acting identity recorded on every audit record
/// - Session host and participant owner
pub type UserId = i64;

/// Session ID - one card-game session
pub type SessionId = i64;

/// Participant ID - one member's seat in one session
pub type ParticipantId = i64;

/// Entry ID - one buy-in or cash-out record
pub type EntryId = i64;

/// Audit record ID - monotonically increasing, never reused
pub type AuditId = i64;
