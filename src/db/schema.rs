//! Settlement ledger DDL
//!
//! Idempotent: every statement uses `IF NOT EXISTS` / `CREATE OR REPLACE`.

/// (name, statement) in apply order
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("sessions_tb", CREATE_SESSIONS_TABLE),
    ("participants_tb", CREATE_PARTICIPANTS_TABLE),
    ("entries_tb", CREATE_ENTRIES_TABLE),
    ("settlement_transfers_tb", CREATE_TRANSFERS_TABLE),
    ("audit_log_tb", CREATE_AUDIT_TABLE),
    ("append_only_rules", CREATE_APPEND_ONLY_RULES),
];

/// state: 1 = OPEN, 2 = CLOSED
pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions_tb (
    session_id  BIGSERIAL PRIMARY KEY,
    host_id     BIGINT NOT NULL,
    name        VARCHAR(64) NOT NULL,
    state       SMALLINT NOT NULL DEFAULT 1,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    closed_at   TIMESTAMPTZ,
    settled_at  TIMESTAMPTZ
);
"#;

pub const CREATE_PARTICIPANTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS participants_tb (
    participant_id  BIGSERIAL PRIMARY KEY,
    session_id      BIGINT NOT NULL REFERENCES sessions_tb(session_id),
    user_id         BIGINT NOT NULL,
    display_name    VARCHAR(64) NOT NULL,
    total_credit    NUMERIC(14, 2) NOT NULL DEFAULT 0 CHECK (total_credit >= 0),
    total_debit     NUMERIC(14, 2) NOT NULL DEFAULT 0 CHECK (total_debit >= 0),
    UNIQUE (session_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_participants_session ON participants_tb(session_id);
"#;

/// kind: 1 = DEBIT (buy-in), 2 = CREDIT (cash-out)
pub const CREATE_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entries_tb (
    entry_id        BIGSERIAL PRIMARY KEY,
    session_id      BIGINT NOT NULL REFERENCES sessions_tb(session_id),
    participant_id  BIGINT NOT NULL REFERENCES participants_tb(participant_id),
    kind            SMALLINT NOT NULL CHECK (kind IN (1, 2)),
    amount          NUMERIC(12, 2) NOT NULL CHECK (amount > 0),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_entries_session ON entries_tb(session_id);
CREATE INDEX IF NOT EXISTS idx_entries_participant ON entries_tb(participant_id);
"#;

/// pay_state: 0 = PENDING, 10 = PAID
pub const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS settlement_transfers_tb (
    transfer_id     VARCHAR(26) PRIMARY KEY,
    session_id      BIGINT NOT NULL REFERENCES sessions_tb(session_id),
    seq             INTEGER NOT NULL,
    payer_id        BIGINT NOT NULL REFERENCES participants_tb(participant_id),
    payee_id        BIGINT NOT NULL REFERENCES participants_tb(participant_id),
    amount          NUMERIC(12, 2) NOT NULL CHECK (amount > 0),
    pay_state       SMALLINT NOT NULL DEFAULT 0,
    payment_method  VARCHAR(32),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    paid_at         TIMESTAMPTZ,
    CHECK (payer_id <> payee_id),
    UNIQUE (session_id, seq)
);
"#;

pub const CREATE_AUDIT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS audit_log_tb (
    audit_id    BIGSERIAL PRIMARY KEY,
    table_name  VARCHAR(16) NOT NULL,
    record_id   VARCHAR(32) NOT NULL,
    operation   VARCHAR(8) NOT NULL,
    actor_id    BIGINT NOT NULL,
    field       VARCHAR(64),
    old_amount  NUMERIC(14, 2),
    new_amount  NUMERIC(14, 2),
    old_state   VARCHAR(16),
    new_state   VARCHAR(16),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_audit_record ON audit_log_tb(table_name, record_id, audit_id);
"#;

/// Transfers are never deleted; audit rows are never changed
pub const CREATE_APPEND_ONLY_RULES: &str = r#"
CREATE OR REPLACE RULE settlement_transfers_no_delete AS
    ON DELETE TO settlement_transfers_tb DO INSTEAD NOTHING;
CREATE OR REPLACE RULE audit_log_no_update AS
    ON UPDATE TO audit_log_tb DO INSTEAD NOTHING;
CREATE OR REPLACE RULE audit_log_no_delete AS
    ON DELETE TO audit_log_tb DO INSTEAD NOTHING;
"#;
