//! PostgreSQL ledger store
//!
//! Each unit of work is one database transaction. `SET LOCAL lock_timeout`
//! bounds every row-lock wait; an expired wait surfaces as SQLSTATE 55P03 and
//! maps to `ConcurrencyTimeout`.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{LedgerStore, LedgerTx};
use crate::settlement::audit::{AuditOp, AuditRecord, AuditTable, NewAuditRecord};
use crate::settlement::error::SettlementError;
use crate::settlement::state::{PayState, SessionState};
use crate::settlement::types::{
    Entry, EntryId, EntryKind, NewEntry, Participant, ParticipantId, Session, SessionId,
    Transfer, TransferId, UserId,
};

const SESSION_COLUMNS: &str = "session_id, host_id, name, state, created_at, closed_at, settled_at";
const PARTICIPANT_COLUMNS: &str =
    "participant_id, session_id, user_id, display_name, total_credit, total_debit";
const ENTRY_COLUMNS: &str =
    "entry_id, session_id, participant_id, kind, amount, created_at, updated_at";
const TRANSFER_COLUMNS: &str = "transfer_id, session_id, seq, payer_id, payee_id, amount, \
     pay_state, payment_method, created_at, paid_at";
const AUDIT_COLUMNS: &str = "audit_id, table_name, record_id, operation, actor_id, field, \
     old_amount, new_amount, old_state, new_state, created_at";

/// Store backed by a PostgreSQL pool
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, SettlementError> {
        let mut tx = self.pool.begin().await?;
        // SET does not accept bind parameters
        let sql = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&sql).execute(&mut *tx).await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn health_check(&self) -> Result<(), SettlementError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

fn corrupt(what: &str, value: impl std::fmt::Display) -> SettlementError {
    SettlementError::DatabaseError(format!("Invalid {}: {}", what, value))
}

fn row_to_session(row: &PgRow) -> Result<Session, SettlementError> {
    let state_id: i16 = row.try_get("state")?;
    Ok(Session {
        id: row.try_get("session_id")?,
        host_id: row.try_get("host_id")?,
        name: row.try_get("name")?,
        state: SessionState::from_id(state_id).ok_or_else(|| corrupt("session state", state_id))?,
        created_at: row.try_get("created_at")?,
        closed_at: row.try_get("closed_at")?,
        settled_at: row.try_get("settled_at")?,
    })
}

fn row_to_participant(row: &PgRow) -> Result<Participant, SettlementError> {
    Ok(Participant {
        id: row.try_get("participant_id")?,
        session_id: row.try_get("session_id")?,
        user_id: row.try_get("user_id")?,
        display_name: row.try_get("display_name")?,
        total_credit: row.try_get("total_credit")?,
        total_debit: row.try_get("total_debit")?,
    })
}

fn row_to_entry(row: &PgRow) -> Result<Entry, SettlementError> {
    let kind_id: i16 = row.try_get("kind")?;
    Ok(Entry {
        id: row.try_get("entry_id")?,
        session_id: row.try_get("session_id")?,
        participant_id: row.try_get("participant_id")?,
        kind: EntryKind::from_id(kind_id).ok_or_else(|| corrupt("entry kind", kind_id))?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_transfer(row: &PgRow) -> Result<Transfer, SettlementError> {
    let id_str: String = row.try_get("transfer_id")?;
    let state_id: i16 = row.try_get("pay_state")?;
    Ok(Transfer {
        id: id_str.parse().map_err(|_| corrupt("transfer_id", &id_str))?,
        session_id: row.try_get("session_id")?,
        seq: row.try_get("seq")?,
        payer_id: row.try_get("payer_id")?,
        payee_id: row.try_get("payee_id")?,
        amount: row.try_get("amount")?,
        pay_state: PayState::from_id(state_id).ok_or_else(|| corrupt("pay_state", state_id))?,
        payment_method: row.try_get("payment_method")?,
        created_at: row.try_get("created_at")?,
        paid_at: row.try_get("paid_at")?,
    })
}

fn row_to_audit(row: &PgRow) -> Result<AuditRecord, SettlementError> {
    let table: String = row.try_get("table_name")?;
    let operation: String = row.try_get("operation")?;
    Ok(AuditRecord {
        id: row.try_get("audit_id")?,
        table: table.parse().map_err(|_| corrupt("audit table", &table))?,
        record_id: row.try_get("record_id")?,
        operation: AuditOp::from_str_opt(&operation)
            .ok_or_else(|| corrupt("audit operation", &operation))?,
        actor_id: row.try_get("actor_id")?,
        field: row.try_get("field")?,
        old_amount: row.try_get("old_amount")?,
        new_amount: row.try_get("new_amount")?,
        old_state: row.try_get("old_state")?,
        new_state: row.try_get("new_state")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn insert_session(
        &mut self,
        host_id: UserId,
        name: &str,
    ) -> Result<Session, SettlementError> {
        let sql = format!(
            "INSERT INTO sessions_tb (host_id, name, state, created_at) \
             VALUES ($1, $2, $3, NOW()) RETURNING {}",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(host_id)
            .bind(name)
            .bind(SessionState::Open.id())
            .fetch_one(&mut *self.tx)
            .await?;
        row_to_session(&row)
    }

    async fn get_session(&mut self, id: SessionId) -> Result<Option<Session>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM sessions_tb WHERE session_id = $1",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn lock_session(&mut self, id: SessionId) -> Result<Option<Session>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM sessions_tb WHERE session_id = $1 FOR UPDATE",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn update_session(&mut self, session: &Session) -> Result<(), SettlementError> {
        let result = sqlx::query(
            "UPDATE sessions_tb SET state = $1, closed_at = $2, settled_at = $3 \
             WHERE session_id = $4",
        )
        .bind(session.state.id())
        .bind(session.closed_at)
        .bind(session.settled_at)
        .bind(session.id)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SettlementError::SessionNotFound(session.id));
        }
        Ok(())
    }

    async fn insert_participant(
        &mut self,
        session_id: SessionId,
        user_id: UserId,
        display_name: &str,
    ) -> Result<Participant, SettlementError> {
        let sql = format!(
            "INSERT INTO participants_tb (session_id, user_id, display_name) \
             VALUES ($1, $2, $3) RETURNING {}",
            PARTICIPANT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .bind(user_id)
            .bind(display_name)
            .fetch_one(&mut *self.tx)
            .await?;
        row_to_participant(&row)
    }

    async fn get_participant(
        &mut self,
        id: ParticipantId,
    ) -> Result<Option<Participant>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM participants_tb WHERE participant_id = $1",
            PARTICIPANT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_participant).transpose()
    }

    async fn lock_participant(
        &mut self,
        id: ParticipantId,
    ) -> Result<Option<Participant>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM participants_tb WHERE participant_id = $1 FOR UPDATE",
            PARTICIPANT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_participant).transpose()
    }

    async fn lock_participants(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Participant>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM participants_tb WHERE session_id = $1 \
             ORDER BY participant_id FOR UPDATE",
            PARTICIPANT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_participant).collect()
    }

    async fn list_participants(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Participant>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM participants_tb WHERE session_id = $1 ORDER BY participant_id",
            PARTICIPANT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_participant).collect()
    }

    async fn update_participant_totals(
        &mut self,
        id: ParticipantId,
        total_credit: Decimal,
        total_debit: Decimal,
    ) -> Result<(), SettlementError> {
        let result = sqlx::query(
            "UPDATE participants_tb SET total_credit = $1, total_debit = $2 \
             WHERE participant_id = $3",
        )
        .bind(total_credit)
        .bind(total_debit)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SettlementError::ParticipantNotFound(id));
        }
        Ok(())
    }

    async fn insert_entry(&mut self, entry: &NewEntry) -> Result<Entry, SettlementError> {
        let sql = format!(
            "INSERT INTO entries_tb (session_id, participant_id, kind, amount, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING {}",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(entry.session_id)
            .bind(entry.participant_id)
            .bind(entry.kind.id())
            .bind(entry.amount)
            .fetch_one(&mut *self.tx)
            .await?;
        row_to_entry(&row)
    }

    async fn lock_entry(&mut self, id: EntryId) -> Result<Option<Entry>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM entries_tb WHERE entry_id = $1 FOR UPDATE",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_entry).transpose()
    }

    async fn update_entry(&mut self, entry: &Entry) -> Result<Entry, SettlementError> {
        let sql = format!(
            "UPDATE entries_tb SET participant_id = $1, kind = $2, amount = $3, updated_at = NOW() \
             WHERE entry_id = $4 RETURNING {}",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(entry.participant_id)
            .bind(entry.kind.id())
            .bind(entry.amount)
            .bind(entry.id)
            .fetch_optional(&mut *self.tx)
            .await?;
        match row {
            Some(row) => row_to_entry(&row),
            None => Err(SettlementError::EntryNotFound(entry.id)),
        }
    }

    async fn delete_entry(&mut self, id: EntryId) -> Result<(), SettlementError> {
        let result = sqlx::query("DELETE FROM entries_tb WHERE entry_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SettlementError::EntryNotFound(id));
        }
        Ok(())
    }

    async fn list_entries(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Entry>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM entries_tb WHERE session_id = $1 ORDER BY entry_id",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn list_participant_entries(
        &mut self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Entry>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM entries_tb WHERE participant_id = $1 ORDER BY entry_id",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(participant_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn insert_transfers(&mut self, transfers: &[Transfer]) -> Result<(), SettlementError> {
        for t in transfers {
            sqlx::query(
                r#"
                INSERT INTO settlement_transfers_tb
                    (transfer_id, session_id, seq, payer_id, payee_id, amount,
                     pay_state, payment_method, created_at, paid_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(t.id.to_string())
            .bind(t.session_id)
            .bind(t.seq)
            .bind(t.payer_id)
            .bind(t.payee_id)
            .bind(t.amount)
            .bind(t.pay_state.id())
            .bind(&t.payment_method)
            .bind(t.created_at)
            .bind(t.paid_at)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn list_transfers(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Transfer>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM settlement_transfers_tb WHERE session_id = $1 ORDER BY seq",
            TRANSFER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_transfer).collect()
    }

    async fn lock_transfer(
        &mut self,
        id: TransferId,
    ) -> Result<Option<Transfer>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM settlement_transfers_tb WHERE transfer_id = $1 FOR UPDATE",
            TRANSFER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_transfer).transpose()
    }

    async fn update_transfer_payment(
        &mut self,
        transfer: &Transfer,
    ) -> Result<(), SettlementError> {
        let result = sqlx::query(
            "UPDATE settlement_transfers_tb SET pay_state = $1, payment_method = $2, paid_at = $3 \
             WHERE transfer_id = $4",
        )
        .bind(transfer.pay_state.id())
        .bind(&transfer.payment_method)
        .bind(transfer.paid_at)
        .bind(transfer.id.to_string())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SettlementError::TransferNotFound(transfer.id.to_string()));
        }
        Ok(())
    }

    async fn append_audit(
        &mut self,
        record: NewAuditRecord,
    ) -> Result<AuditRecord, SettlementError> {
        let sql = format!(
            "INSERT INTO audit_log_tb \
                (table_name, record_id, operation, actor_id, field, \
                 old_amount, new_amount, old_state, new_state, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW()) RETURNING {}",
            AUDIT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(record.table.as_str())
            .bind(&record.record_id)
            .bind(record.operation.as_str())
            .bind(record.actor_id)
            .bind(&record.field)
            .bind(record.old_amount)
            .bind(record.new_amount)
            .bind(&record.old_state)
            .bind(&record.new_state)
            .fetch_one(&mut *self.tx)
            .await?;
        row_to_audit(&row)
    }

    async fn audit_history(
        &mut self,
        table: AuditTable,
        record_id: &str,
    ) -> Result<Vec<AuditRecord>, SettlementError> {
        let sql = format!(
            "SELECT {} FROM audit_log_tb WHERE table_name = $1 AND record_id = $2 \
             ORDER BY audit_id",
            AUDIT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(table.as_str())
            .bind(record_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_audit).collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), SettlementError> {
        self.tx.commit().await?;
        Ok(())
    }
}
