//! End-to-end settlement flows against the in-memory store

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::config::SettlementConfig;
use crate::settlement::audit::{AuditOp, AuditTable};
use crate::settlement::error::SettlementError;
use crate::settlement::service::SettlementService;
use crate::settlement::state::PayState;
use crate::settlement::store::{LedgerStore, LedgerTx, MemoryStore};
use crate::settlement::types::{EntryKind, EntryPatch, NewEntry, Participant, Session, TransferId};
use crate::settlement::validation::ValidationError;

const HOST: i64 = 100;
const ALICE: i64 = 1;
const BOB: i64 = 2;
const CAROL: i64 = 3;
const OUTSIDER: i64 = 999;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

struct Table {
    store: MemoryStore,
    svc: Arc<SettlementService>,
    session: Session,
    a: Participant,
    b: Participant,
    c: Participant,
}

impl Table {
    async fn new() -> Self {
        let store = MemoryStore::new(Duration::from_millis(200));
        let svc = Arc::new(SettlementService::new(
            Arc::new(store.clone()),
            SettlementConfig::default(),
        ));
        let session = svc.open_session(HOST, "Friday game").await.unwrap();
        let a = svc
            .add_participant(session.id, ALICE, "Alice", HOST)
            .await
            .unwrap();
        let b = svc
            .add_participant(session.id, BOB, "Bob", BOB)
            .await
            .unwrap();
        let c = svc
            .add_participant(session.id, CAROL, "Carol", HOST)
            .await
            .unwrap();
        Self {
            store,
            svc,
            session,
            a,
            b,
            c,
        }
    }

    async fn entry(&self, p: &Participant, kind: EntryKind, amount: &str) {
        self.svc
            .record_entry(self.session.id, p.id, kind, dec(amount), HOST)
            .await
            .unwrap();
    }

    /// A(d100,c0) B(d100,c50) C(d0,c150)
    async fn scenario_one(&self) {
        self.entry(&self.a, EntryKind::Debit, "100").await;
        self.entry(&self.b, EntryKind::Debit, "100").await;
        self.entry(&self.b, EntryKind::Credit, "50").await;
        self.entry(&self.c, EntryKind::Credit, "150").await;
    }

    async fn close(&self) {
        self.svc.close_session(self.session.id, HOST).await.unwrap();
    }
}

#[tokio::test]
async fn test_scenario_two_debtors_one_creditor() {
    let t = Table::new().await;
    t.scenario_one().await;
    t.close().await;

    let transfers = t.svc.calculate_settlement(t.session.id, HOST).await.unwrap();
    assert_eq!(transfers.len(), 2);

    assert_eq!(transfers[0].seq, 0);
    assert_eq!((transfers[0].payer_id, transfers[0].payee_id), (t.a.id, t.c.id));
    assert_eq!(transfers[0].amount, dec("100.00"));
    assert_eq!(transfers[1].seq, 1);
    assert_eq!((transfers[1].payer_id, transfers[1].payee_id), (t.b.id, t.c.id));
    assert_eq!(transfers[1].amount, dec("50.00"));

    for tr in &transfers {
        assert_eq!(tr.pay_state, PayState::Pending);
        assert_eq!(tr.amount.scale(), 2);
        assert_ne!(tr.payer_id, tr.payee_id);
    }

    let view = t.svc.get_settlement(t.session.id).await.unwrap();
    assert!(view.computed);
    assert_eq!(view.transfers, transfers);
}

#[tokio::test]
async fn test_scenario_mismatch_writes_nothing() {
    let t = Table::new().await;
    t.entry(&t.a, EntryKind::Debit, "300.00").await;
    t.entry(&t.b, EntryKind::Credit, "290.00").await;
    t.close().await;

    let report = t.svc.validate_session_balance(t.session.id).await.unwrap();
    assert!(!report.ok);
    assert_eq!(report.difference, dec("-10.00"));

    let err = t
        .svc
        .calculate_settlement(t.session.id, HOST)
        .await
        .unwrap_err();
    match err {
        SettlementError::BalanceMismatch {
            total_credit,
            total_debit,
            ..
        } => {
            assert_eq!(total_credit, dec("290.00"));
            assert_eq!(total_debit, dec("300.00"));
        }
        other => panic!("expected BalanceMismatch, got {:?}", other),
    }

    let view = t.svc.get_settlement(t.session.id).await.unwrap();
    assert!(!view.computed);
    assert!(view.transfers.is_empty());

    // Closed but unsettled: the ledger can still be reconciled
    t.entry(&t.c, EntryKind::Credit, "10.00").await;
    let transfers = t.svc.calculate_settlement(t.session.id, HOST).await.unwrap();
    assert_eq!(transfers.len(), 2);
    assert_eq!(transfers[0].amount, dec("290.00"));
}

#[tokio::test]
async fn test_scenario_recompute_returns_same_set() {
    let t = Table::new().await;
    t.scenario_one().await;
    t.close().await;

    let first = t.svc.calculate_settlement(t.session.id, HOST).await.unwrap();
    let second = t.svc.calculate_settlement(t.session.id, ALICE).await.unwrap();
    assert_eq!(first, second);

    let history = t
        .svc
        .get_audit_history(AuditTable::Transfers, &first[0].id.to_string())
        .await
        .unwrap();
    assert_eq!(history.len(), 1, "second call must not write");
}

#[tokio::test]
async fn test_scenario_paid_then_reverted() {
    let t = Table::new().await;
    t.scenario_one().await;
    t.close().await;
    let transfers = t.svc.calculate_settlement(t.session.id, HOST).await.unwrap();
    let id = transfers[0].id;

    let paid = t
        .svc
        .mark_transfer_paid(id, Some(" venmo "), ALICE)
        .await
        .unwrap();
    assert_eq!(paid.pay_state, PayState::Paid);
    assert_eq!(paid.payment_method.as_deref(), Some("venmo"));
    assert!(paid.paid_at.is_some());

    let reverted = t.svc.revert_transfer(id, HOST).await.unwrap();
    assert_eq!(reverted.id, id);
    assert_eq!(reverted.pay_state, PayState::Pending);
    assert_eq!(reverted.payment_method, None);
    assert_eq!(reverted.paid_at, None);

    let history = t
        .svc
        .get_audit_history(AuditTable::Transfers, &id.to_string())
        .await
        .unwrap();
    let ops: Vec<_> = history.iter().map(|r| r.operation).collect();
    assert_eq!(ops, vec![AuditOp::Insert, AuditOp::Update, AuditOp::Update]);
    assert_eq!(history[1].old_state.as_deref(), Some("PENDING"));
    assert_eq!(history[1].new_state.as_deref(), Some("PAID"));
    assert_eq!(history[1].actor_id, ALICE);
    assert_eq!(history[2].old_state.as_deref(), Some("PAID"));
    assert_eq!(history[2].new_state.as_deref(), Some("PENDING"));
    assert_eq!(history[2].actor_id, HOST);

    // Still exactly two transfers in the ledger
    let view = t.svc.get_settlement(t.session.id).await.unwrap();
    assert_eq!(view.transfers.len(), 2);
}

#[tokio::test]
async fn test_pay_state_transitions_are_guarded() {
    let t = Table::new().await;
    t.scenario_one().await;
    t.close().await;
    let transfers = t.svc.calculate_settlement(t.session.id, HOST).await.unwrap();
    let a_to_c = transfers[0].id;

    assert!(matches!(
        t.svc.revert_transfer(a_to_c, HOST).await,
        Err(SettlementError::InvalidStateTransition(_))
    ));

    // Bob is neither payer nor payee of A -> C
    assert!(matches!(
        t.svc.mark_transfer_paid(a_to_c, None, BOB).await,
        Err(SettlementError::Forbidden { actor_id: BOB, .. })
    ));
    assert!(matches!(
        t.svc.mark_transfer_paid(a_to_c, None, OUTSIDER).await,
        Err(SettlementError::Forbidden { .. })
    ));

    // Payee may confirm receipt
    t.svc.mark_transfer_paid(a_to_c, None, CAROL).await.unwrap();
    assert!(matches!(
        t.svc.mark_transfer_paid(a_to_c, None, CAROL).await,
        Err(SettlementError::InvalidStateTransition(_))
    ));

    assert!(matches!(
        t.svc.mark_transfer_paid(a_to_c, Some("zelle!"), CAROL).await,
        Err(SettlementError::Validation(
            ValidationError::InvalidPaymentMethod { .. }
        ))
    ));
    assert!(matches!(
        t.svc.mark_transfer_paid(TransferId::new(), None, HOST).await,
        Err(SettlementError::TransferNotFound(_))
    ));
}

#[tokio::test]
async fn test_settlement_requires_closed_session() {
    let t = Table::new().await;
    t.scenario_one().await;

    assert!(matches!(
        t.svc.calculate_settlement(t.session.id, HOST).await,
        Err(SettlementError::SessionNotClosed(_))
    ));
    assert!(matches!(
        t.svc.calculate_settlement(404, HOST).await,
        Err(SettlementError::SessionNotFound(404))
    ));
    assert!(matches!(
        t.svc.get_settlement(404).await,
        Err(SettlementError::SessionNotFound(404))
    ));
}

#[tokio::test]
async fn test_entries_frozen_after_settlement() {
    let t = Table::new().await;
    t.scenario_one().await;
    t.close().await;
    t.svc.calculate_settlement(t.session.id, HOST).await.unwrap();

    let entries = t.svc.list_entries(t.session.id).await.unwrap();
    assert_eq!(entries.len(), 4);

    assert!(matches!(
        t.svc
            .record_entry(t.session.id, t.a.id, EntryKind::Debit, dec("5"), HOST)
            .await,
        Err(SettlementError::SettlementFrozen(_))
    ));
    assert!(matches!(
        t.svc
            .update_entry(
                entries[0].id,
                EntryPatch {
                    amount: Some(dec("1")),
                    ..Default::default()
                },
                HOST
            )
            .await,
        Err(SettlementError::SettlementFrozen(_))
    ));
    assert!(matches!(
        t.svc.delete_entry(entries[0].id, HOST).await,
        Err(SettlementError::SettlementFrozen(_))
    ));
}

#[tokio::test]
async fn test_zero_transfer_settlement_is_computed() {
    let t = Table::new().await;
    t.entry(&t.a, EntryKind::Debit, "50").await;
    t.entry(&t.a, EntryKind::Credit, "50").await;
    t.close().await;

    assert!(!t.svc.get_settlement(t.session.id).await.unwrap().computed);
    let transfers = t.svc.calculate_settlement(t.session.id, HOST).await.unwrap();
    assert!(transfers.is_empty());

    let view = t.svc.get_settlement(t.session.id).await.unwrap();
    assert!(view.computed);
    assert!(matches!(
        t.svc
            .record_entry(t.session.id, t.b.id, EntryKind::Debit, dec("5"), HOST)
            .await,
        Err(SettlementError::SettlementFrozen(_))
    ));
}

#[tokio::test]
async fn test_large_debt_settles_above_transfer_limit() {
    let t = Table::new().await;
    // Two entries per side, each within the entry limit
    t.entry(&t.a, EntryKind::Debit, "6000.00").await;
    t.entry(&t.a, EntryKind::Debit, "3000.00").await;
    t.entry(&t.c, EntryKind::Credit, "9000.00").await;
    t.close().await;

    let transfers = t.svc.calculate_settlement(t.session.id, HOST).await.unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].payer_id, t.a.id);
    assert_eq!(transfers[0].payee_id, t.c.id);
    assert_eq!(transfers[0].amount, dec("9000.00"));
    assert!(t.svc.get_settlement(t.session.id).await.unwrap().computed);
}

#[tokio::test]
async fn test_entry_validation_rejects_before_persistence() {
    let t = Table::new().await;
    for bad in ["10000.01", "0.001", "0", "-5"] {
        let err = t
            .svc
            .record_entry(t.session.id, t.a.id, EntryKind::Debit, dec(bad), HOST)
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)), "{}", bad);
    }
    assert!(t.svc.list_entries(t.session.id).await.unwrap().is_empty());

    assert!(matches!(
        t.svc.update_entry(1, EntryPatch::default(), HOST).await,
        Err(SettlementError::Validation(ValidationError::EmptyUpdate))
    ));
}

#[tokio::test]
async fn test_accumulators_follow_entry_writes() {
    let t = Table::new().await;
    let entry = t
        .svc
        .record_entry(t.session.id, t.a.id, EntryKind::Debit, dec("40"), ALICE)
        .await
        .unwrap();
    t.entry(&t.a, EntryKind::Debit, "60").await;

    let roster = t.svc.list_participants(t.session.id).await.unwrap();
    let a = roster.iter().find(|p| p.id == t.a.id).unwrap();
    assert_eq!(a.total_debit, dec("100.00"));

    // Reassign the 40.00 buy-in from Alice to Bob and make it a cash-out
    let moved = t
        .svc
        .update_entry(
            entry.id,
            EntryPatch {
                participant_id: Some(t.b.id),
                kind: Some(EntryKind::Credit),
                amount: None,
            },
            HOST,
        )
        .await
        .unwrap();
    assert_eq!(moved.participant_id, t.b.id);
    assert_eq!(moved.amount, dec("40.00"));

    let roster = t.svc.list_participants(t.session.id).await.unwrap();
    let a = roster.iter().find(|p| p.id == t.a.id).unwrap();
    let b = roster.iter().find(|p| p.id == t.b.id).unwrap();
    assert_eq!(a.total_debit, dec("60.00"));
    assert_eq!(b.total_credit, dec("40.00"));
    assert_eq!(b.total_debit, dec("0.00"));

    let entry_history = t
        .svc
        .get_audit_history(AuditTable::Entries, &entry.id.to_string())
        .await
        .unwrap();
    assert_eq!(entry_history.len(), 2);
    assert_eq!(
        entry_history[1].field.as_deref(),
        Some(format!("participant {} -> {}", t.a.id, t.b.id).as_str())
    );

    let a_history = t
        .svc
        .get_audit_history(AuditTable::Participants, &t.a.id.to_string())
        .await
        .unwrap();
    let debits: Vec<_> = a_history
        .iter()
        .map(|r| (r.old_amount.unwrap(), r.new_amount.unwrap()))
        .collect();
    assert_eq!(
        debits,
        vec![
            (dec("0"), dec("40")),
            (dec("40"), dec("100")),
            (dec("100"), dec("60")),
        ]
    );

    t.svc.delete_entry(moved.id, BOB).await.unwrap();
    let roster = t.svc.list_participants(t.session.id).await.unwrap();
    let b = roster.iter().find(|p| p.id == t.b.id).unwrap();
    assert_eq!(b.total_credit, Decimal::ZERO);
    assert!(matches!(
        t.svc.delete_entry(moved.id, HOST).await,
        Err(SettlementError::EntryNotFound(_))
    ));
}

#[tokio::test]
async fn test_roster_and_entry_authorization() {
    let t = Table::new().await;

    assert!(matches!(
        t.svc
            .record_entry(t.session.id, t.a.id, EntryKind::Debit, dec("10"), BOB)
            .await,
        Err(SettlementError::Forbidden { actor_id: BOB, .. })
    ));
    assert!(matches!(
        t.svc.add_participant(t.session.id, ALICE, "Alice again", HOST).await,
        Err(SettlementError::ParticipantExists { user_id: ALICE, .. })
    ));
    assert!(matches!(
        t.svc.add_participant(t.session.id, 7, "Dave", OUTSIDER).await,
        Err(SettlementError::Forbidden { .. })
    ));
    assert!(matches!(
        t.svc.close_session(t.session.id, ALICE).await,
        Err(SettlementError::Forbidden { .. })
    ));

    t.close().await;
    assert!(matches!(
        t.svc.close_session(t.session.id, HOST).await,
        Err(SettlementError::SessionAlreadyClosed(_))
    ));
    assert!(matches!(
        t.svc.add_participant(t.session.id, 7, "Dave", 7).await,
        Err(SettlementError::SessionAlreadyClosed(_))
    ));

    assert!(matches!(
        t.svc
            .record_entry(t.session.id, 404, EntryKind::Debit, dec("1"), HOST)
            .await,
        Err(SettlementError::ParticipantNotFound(_))
    ));
    let second = t.svc.open_session(HOST, "Saturday").await.unwrap();
    assert!(matches!(
        t.svc
            .record_entry(second.id, t.a.id, EntryKind::Debit, dec("1"), HOST)
            .await,
        Err(SettlementError::ParticipantSessionMismatch { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_settlers_produce_one_set() {
    let t = Table::new().await;
    t.scenario_one().await;
    t.close().await;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let svc = Arc::clone(&t.svc);
            let session_id = t.session.id;
            tokio::spawn(async move { svc.calculate_settlement(session_id, HOST + i).await })
        })
        .collect();
    let results = futures::future::join_all(handles).await;

    let sets: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();
    assert!(sets.iter().all(|s| *s == sets[0]));
    assert_eq!(sets[0].len(), 2);

    let view = t.svc.get_settlement(t.session.id).await.unwrap();
    assert_eq!(view.transfers, sets[0]);
}

#[tokio::test]
async fn test_lock_contention_is_per_session() {
    let t = Table::new().await;
    t.scenario_one().await;
    t.close().await;

    let other = {
        let s = t.svc.open_session(HOST, "other table").await.unwrap();
        let p = t.svc.add_participant(s.id, ALICE, "Alice", HOST).await.unwrap();
        let q = t.svc.add_participant(s.id, BOB, "Bob", HOST).await.unwrap();
        t.svc
            .record_entry(s.id, p.id, EntryKind::Debit, dec("20"), HOST)
            .await
            .unwrap();
        t.svc
            .record_entry(s.id, q.id, EntryKind::Credit, dec("20"), HOST)
            .await
            .unwrap();
        t.svc.close_session(s.id, HOST).await.unwrap();
        s
    };

    let mut holder = t.store.begin().await.unwrap();
    holder.lock_session(t.session.id).await.unwrap();

    // Unrelated session proceeds while the first is held
    let transfers = t.svc.calculate_settlement(other.id, HOST).await.unwrap();
    assert_eq!(transfers.len(), 1);

    let err = t
        .svc
        .calculate_settlement(t.session.id, HOST)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::ConcurrencyTimeout(_)));
    assert!(err.is_retryable());

    drop(holder);
    assert_eq!(
        t.svc
            .calculate_settlement(t.session.id, HOST)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_cancelled_unit_of_work_leaves_no_trace() {
    let t = Table::new().await;
    t.scenario_one().await;
    t.close().await;

    let mut holder = t.store.begin().await.unwrap();
    holder.lock_session(t.session.id).await.unwrap();

    // Caller gives up while the settler waits for the lock
    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        t.svc.calculate_settlement(t.session.id, HOST),
    )
    .await;
    assert!(cancelled.is_err());

    // A unit of work dropped after writing
    holder
        .insert_entry(&NewEntry {
            session_id: t.session.id,
            participant_id: t.a.id,
            kind: EntryKind::Debit,
            amount: dec("999.00"),
        })
        .await
        .unwrap();
    drop(holder);

    assert!(!t.svc.get_settlement(t.session.id).await.unwrap().computed);
    assert_eq!(t.svc.list_entries(t.session.id).await.unwrap().len(), 4);
    assert_eq!(
        t.svc
            .calculate_settlement(t.session.id, HOST)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_per_participant_conservation() {
    let t = Table::new().await;
    t.entry(&t.a, EntryKind::Debit, "37.25").await;
    t.entry(&t.b, EntryKind::Debit, "112.75").await;
    t.entry(&t.b, EntryKind::Credit, "12.00").await;
    t.entry(&t.c, EntryKind::Credit, "138.00").await;
    t.close().await;

    let transfers = t.svc.calculate_settlement(t.session.id, HOST).await.unwrap();
    let roster = t.svc.list_participants(t.session.id).await.unwrap();
    assert!(transfers.len() < roster.len());

    for p in &roster {
        let paid: Decimal = transfers
            .iter()
            .filter(|tr| tr.payer_id == p.id)
            .map(|tr| tr.amount)
            .sum();
        let received: Decimal = transfers
            .iter()
            .filter(|tr| tr.payee_id == p.id)
            .map(|tr| tr.amount)
            .sum();
        assert_eq!(paid, (-p.net_position()).max(Decimal::ZERO));
        assert_eq!(received, p.net_position().max(Decimal::ZERO));
    }
}
