//! Debt-Netting Calculator
//!
//! Greedy minimum-transfer matching over signed net positions:
//!
//! ```text
//! debtors   (most negative first)   A:-100  B:-50
//! creditors (most positive first)   C:+150
//!
//! A -> C 100.00   (A settled, C:+50)
//! B -> C  50.00   (B settled, C settled)
//! ```
//!
//! Produces at most `n - 1` transfers for `n` non-zero positions. Ordering is
//! fully deterministic (ties broken by participant id) so repeated runs over
//! unchanged balances emit identical plans.

use rust_decimal::Decimal;

use crate::money;

use super::types::ParticipantId;

/// One participant's signed balance going into the calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetPosition {
    pub participant_id: ParticipantId,
    pub net: Decimal,
}

impl NetPosition {
    pub fn new(participant_id: ParticipantId, net: Decimal) -> Self {
        Self {
            participant_id,
            net,
        }
    }
}

/// Transfer plan row, not yet persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub payer_id: ParticipantId,
    pub payee_id: ParticipantId,
    pub amount: Decimal,
}

/// Sort-and-two-pointer debt netting
#[derive(Debug, Clone, Copy)]
pub struct DebtNetting {
    tolerance: Decimal,
}

impl DebtNetting {
    pub fn new(tolerance: Decimal) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    /// Compute the transfer plan
    ///
    /// The caller has already verified the positions sum to zero within
    /// tolerance. Positions within tolerance of zero take no part.
    pub fn compute(&self, positions: &[NetPosition]) -> Vec<PlannedTransfer> {
        let mut debtors: Vec<(ParticipantId, Decimal)> = positions
            .iter()
            .filter(|p| p.net < -self.tolerance)
            .map(|p| (p.participant_id, money::round2(-p.net)))
            .collect();
        let mut creditors: Vec<(ParticipantId, Decimal)> = positions
            .iter()
            .filter(|p| p.net > self.tolerance)
            .map(|p| (p.participant_id, money::round2(p.net)))
            .collect();

        // Largest outstanding amount first on both sides
        debtors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        creditors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut plan = Vec::with_capacity(debtors.len() + creditors.len());
        let (mut d, mut c) = (0usize, 0usize);

        // Balances are exact cents, so a side is settled only at exactly zero
        while d < debtors.len() && c < creditors.len() {
            let (payer_id, owed) = debtors[d];
            let (payee_id, due) = creditors[c];

            let amount = owed.min(due);
            plan.push(PlannedTransfer {
                payer_id,
                payee_id,
                amount: money::round2(amount),
            });

            debtors[d].1 = owed - amount;
            creditors[c].1 = due - amount;

            if debtors[d].1.is_zero() {
                d += 1;
            }
            if creditors[c].1.is_zero() {
                c += 1;
            }
        }

        // Whatever one side still holds once the other is exhausted is the
        // rounding residual; it is dropped rather than paid
        let residual: Decimal = debtors[d..]
            .iter()
            .chain(&creditors[c..])
            .map(|(_, left)| *left)
            .sum();
        if !residual.is_zero() {
            tracing::debug!(
                residual = %residual,
                within_tolerance = residual <= self.tolerance,
                "Debt netting dropped unmatched residual"
            );
        }

        plan
    }
}
