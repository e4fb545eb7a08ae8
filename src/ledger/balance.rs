use tracing::debug;

use crate::decimal::Money;
use crate::events::{Event, EventStore};

use super::loan::Loan;

/// derives the outstanding balance from the ledger.
///
/// The balance is always recomputed from the full sum of collected
/// principal, never patched with a running delta.
pub struct BalanceReconciler;

impl BalanceReconciler {
    /// `max(0, principal - sum(principal collected))`
    pub fn compute(loan: &Loan) -> Money {
        loan.principal.saturating_sub(loan.principal_collected())
    }

    /// recompute and store on the loan, returns the new balance
    pub fn reconcile(loan: &mut Loan, events: &mut EventStore) -> Money {
        let old_balance = loan.balance;
        let new_balance = Self::compute(loan);
        loan.balance = new_balance;

        if old_balance != new_balance {
            events.emit(Event::BalanceReconciled {
                loan_id: loan.id,
                old_balance,
                new_balance,
            });
        }

        debug!(loan_id = %loan.id, old = %old_balance, new = %new_balance, "balance reconciled");

        new_balance
    }
}
