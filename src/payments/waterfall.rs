use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::Result;
use crate::events::{Event, EventStore};
use crate::ledger::{BalanceReconciler, Loan};
use crate::types::{AllocationBreakdown, Concept, InstallmentState};

use super::receipt::{InstallmentApplication, PaymentReceipt};
use super::PaymentRequest;

/// allocation stops once the money left is at or below this amount
pub const STOP_EPSILON: Decimal = dec!(0.005);

/// an installment short of its total due by at most this much counts as paid
pub const PAID_TOLERANCE: Decimal = dec!(0.05);

/// applies incoming money to a loan's installments.
///
/// Unpaid installments are visited oldest first. Within each installment the
/// money fills moratory interest, then current interest, then charges and
/// policy, then principal. Whatever is left once every open installment has
/// been visited is recorded on the receipt as unapplied and goes nowhere else.
pub struct PaymentAllocator;

impl PaymentAllocator {
    pub fn allocate(
        loan: &mut Loan,
        request: &PaymentRequest,
        created_at: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<PaymentReceipt> {
        request.validate()?;

        let balance_before = loan.balance;
        let mut available = request.amount;
        let mut first_touched: Option<(u32, Money)> = None;
        let mut breakdown = AllocationBreakdown::default();
        let mut applications = Vec::new();

        // strict fifo by sequence number, selected before anything mutates
        let mut order: Vec<usize> = loan.installments
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_open() && i.seq > 0)
            .map(|(index, _)| index)
            .collect();
        order.sort_by_key(|&index| loan.installments[index].seq);

        for index in order {
            if available.as_decimal() <= STOP_EPSILON {
                break;
            }

            let installment = &mut loan.installments[index];

            if first_touched.is_none() {
                first_touched = Some((installment.seq, installment.outstanding()));
            }

            let mut applied = AllocationBreakdown::default();
            for concept in Concept::WATERFALL {
                let taken = installment.collect(concept, available);
                if taken.is_positive() {
                    applied.add(concept, taken);
                    available -= taken;
                }
            }

            let applied_total = applied.total();
            installment.total_collected += applied_total;
            if applied_total.is_positive() {
                installment.paid_date = Some(request.effective_date);
            }

            let threshold = installment.total_due().as_decimal() - PAID_TOLERANCE;
            if installment.total_collected.as_decimal() >= threshold {
                if installment.advance_state(InstallmentState::Paid) {
                    events.emit(Event::InstallmentSettled {
                        loan_id: loan.id,
                        seq: installment.seq,
                        paid_date: request.effective_date,
                    });
                }
            } else if installment.total_collected.is_positive() {
                installment.advance_state(InstallmentState::Partial);
            }

            debug!(
                loan_id = %loan.id,
                seq = installment.seq,
                applied = %applied_total,
                state = ?installment.state,
                "installment allocated"
            );

            breakdown.merge(&applied);
            applications.push(InstallmentApplication {
                seq: installment.seq,
                breakdown: applied,
                state_after: installment.state,
            });
        }

        let balance_after = BalanceReconciler::reconcile(loan, events);

        if !loan.close_if_settled(created_at, events) {
            loan.refresh_delinquency(request.effective_date, created_at, events);
        }

        let receipt = PaymentReceipt {
            id: Uuid::new_v4(),
            loan_id: loan.id,
            installment_seq: first_touched.map(|(seq, _)| seq),
            cuota: first_touched.map(|(_, owed)| owed).unwrap_or(Money::ZERO),
            amount: request.amount,
            effective_date: request.effective_date,
            source: request.source.clone(),
            balance_before,
            balance_after,
            interest_collected_to_date: loan.interest_collected(),
            principal_collected_to_date: loan.principal_collected(),
            breakdown,
            applications,
            unapplied: available,
            created_at,
        };

        events.emit(Event::PaymentAllocated {
            loan_id: loan.id,
            receipt_id: receipt.id,
            amount: receipt.amount,
            source: receipt.source.clone(),
            applied_to_interest: breakdown.to_interest,
            applied_to_principal: breakdown.to_principal,
            timestamp: created_at,
        });

        if available.is_positive() {
            warn!(
                loan_id = %loan.id,
                receipt_id = %receipt.id,
                unapplied = %available,
                "payment exceeds open debt, remainder discarded"
            );
            events.emit(Event::OverpaymentDiscarded {
                loan_id: loan.id,
                receipt_id: receipt.id,
                unapplied: available,
                timestamp: created_at,
            });
        }

        info!(
            loan_id = %loan.id,
            receipt_id = %receipt.id,
            amount = %receipt.amount,
            source = %receipt.source,
            balance_before = %balance_before,
            balance_after = %balance_after,
            "payment allocated"
        );

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    use crate::config::LedgerConfig;
    use crate::decimal::Rate;
    use crate::ledger::NewLoan;
    use crate::types::LoanStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    fn reference_loan() -> Loan {
        let request = NewLoan::builder()
            .borrower("0912345678")
            .principal(Money::from_major(1_000_000))
            .term(12)
            .rate(Rate::from_percentage(dec!(24)))
            .build()
            .unwrap();

        Loan::originate(
            &request,
            "LN-000001".to_string(),
            date(2024, 1, 15),
            &LedgerConfig::default(),
            &mut EventStore::new(),
        ).unwrap()
    }

    fn pay(loan: &mut Loan, amount: Money) -> PaymentReceipt {
        let request = PaymentRequest::manual(amount, date(2024, 2, 10));
        PaymentAllocator::allocate(loan, &request, now(), &mut EventStore::new()).unwrap()
    }

    #[test]
    fn test_exact_installment_settles_first_only() {
        let mut loan = reference_loan();
        let receipt = pay(&mut loan, money("94559.60"));

        let first = loan.installment(1).unwrap();
        assert_eq!(first.state, InstallmentState::Paid);
        assert_eq!(first.interest_collected, money("20000.00"));
        assert_eq!(first.principal_collected, money("74559.60"));
        assert_eq!(first.paid_date, Some(date(2024, 2, 10)));

        let second = loan.installment(2).unwrap();
        assert_eq!(second.state, InstallmentState::Pending);
        assert_eq!(second.total_collected, Money::ZERO);

        assert_eq!(loan.balance, money("925440.40"));
        assert_eq!(receipt.balance_before, Money::from_major(1_000_000));
        assert_eq!(receipt.balance_after, money("925440.40"));
        assert_eq!(receipt.installment_seq, Some(1));
        assert_eq!(receipt.cuota, money("94559.60"));
        assert_eq!(receipt.unapplied, Money::ZERO);
    }

    #[test]
    fn test_double_installment_settles_two() {
        let mut loan = reference_loan();
        let receipt = pay(&mut loan, money("189119.20"));

        assert_eq!(loan.installment(1).unwrap().state, InstallmentState::Paid);
        assert_eq!(loan.installment(2).unwrap().state, InstallmentState::Paid);
        assert_eq!(loan.installment(3).unwrap().state, InstallmentState::Pending);

        // 1,000,000 - 74,559.60 - 76,050.79
        assert_eq!(loan.balance, money("849389.61"));
        assert_eq!(receipt.applications.len(), 2);
        assert_eq!(receipt.breakdown.to_interest, money("38508.81"));
        assert_eq!(receipt.principal_collected_to_date, money("150610.39"));
    }

    #[test]
    fn test_short_payment_only_fills_interest() {
        let mut loan = reference_loan();
        let receipt = pay(&mut loan, Money::from_major(5_000));

        let first = loan.installment(1).unwrap();
        assert_eq!(first.state, InstallmentState::Partial);
        assert_eq!(first.interest_collected, Money::from_major(5_000));
        assert_eq!(first.principal_collected, Money::ZERO);
        assert_eq!(loan.balance, Money::from_major(1_000_000));
        assert_eq!(receipt.balance_after, receipt.balance_before);
    }

    #[test]
    fn test_waterfall_order() {
        let mut loan = reference_loan();
        {
            let first = loan.installment_mut(1).unwrap();
            first.charges_due = Money::from_major(300);
            first.policy_due = Money::from_major(200);
        }
        loan.assess_moratory(1, Money::from_major(1_000), now(), &mut EventStore::new()).unwrap();

        // covers moratory and interest exactly
        let receipt = pay(&mut loan, Money::from_major(21_000));

        let first = loan.installment(1).unwrap();
        assert_eq!(first.moratory_collected, Money::from_major(1_000));
        assert_eq!(first.interest_collected, Money::from_major(20_000));
        assert_eq!(first.pending(Concept::Charges), Money::from_major(500));
        assert_eq!(first.pending(Concept::Principal), money("74559.60"));
        assert_eq!(first.state, InstallmentState::Partial);
        assert_eq!(receipt.breakdown.to_moratory, Money::from_major(1_000));
        assert_eq!(receipt.breakdown.to_charges, Money::ZERO);

        // next payment reaches charges before principal
        let receipt = pay(&mut loan, Money::from_major(600));
        assert_eq!(receipt.breakdown.to_charges, Money::from_major(500));
        assert_eq!(receipt.breakdown.to_principal, Money::from_major(100));
    }

    #[test]
    fn test_overpayment_is_discarded() {
        let mut loan = reference_loan();
        let owed = loan.total_outstanding();
        let mut events = EventStore::new();

        let request = PaymentRequest::manual(owed + Money::from_major(1_000), date(2024, 2, 10));
        let receipt = PaymentAllocator::allocate(&mut loan, &request, now(), &mut events).unwrap();

        assert_eq!(receipt.unapplied, Money::from_major(1_000));
        assert_eq!(receipt.applied(), owed);
        assert_eq!(loan.balance, Money::ZERO);
        assert_eq!(loan.status, LoanStatus::Closed);
        assert!(loan.all_paid());
        assert!(events.events().iter().any(|e| matches!(
            e,
            Event::OverpaymentDiscarded { unapplied, .. } if *unapplied == Money::from_major(1_000)
        )));
    }

    #[test]
    fn test_no_open_installments_returns_full_remainder() {
        let mut loan = reference_loan();
        let owed = loan.total_outstanding();
        pay(&mut loan, owed);
        assert_eq!(loan.status, LoanStatus::Closed);

        let receipt = pay(&mut loan, Money::from_major(100));
        assert_eq!(receipt.installment_seq, None);
        assert_eq!(receipt.cuota, Money::ZERO);
        assert_eq!(receipt.unapplied, Money::from_major(100));
        assert!(receipt.applications.is_empty());
        assert_eq!(receipt.balance_before, Money::ZERO);
        assert_eq!(receipt.balance_after, Money::ZERO);
    }

    #[test]
    fn test_paid_tolerance_boundary() {
        let mut loan = reference_loan();

        // four cents short is forgiven
        pay(&mut loan, money("94559.56"));
        let first = loan.installment(1).unwrap();
        assert_eq!(first.state, InstallmentState::Paid);
        assert_eq!(first.pending(Concept::Principal), money("0.04"));
        assert_eq!(loan.balance, money("925440.44"));

        // six cents short is not
        pay(&mut loan, money("94559.54"));
        assert_eq!(loan.installment(2).unwrap().state, InstallmentState::Partial);

        // the next payment finishes installment 2 before touching 3
        let receipt = pay(&mut loan, Money::from_major(1));
        assert_eq!(receipt.installment_seq, Some(2));
        assert_eq!(receipt.cuota, money("0.06"));
        assert_eq!(loan.installment(2).unwrap().state, InstallmentState::Paid);
        assert_eq!(loan.installment(3).unwrap().total_collected, money("0.94"));
    }

    #[test]
    fn test_invariants_hold_across_many_payments() {
        let mut loan = reference_loan();
        let amounts = ["0.01", "12345.67", "94559.60", "3.33", "150000", "70000.05", "1", "500000"];
        let mut previous_balance = loan.balance;
        let mut previous_states: Vec<InstallmentState> = loan.installments.iter().map(|i| i.state).collect();

        for amount in amounts {
            let receipt = pay(&mut loan, money(amount));

            assert!(receipt.balance_after <= receipt.balance_before);
            assert!(!loan.balance.is_negative());
            assert!(loan.balance <= previous_balance);
            assert_eq!(receipt.applied() + receipt.unapplied, receipt.amount);
            previous_balance = loan.balance;

            for (inst, previous) in loan.installments.iter().zip(previous_states.iter()) {
                for concept in Concept::WATERFALL {
                    assert!(inst.collected(concept) <= inst.due(concept));
                }
                assert!(inst.state >= *previous);
            }
            previous_states = loan.installments.iter().map(|i| i.state).collect();
        }
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let mut loan = reference_loan();
        let snapshot = loan.clone();
        let request = PaymentRequest::manual(Money::ZERO, date(2024, 2, 10));

        assert!(PaymentAllocator::allocate(&mut loan, &request, now(), &mut EventStore::new()).is_err());
        assert_eq!(loan, snapshot);
    }

    #[test]
    fn test_late_payment_flags_delinquency() {
        let mut loan = reference_loan();
        let request = PaymentRequest::manual(Money::from_major(10), date(2024, 4, 1));

        PaymentAllocator::allocate(&mut loan, &request, now(), &mut EventStore::new()).unwrap();
        assert_eq!(loan.status, LoanStatus::Delinquent);
        assert_eq!(loan.overdue_installments, 2);
    }
}
