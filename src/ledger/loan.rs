use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::schedule::{add_months, ScheduleGenerator, MAX_TERM};
use crate::types::{ChargePlan, InstallmentState, LoanId, LoanStatus};

use super::balance::BalanceReconciler;
use super::installment::Installment;

/// loan creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLoan {
    pub borrower_id: String,
    pub principal: Money,
    pub term: u32,
    /// nominal annual rate, the configured default applies when absent
    pub annual_rate: Option<Rate>,
    pub reference: Option<String>,
    pub operation_number: Option<String>,
    pub open_date: Option<NaiveDate>,
    /// defaults to one month after the open date
    pub first_due_date: Option<NaiveDate>,
    pub charges: ChargePlan,
}

impl NewLoan {
    pub fn builder() -> NewLoanBuilder {
        NewLoanBuilder::new()
    }

    /// field-level checks, run before anything is computed
    pub fn validate(&self) -> Result<()> {
        if self.borrower_id.trim().is_empty() {
            return Err(LedgerError::invalid_field("borrower_id", "is required"));
        }

        if !self.principal.is_positive() {
            return Err(LedgerError::invalid_field("principal", "must be greater than zero"));
        }

        if self.term == 0 {
            return Err(LedgerError::invalid_field("term", "must be at least one installment"));
        }

        if self.term > MAX_TERM {
            return Err(LedgerError::invalid_field(
                "term",
                format!("must be at most {} installments", MAX_TERM),
            ));
        }

        if self.annual_rate.map(|r| r.is_negative()).unwrap_or(false) {
            return Err(LedgerError::invalid_field("rate", "must not be negative"));
        }

        if self.charges.charges.is_negative() || self.charges.policy.is_negative() {
            return Err(LedgerError::invalid_field("charges", "must not be negative"));
        }

        if let (Some(open), Some(first)) = (self.open_date, self.first_due_date) {
            if first < open {
                return Err(LedgerError::invalid_field("first_due_date", "is before the open date"));
            }
        }

        if let Some(reference) = &self.reference {
            if reference.trim().is_empty() {
                return Err(LedgerError::invalid_field("reference", "must not be blank"));
            }
        }

        Ok(())
    }
}

/// builder for loan creation requests
#[derive(Debug, Default)]
pub struct NewLoanBuilder {
    borrower_id: Option<String>,
    principal: Option<Money>,
    term: Option<u32>,
    annual_rate: Option<Rate>,
    reference: Option<String>,
    operation_number: Option<String>,
    open_date: Option<NaiveDate>,
    first_due_date: Option<NaiveDate>,
    charges: ChargePlan,
}

impl NewLoanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn borrower(mut self, borrower_id: impl Into<String>) -> Self {
        self.borrower_id = Some(borrower_id.into());
        self
    }

    pub fn principal(mut self, principal: Money) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn term(mut self, installments: u32) -> Self {
        self.term = Some(installments);
        self
    }

    pub fn rate(mut self, annual_rate: Rate) -> Self {
        self.annual_rate = Some(annual_rate);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn operation_number(mut self, number: impl Into<String>) -> Self {
        self.operation_number = Some(number.into());
        self
    }

    pub fn open_date(mut self, date: NaiveDate) -> Self {
        self.open_date = Some(date);
        self
    }

    pub fn first_due_date(mut self, date: NaiveDate) -> Self {
        self.first_due_date = Some(date);
        self
    }

    pub fn charges(mut self, charges: Money, policy: Money) -> Self {
        self.charges = ChargePlan { charges, policy };
        self
    }

    pub fn build(self) -> Result<NewLoan> {
        let borrower_id = self.borrower_id
            .ok_or_else(|| LedgerError::invalid_field("borrower_id", "is required"))?;

        let principal = self.principal
            .ok_or_else(|| LedgerError::invalid_field("principal", "is required"))?;

        let term = self.term
            .ok_or_else(|| LedgerError::invalid_field("term", "is required"))?;

        let request = NewLoan {
            borrower_id,
            principal,
            term,
            annual_rate: self.annual_rate,
            reference: self.reference,
            operation_number: self.operation_number,
            open_date: self.open_date,
            first_due_date: self.first_due_date,
            charges: self.charges,
        };

        request.validate()?;
        Ok(request)
    }
}

/// loan aggregate root, owns its installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub reference: String,
    pub operation_number: Option<String>,
    pub borrower_id: String,

    // terms fixed at creation
    pub principal: Money,
    pub term: u32,
    pub annual_rate: Rate,
    pub open_date: NaiveDate,
    pub first_due_date: NaiveDate,

    installment_amount: Option<Money>,
    pub status: LoanStatus,
    pub balance: Money,
    pub overdue_installments: u32,
    pub installments: Vec<Installment>,
}

impl Loan {
    /// create the loan and its full installment schedule in one step
    pub fn originate(
        request: &NewLoan,
        reference: String,
        open_date: NaiveDate,
        config: &LedgerConfig,
        events: &mut EventStore,
    ) -> Result<Self> {
        request.validate()?;

        let annual_rate = request.annual_rate.unwrap_or_else(|| config.default_rate());
        let first_due_date = match request.first_due_date {
            Some(date) => date,
            None => add_months(open_date, 1)?,
        };

        if first_due_date < open_date {
            return Err(LedgerError::invalid_field("first_due_date", "is before the open date"));
        }

        let schedule = ScheduleGenerator::generate(
            request.principal,
            request.term,
            annual_rate,
            first_due_date,
        )?;

        let installments = schedule.rows
            .iter()
            .map(|row| Installment::from_scheduled(row, request.charges))
            .collect();

        let mut loan = Self {
            id: Uuid::new_v4(),
            reference,
            operation_number: request.operation_number.clone(),
            borrower_id: request.borrower_id.trim().to_string(),
            principal: request.principal,
            term: request.term,
            annual_rate,
            open_date,
            first_due_date,
            installment_amount: None,
            status: LoanStatus::Active,
            balance: request.principal,
            overdue_installments: 0,
            installments,
        };

        loan.set_installment_amount(schedule.installment_amount)?;

        events.emit(Event::LoanOriginated {
            loan_id: loan.id,
            reference: loan.reference.clone(),
            principal: loan.principal,
            rate: annual_rate,
            term: loan.term,
        });

        events.emit(Event::ScheduleGenerated {
            loan_id: loan.id,
            installment_amount: schedule.installment_amount,
            installments: loan.term,
            first_due_date,
            total_interest: schedule.total_interest(),
        });

        info!(
            loan_id = %loan.id,
            reference = %loan.reference,
            principal = %loan.principal,
            term = loan.term,
            installment = %schedule.installment_amount,
            "loan originated"
        );

        Ok(loan)
    }

    /// constant installment computed at origination
    pub fn installment_amount(&self) -> Option<Money> {
        self.installment_amount
    }

    fn set_installment_amount(&mut self, amount: Money) -> Result<()> {
        if self.installment_amount.is_some() {
            return Err(LedgerError::CalculationError {
                message: format!("installment amount of loan {} is already set", self.reference),
            });
        }
        self.installment_amount = Some(amount);
        Ok(())
    }

    pub fn installment(&self, seq: u32) -> Option<&Installment> {
        self.installments.iter().find(|i| i.seq == seq)
    }

    pub fn installment_mut(&mut self, seq: u32) -> Option<&mut Installment> {
        self.installments.iter_mut().find(|i| i.seq == seq)
    }

    /// unpaid installments, oldest first
    pub fn open_installments(&self) -> Vec<&Installment> {
        let mut open: Vec<&Installment> = self.installments
            .iter()
            .filter(|i| i.is_open() && i.seq > 0)
            .collect();
        open.sort_by_key(|i| i.seq);
        open
    }

    pub fn all_paid(&self) -> bool {
        self.installments.iter().all(|i| i.state == InstallmentState::Paid)
    }

    pub fn principal_collected(&self) -> Money {
        self.installments.iter().map(|i| i.principal_collected).sum()
    }

    pub fn interest_collected(&self) -> Money {
        self.installments.iter().map(|i| i.interest_collected).sum()
    }

    /// everything still owed across unpaid installments
    pub fn total_outstanding(&self) -> Money {
        self.installments
            .iter()
            .filter(|i| i.is_open())
            .map(|i| i.outstanding())
            .sum()
    }

    /// set the moratory interest due on an installment.
    ///
    /// The penalty amount is computed elsewhere; the waterfall collects it
    /// ahead of every other concept.
    pub fn assess_moratory(
        &mut self,
        seq: u32,
        amount: Money,
        timestamp: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        if amount.is_negative() {
            return Err(LedgerError::invalid_field("moratory", "must not be negative"));
        }

        let loan_id = self.id;
        let installment = self.installment_mut(seq)
            .ok_or(LedgerError::InstallmentNotFound { seq })?;

        if !installment.is_open() {
            return Err(LedgerError::InstallmentAlreadyPaid { seq });
        }

        if amount < installment.moratory_collected {
            return Err(LedgerError::invalid_field(
                "moratory",
                format!("{} is below the {} already collected", amount, installment.moratory_collected),
            ));
        }

        installment.moratory_due = amount;

        events.emit(Event::MoratoryAssessed {
            loan_id,
            seq,
            amount,
            timestamp,
        });

        Ok(())
    }

    /// recount overdue installments and flip between active and delinquent.
    ///
    /// Closed and legal loans keep their status; only the count is updated.
    pub fn refresh_delinquency(
        &mut self,
        as_of: NaiveDate,
        timestamp: DateTime<Utc>,
        events: &mut EventStore,
    ) -> u32 {
        let overdue = self.installments
            .iter()
            .filter(|i| i.is_overdue(as_of))
            .count() as u32;
        self.overdue_installments = overdue;

        let next = match (self.status, overdue) {
            (LoanStatus::Active, n) if n > 0 => LoanStatus::Delinquent,
            (LoanStatus::Delinquent, 0) => LoanStatus::Active,
            (current, _) => current,
        };

        self.change_status(next, format!("{} installments overdue as of {}", overdue, as_of), timestamp, events);
        overdue
    }

    /// hand the loan to legal collections
    pub fn mark_legal(&mut self, timestamp: DateTime<Utc>, events: &mut EventStore) -> Result<()> {
        if self.status == LoanStatus::Closed {
            return Err(LedgerError::invalid_field("status", "a closed loan cannot go to legal collections"));
        }
        self.change_status(LoanStatus::Legal, "sent to legal collections".to_string(), timestamp, events);
        Ok(())
    }

    /// close the loan once every installment is settled
    pub(crate) fn close_if_settled(&mut self, timestamp: DateTime<Utc>, events: &mut EventStore) -> bool {
        if !self.all_paid() {
            return false;
        }
        self.overdue_installments = 0;
        self.change_status(LoanStatus::Closed, "all installments paid".to_string(), timestamp, events);
        true
    }

    /// recompute and store the outstanding balance from the ledger
    pub fn reconcile_balance(&mut self, events: &mut EventStore) -> Money {
        BalanceReconciler::reconcile(self, events)
    }

    fn change_status(
        &mut self,
        next: LoanStatus,
        reason: String,
        timestamp: DateTime<Utc>,
        events: &mut EventStore,
    ) {
        if next == self.status {
            return;
        }

        let old_status = self.status;
        self.status = next;

        events.emit(Event::StatusChanged {
            loan_id: self.id,
            old_status,
            new_status: next,
            reason,
            timestamp,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
    }

    fn originate(request: NewLoan) -> (Loan, EventStore) {
        let mut events = EventStore::new();
        let loan = Loan::originate(
            &request,
            "LN-000001".to_string(),
            date(2024, 1, 15),
            &LedgerConfig::default(),
            &mut events,
        ).unwrap();
        (loan, events)
    }

    #[test]
    fn test_originate_generates_schedule() {
        let request = NewLoan::builder()
            .borrower("0102030405")
            .principal(Money::from_major(1_000_000))
            .term(12)
            .rate(Rate::from_percentage(dec!(24)))
            .build()
            .unwrap();

        let (loan, mut events) = originate(request);

        assert_eq!(loan.installments.len(), 12);
        assert_eq!(loan.first_due_date, date(2024, 2, 15));
        assert_eq!(loan.installment_amount(), Some(Money::from_decimal(dec!(94559.60))));
        assert_eq!(loan.balance, Money::from_major(1_000_000));
        assert_eq!(loan.status, LoanStatus::Active);
        assert!(loan.installments.iter().all(|i| i.state == InstallmentState::Pending));

        let emitted = events.take_events();
        assert!(matches!(emitted[0], Event::LoanOriginated { .. }));
        assert!(matches!(emitted[1], Event::ScheduleGenerated { installments: 12, .. }));
    }

    #[test]
    fn test_default_rate_applies_when_omitted() {
        let request = NewLoan::builder()
            .borrower("A1")
            .principal(Money::from_major(1_000))
            .term(10)
            .build()
            .unwrap();

        let (loan, _) = originate(request);
        assert_eq!(loan.annual_rate, Rate::from_percentage(dec!(24)));
    }

    #[test]
    fn test_installment_amount_is_set_once() {
        let request = NewLoan::builder()
            .borrower("A1")
            .principal(Money::from_major(1_000))
            .term(10)
            .build()
            .unwrap();

        let (mut loan, _) = originate(request);
        assert!(loan.set_installment_amount(Money::from_major(1)).is_err());
        assert_ne!(loan.installment_amount(), Some(Money::from_major(1)));
    }

    #[test]
    fn test_builder_reports_offending_field() {
        let err = NewLoan::builder()
            .principal(Money::from_major(1_000))
            .term(10)
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("borrower_id"));

        let err = NewLoan::builder()
            .borrower("A1")
            .principal(Money::ZERO)
            .term(10)
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("principal"));

        let err = NewLoan::builder()
            .borrower("A1")
            .principal(Money::from_major(10))
            .term(0)
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("term"));

        let err = NewLoan::builder()
            .borrower("A1")
            .principal(Money::from_major(10))
            .term(MAX_TERM + 1)
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("term"));

        let err = NewLoan::builder()
            .borrower("A1")
            .principal(Money::from_major(10))
            .term(u32::MAX)
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("term"));

        let err = NewLoan::builder()
            .borrower("A1")
            .principal(Money::from_major(10))
            .term(2)
            .open_date(date(2024, 3, 1))
            .first_due_date(date(2024, 2, 1))
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("first_due_date"));
    }

    #[test]
    fn test_charge_plan_is_copied_to_every_installment() {
        let request = NewLoan::builder()
            .borrower("A1")
            .principal(Money::from_major(1_200))
            .term(3)
            .rate(Rate::ZERO)
            .charges(Money::from_major(10), Money::from_major(2))
            .build()
            .unwrap();

        let (loan, _) = originate(request);
        for inst in &loan.installments {
            assert_eq!(inst.charges_due, Money::from_major(10));
            assert_eq!(inst.policy_due, Money::from_major(2));
            assert_eq!(inst.total_due(), Money::from_major(412));
        }
    }

    #[test]
    fn test_delinquency_round_trip() {
        let request = NewLoan::builder()
            .borrower("A1")
            .principal(Money::from_major(1_200))
            .term(3)
            .rate(Rate::ZERO)
            .build()
            .unwrap();

        let (mut loan, _) = originate(request);
        let mut events = EventStore::new();

        let overdue = loan.refresh_delinquency(date(2024, 3, 20), now(), &mut events);
        assert_eq!(overdue, 2);
        assert_eq!(loan.status, LoanStatus::Delinquent);

        for inst in loan.installments.iter_mut().take(2) {
            inst.advance_state(InstallmentState::Paid);
        }

        let overdue = loan.refresh_delinquency(date(2024, 3, 20), now(), &mut events);
        assert_eq!(overdue, 0);
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(events.events().len(), 2);
    }

    #[test]
    fn test_legal_status_is_sticky() {
        let request = NewLoan::builder()
            .borrower("A1")
            .principal(Money::from_major(1_200))
            .term(3)
            .build()
            .unwrap();

        let (mut loan, _) = originate(request);
        let mut events = EventStore::new();

        loan.mark_legal(now(), &mut events).unwrap();
        loan.refresh_delinquency(date(2024, 12, 31), now(), &mut events);

        assert_eq!(loan.status, LoanStatus::Legal);
        assert_eq!(loan.overdue_installments, 3);
    }

    #[test]
    fn test_assess_moratory() {
        let request = NewLoan::builder()
            .borrower("A1")
            .principal(Money::from_major(1_200))
            .term(3)
            .build()
            .unwrap();

        let (mut loan, _) = originate(request);
        let mut events = EventStore::new();

        loan.assess_moratory(2, Money::from_major(15), now(), &mut events).unwrap();
        assert_eq!(loan.installment(2).unwrap().moratory_due, Money::from_major(15));

        let err = loan.assess_moratory(9, Money::from_major(15), now(), &mut events).unwrap_err();
        assert!(err.is_not_found());

        loan.installment_mut(1).unwrap().advance_state(InstallmentState::Paid);
        let err = loan.assess_moratory(1, Money::from_major(15), now(), &mut events).unwrap_err();
        assert!(matches!(err, LedgerError::InstallmentAlreadyPaid { seq: 1 }));
    }
}
