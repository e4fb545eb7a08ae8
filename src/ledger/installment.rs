use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::schedule::ScheduledInstallment;
use crate::types::{ChargePlan, Concept, InstallmentState};

/// one installment row of a loan ledger
///
/// Due columns are fixed when the schedule is generated (moratory interest
/// excepted, which is assessed externally). Collected columns only grow and
/// each stays at or below its due column. Charges and policy are collected
/// into a single `charges_collected` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub seq: u32,
    pub due_date: NaiveDate,

    // due
    pub interest_due: Money,
    pub principal_due: Money,
    pub charges_due: Money,
    pub policy_due: Money,
    pub moratory_due: Money,

    // collected so far
    pub moratory_collected: Money,
    pub interest_collected: Money,
    pub charges_collected: Money,
    pub principal_collected: Money,
    pub total_collected: Money,

    pub state: InstallmentState,
    pub paid_date: Option<NaiveDate>,

    // planned schedule snapshot, never touched by payments
    pub balance_before: Money,
    pub balance_after: Money,
}

impl Installment {
    pub fn from_scheduled(row: &ScheduledInstallment, charges: ChargePlan) -> Self {
        Self {
            seq: row.seq,
            due_date: row.due_date,
            interest_due: row.interest,
            principal_due: row.principal,
            charges_due: charges.charges,
            policy_due: charges.policy,
            moratory_due: Money::ZERO,
            moratory_collected: Money::ZERO,
            interest_collected: Money::ZERO,
            charges_collected: Money::ZERO,
            principal_collected: Money::ZERO,
            total_collected: Money::ZERO,
            state: InstallmentState::Pending,
            paid_date: None,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
        }
    }

    /// scheduled interest plus amortization
    pub fn cuota(&self) -> Money {
        self.interest_due + self.principal_due
    }

    pub fn total_due(&self) -> Money {
        self.cuota() + self.moratory_due + self.charges_due + self.policy_due
    }

    pub fn due(&self, concept: Concept) -> Money {
        match concept {
            Concept::MoratoryInterest => self.moratory_due,
            Concept::CurrentInterest => self.interest_due,
            Concept::Charges => self.charges_due + self.policy_due,
            Concept::Principal => self.principal_due,
        }
    }

    pub fn collected(&self, concept: Concept) -> Money {
        match concept {
            Concept::MoratoryInterest => self.moratory_collected,
            Concept::CurrentInterest => self.interest_collected,
            Concept::Charges => self.charges_collected,
            Concept::Principal => self.principal_collected,
        }
    }

    /// amount still owed on a concept, never negative
    pub fn pending(&self, concept: Concept) -> Money {
        self.due(concept).saturating_sub(self.collected(concept))
    }

    /// amount still owed across all concepts
    pub fn outstanding(&self) -> Money {
        Concept::WATERFALL.iter().map(|c| self.pending(*c)).sum()
    }

    pub fn is_open(&self) -> bool {
        self.state != InstallmentState::Paid
    }

    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        self.is_open() && self.due_date < as_of
    }

    /// collect up to the pending amount of a concept, returns what was taken
    pub(crate) fn collect(&mut self, concept: Concept, available: Money) -> Money {
        let take = available.min(self.pending(concept));
        if !take.is_positive() {
            return Money::ZERO;
        }

        let column = match concept {
            Concept::MoratoryInterest => &mut self.moratory_collected,
            Concept::CurrentInterest => &mut self.interest_collected,
            Concept::Charges => &mut self.charges_collected,
            Concept::Principal => &mut self.principal_collected,
        };
        *column += take;

        take
    }

    /// move the state forward, a settled installment never regresses
    pub(crate) fn advance_state(&mut self, next: InstallmentState) -> bool {
        if next > self.state {
            self.state = next;
            true
        } else {
            false
        }
    }
}
