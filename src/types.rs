use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::Money;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a payment receipt
pub type ReceiptId = Uuid;

/// loan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    /// disbursed and performing
    Active,
    /// at least one installment past its due date
    Delinquent,
    /// every installment settled
    Closed,
    /// handed over to legal collections
    Legal,
}

impl LoanStatus {
    /// open loans can still be matched by bulk imports
    pub fn is_open(&self) -> bool {
        !matches!(self, LoanStatus::Closed)
    }
}

/// installment lifecycle state, only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstallmentState {
    Pending,
    Partial,
    Paid,
}

/// where a payment came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentSource {
    /// keyed in by an operator
    Manual,
    /// early payment ahead of the schedule
    Advance,
    /// a row of a bulk payment file
    BulkImport,
    /// collection channel tag (bank, agent network, ...)
    Channel(String),
}

impl fmt::Display for PaymentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentSource::Manual => write!(f, "manual"),
            PaymentSource::Advance => write!(f, "advance"),
            PaymentSource::BulkImport => write!(f, "bulk_import"),
            PaymentSource::Channel(tag) => write!(f, "channel:{}", tag),
        }
    }
}

/// debt concept an installment owes, in waterfall order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Concept {
    MoratoryInterest,
    CurrentInterest,
    /// charges and policy share a single bucket
    Charges,
    Principal,
}

impl Concept {
    /// fixed allocation order of the waterfall
    pub const WATERFALL: [Concept; 4] = [
        Concept::MoratoryInterest,
        Concept::CurrentInterest,
        Concept::Charges,
        Concept::Principal,
    ];
}

/// flat per-installment charges fixed at schedule generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChargePlan {
    pub charges: Money,
    pub policy: Money,
}

/// how much of a payment went to each concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AllocationBreakdown {
    pub to_moratory: Money,
    pub to_interest: Money,
    pub to_charges: Money,
    pub to_principal: Money,
}

impl AllocationBreakdown {
    pub fn total(&self) -> Money {
        self.to_moratory + self.to_interest + self.to_charges + self.to_principal
    }

    pub fn get(&self, concept: Concept) -> Money {
        match concept {
            Concept::MoratoryInterest => self.to_moratory,
            Concept::CurrentInterest => self.to_interest,
            Concept::Charges => self.to_charges,
            Concept::Principal => self.to_principal,
        }
    }

    pub fn add(&mut self, concept: Concept, amount: Money) {
        match concept {
            Concept::MoratoryInterest => self.to_moratory += amount,
            Concept::CurrentInterest => self.to_interest += amount,
            Concept::Charges => self.to_charges += amount,
            Concept::Principal => self.to_principal += amount,
        }
    }

    pub fn merge(&mut self, other: &AllocationBreakdown) {
        for concept in Concept::WATERFALL {
            self.add(concept, other.get(concept));
        }
    }
}
