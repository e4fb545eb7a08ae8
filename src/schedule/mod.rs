pub mod french;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};

pub use french::{add_months, constant_payment, ScheduleGenerator};

/// longest schedule accepted, fifty years of monthly installments
pub const MAX_TERM: u32 = 600;

/// one row of a planned repayment schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub seq: u32,
    pub due_date: NaiveDate,
    pub balance_before: Money,
    pub interest: Money,
    pub principal: Money,
    pub payment: Money,
    pub balance_after: Money,
}

/// planned repayment schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// constant installment, the last row may differ by the rounding residue
    pub installment_amount: Money,
    pub monthly_rate: Rate,
    pub rows: Vec<ScheduledInstallment>,
}

impl Schedule {
    /// get row by 1-based sequence number
    pub fn get(&self, seq: u32) -> Option<&ScheduledInstallment> {
        seq.checked_sub(1)
            .and_then(|index| self.rows.get(index as usize))
    }

    pub fn total_interest(&self) -> Money {
        self.rows.iter().map(|r| r.interest).sum()
    }

    pub fn total_principal(&self) -> Money {
        self.rows.iter().map(|r| r.principal).sum()
    }

    pub fn total_payment(&self) -> Money {
        self.rows.iter().map(|r| r.payment).sum()
    }

    pub fn first_due_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.due_date)
    }
}
