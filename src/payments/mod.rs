pub mod receipt;
pub mod waterfall;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::PaymentSource;

pub use receipt::{InstallmentApplication, PaymentReceipt, ReceiptJournal};
pub use waterfall::{PaymentAllocator, PAID_TOLERANCE, STOP_EPSILON};

/// payment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
    pub effective_date: NaiveDate,
    pub source: PaymentSource,
}

impl PaymentRequest {
    pub fn new(amount: Money, effective_date: NaiveDate, source: PaymentSource) -> Self {
        Self {
            amount,
            effective_date,
            source,
        }
    }

    pub fn manual(amount: Money, effective_date: NaiveDate) -> Self {
        Self::new(amount, effective_date, PaymentSource::Manual)
    }

    pub fn advance(amount: Money, effective_date: NaiveDate) -> Self {
        Self::new(amount, effective_date, PaymentSource::Advance)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount {
                amount: self.amount,
            });
        }
        Ok(())
    }
}
