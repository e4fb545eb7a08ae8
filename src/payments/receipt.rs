use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{AllocationBreakdown, InstallmentState, LoanId, PaymentSource, ReceiptId};

/// what one payment did to one installment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentApplication {
    pub seq: u32,
    pub breakdown: AllocationBreakdown,
    pub state_after: InstallmentState,
}

/// immutable record of one allocation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub id: ReceiptId,
    pub loan_id: LoanId,
    /// first installment the payment touched, none when nothing was open
    pub installment_seq: Option<u32>,
    /// amount still owed on that installment before this payment
    pub cuota: Money,
    pub amount: Money,
    pub effective_date: NaiveDate,
    pub source: PaymentSource,
    pub balance_before: Money,
    pub balance_after: Money,
    /// loan-wide totals at the time of issue
    pub interest_collected_to_date: Money,
    pub principal_collected_to_date: Money,
    pub breakdown: AllocationBreakdown,
    pub applications: Vec<InstallmentApplication>,
    /// money left after every open installment was exhausted, discarded
    pub unapplied: Money,
    pub created_at: DateTime<Utc>,
}

impl PaymentReceipt {
    pub fn applied(&self) -> Money {
        self.breakdown.total()
    }
}

/// append-only receipt log
#[derive(Debug, Default)]
pub struct ReceiptJournal {
    receipts: Vec<PaymentReceipt>,
}

impl ReceiptJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, receipt: PaymentReceipt) {
        self.receipts.push(receipt);
    }

    pub fn get(&self, id: ReceiptId) -> Option<&PaymentReceipt> {
        self.receipts.iter().find(|r| r.id == id)
    }

    pub fn for_loan(&self, loan_id: LoanId) -> Vec<PaymentReceipt> {
        self.receipts
            .iter()
            .filter(|r| r.loan_id == loan_id)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PaymentReceipt> {
        self.receipts.iter()
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}
