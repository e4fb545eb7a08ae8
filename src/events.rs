use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{LoanId, LoanStatus, PaymentSource, ReceiptId};

/// all events that can be emitted by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanOriginated {
        loan_id: LoanId,
        reference: String,
        principal: Money,
        rate: Rate,
        term: u32,
    },
    ScheduleGenerated {
        loan_id: LoanId,
        installment_amount: Money,
        installments: u32,
        first_due_date: NaiveDate,
        total_interest: Money,
    },
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentAllocated {
        loan_id: LoanId,
        receipt_id: ReceiptId,
        amount: Money,
        source: PaymentSource,
        applied_to_interest: Money,
        applied_to_principal: Money,
        timestamp: DateTime<Utc>,
    },
    InstallmentSettled {
        loan_id: LoanId,
        seq: u32,
        paid_date: NaiveDate,
    },
    OverpaymentDiscarded {
        loan_id: LoanId,
        receipt_id: ReceiptId,
        unapplied: Money,
        timestamp: DateTime<Utc>,
    },
    BalanceReconciled {
        loan_id: LoanId,
        old_balance: Money,
        new_balance: Money,
    },
    MoratoryAssessed {
        loan_id: LoanId,
        seq: u32,
        amount: Money,
        timestamp: DateTime<Utc>,
    },

    // import events
    ImportCompleted {
        rows: usize,
        applied: usize,
        amount_applied: Money,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default, Clone)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// move every event of `other` into this store
    pub fn absorb(&mut self, other: &mut EventStore) {
        self.events.append(&mut other.events);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
