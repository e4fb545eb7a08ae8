pub mod book;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod import;
pub mod ledger;
pub mod payments;
pub mod schedule;
pub mod types;
pub mod views;

// re-export key types
pub use book::{BorrowerMatch, LoanBook, LoanTx};
pub use config::{ImportConfig, LedgerConfig};
pub use decimal::{Money, Rate};
pub use errors::{LedgerError, Result};
pub use events::{Event, EventStore};
pub use import::{ImportReport, RowOutcome, RowStatus};
pub use ledger::{BalanceReconciler, Installment, Loan, NewLoan, NewLoanBuilder};
pub use payments::{
    PaymentAllocator, PaymentReceipt, PaymentRequest, ReceiptJournal, PAID_TOLERANCE, STOP_EPSILON,
};
pub use schedule::{Schedule, ScheduleGenerator, ScheduledInstallment, MAX_TERM};
pub use types::{
    AllocationBreakdown, ChargePlan, Concept, InstallmentState, LoanId, LoanStatus,
    PaymentSource, ReceiptId,
};
pub use views::{InstallmentView, LoanView, ReceiptView};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
