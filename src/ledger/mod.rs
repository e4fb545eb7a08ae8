pub mod balance;
pub mod installment;
pub mod loan;

pub use balance::BalanceReconciler;
pub use installment::Installment;
pub use loan::{Loan, NewLoan, NewLoanBuilder};
