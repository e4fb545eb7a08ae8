use thiserror::Error;

use crate::decimal::Money;
use crate::types::LoanId;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: String,
        reason: String,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: LoanId,
    },

    #[error("loan reference not found: {reference}")]
    LoanReferenceNotFound {
        reference: String,
    },

    #[error("duplicate loan reference: {reference}")]
    DuplicateReference {
        reference: String,
    },

    #[error("duplicate operation number: {number}")]
    DuplicateOperationNumber {
        number: String,
    },

    #[error("installment {seq} not found")]
    InstallmentNotFound {
        seq: u32,
    },

    #[error("installment {seq} is already paid")]
    InstallmentAlreadyPaid {
        seq: u32,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("calculation error: {message}")]
    CalculationError {
        message: String,
    },

    #[error("unreadable {detected} upload")]
    UnsupportedFormat {
        detected: String,
    },

    #[error("import has no {column} column")]
    MissingColumn {
        column: &'static str,
    },

    #[error("ambiguous {column} column: {candidates:?}")]
    AmbiguousColumns {
        column: &'static str,
        candidates: Vec<String>,
    },

    #[error("amount and identifier resolve to the same column: {header}")]
    ColumnsCoincide {
        header: String,
    },

    #[error("import file is empty")]
    EmptyImport,

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage poisoned: {resource}")]
    StoragePoisoned {
        resource: &'static str,
    },
}

impl LedgerError {
    pub fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        LedgerError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// offending field for validation failures
    pub fn field(&self) -> Option<&str> {
        match self {
            LedgerError::InvalidField { field, .. } => Some(field),
            LedgerError::InvalidPaymentAmount { .. } => Some("amount"),
            _ => None,
        }
    }

    /// rejected before any mutation, the caller sent bad input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidField { .. }
                | LedgerError::InvalidPaymentAmount { .. }
                | LedgerError::DuplicateReference { .. }
                | LedgerError::DuplicateOperationNumber { .. }
                | LedgerError::InstallmentAlreadyPaid { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::LoanNotFound { .. }
                | LedgerError::LoanReferenceNotFound { .. }
                | LedgerError::InstallmentNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
