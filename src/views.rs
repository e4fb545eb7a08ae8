//! Read models for reporting collaborators.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::decimal::Money;
use crate::errors::Result;
use crate::ledger::{Installment, Loan};
use crate::payments::PaymentReceipt;
use crate::types::{InstallmentState, LoanId, LoanStatus, ReceiptId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanView {
    pub id: LoanId,
    pub reference: String,
    pub operation_number: Option<String>,
    pub borrower_id: String,
    pub principal: Money,
    pub term: u32,
    pub annual_rate_pct: Decimal,
    pub installment_amount: Option<Money>,
    pub open_date: NaiveDate,
    pub first_due_date: NaiveDate,
    pub status: LoanStatus,
    pub balance: Money,
    pub overdue_installments: u32,
    pub interest_collected: Money,
    pub principal_collected: Money,
    pub outstanding: Money,
    pub installments: Vec<InstallmentView>,
}

impl From<&Loan> for LoanView {
    fn from(loan: &Loan) -> Self {
        Self {
            id: loan.id,
            reference: loan.reference.clone(),
            operation_number: loan.operation_number.clone(),
            borrower_id: loan.borrower_id.clone(),
            principal: loan.principal,
            term: loan.term,
            annual_rate_pct: loan.annual_rate.as_percentage().normalize(),
            installment_amount: loan.installment_amount(),
            open_date: loan.open_date,
            first_due_date: loan.first_due_date,
            status: loan.status,
            balance: loan.balance,
            overdue_installments: loan.overdue_installments,
            interest_collected: loan.interest_collected(),
            principal_collected: loan.principal_collected(),
            outstanding: loan.total_outstanding(),
            installments: loan.installments
                .iter()
                .map(|i| InstallmentView::new(loan, i))
                .collect(),
        }
    }
}

/// flat installment row, tagged with its loan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentView {
    pub loan_id: LoanId,
    pub reference: String,
    pub seq: u32,
    pub due_date: NaiveDate,
    pub interest_due: Money,
    pub principal_due: Money,
    pub charges_due: Money,
    pub policy_due: Money,
    pub moratory_due: Money,
    pub moratory_collected: Money,
    pub interest_collected: Money,
    pub charges_collected: Money,
    pub principal_collected: Money,
    pub total_collected: Money,
    pub total_due: Money,
    pub outstanding: Money,
    pub state: InstallmentState,
    pub paid_date: Option<NaiveDate>,
}

impl InstallmentView {
    pub fn new(loan: &Loan, installment: &Installment) -> Self {
        Self {
            loan_id: loan.id,
            reference: loan.reference.clone(),
            seq: installment.seq,
            due_date: installment.due_date,
            interest_due: installment.interest_due,
            principal_due: installment.principal_due,
            charges_due: installment.charges_due,
            policy_due: installment.policy_due,
            moratory_due: installment.moratory_due,
            moratory_collected: installment.moratory_collected,
            interest_collected: installment.interest_collected,
            charges_collected: installment.charges_collected,
            principal_collected: installment.principal_collected,
            total_collected: installment.total_collected,
            total_due: installment.total_due(),
            outstanding: installment.outstanding(),
            state: installment.state,
            paid_date: installment.paid_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptView {
    pub id: ReceiptId,
    pub loan_id: LoanId,
    pub installment_seq: Option<u32>,
    pub cuota: Money,
    pub amount: Money,
    pub effective_date: NaiveDate,
    pub source: String,
    pub balance_before: Money,
    pub balance_after: Money,
    pub to_moratory: Money,
    pub to_interest: Money,
    pub to_charges: Money,
    pub to_principal: Money,
    pub unapplied: Money,
    pub interest_collected_to_date: Money,
    pub principal_collected_to_date: Money,
    pub created_at: DateTime<Utc>,
}

impl From<&PaymentReceipt> for ReceiptView {
    fn from(receipt: &PaymentReceipt) -> Self {
        Self {
            id: receipt.id,
            loan_id: receipt.loan_id,
            installment_seq: receipt.installment_seq,
            cuota: receipt.cuota,
            amount: receipt.amount,
            effective_date: receipt.effective_date,
            source: receipt.source.to_string(),
            balance_before: receipt.balance_before,
            balance_after: receipt.balance_after,
            to_moratory: receipt.breakdown.to_moratory,
            to_interest: receipt.breakdown.to_interest,
            to_charges: receipt.breakdown.to_charges,
            to_principal: receipt.breakdown.to_principal,
            unapplied: receipt.unapplied,
            interest_collected_to_date: receipt.interest_collected_to_date,
            principal_collected_to_date: receipt.principal_collected_to_date,
            created_at: receipt.created_at,
        }
    }
}

pub fn to_json_pretty<T: Serialize>(view: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(view)?)
}
