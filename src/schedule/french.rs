use chrono::{Months, NaiveDate};
use rust_decimal::{Decimal, MathematicalOps};
use tracing::debug;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};

use super::{Schedule, ScheduledInstallment, MAX_TERM};

/// constant-payment (french) amortization
pub struct ScheduleGenerator;

impl ScheduleGenerator {
    /// generate the full schedule.
    ///
    /// Interest is charged on the running balance at the monthly rate and
    /// rounded to cents; every row but the last repays `installment - interest`.
    /// The last row repays exactly what is left, so the principal column always
    /// sums to the loan principal and the schedule closes at zero.
    pub fn generate(
        principal: Money,
        term: u32,
        annual_rate: Rate,
        first_due_date: NaiveDate,
    ) -> Result<Schedule> {
        if !principal.is_positive() {
            return Err(LedgerError::invalid_field("principal", "must be greater than zero"));
        }

        if term == 0 {
            return Err(LedgerError::invalid_field("term", "must be at least one installment"));
        }

        if term > MAX_TERM {
            return Err(LedgerError::invalid_field(
                "term",
                format!("must be at most {} installments", MAX_TERM),
            ));
        }

        if annual_rate.is_negative() {
            return Err(LedgerError::invalid_field("rate", "must not be negative"));
        }

        // the last due date must exist before any row is built
        add_months(first_due_date, term - 1)?;

        let monthly_rate = annual_rate.monthly_rate();
        let installment_amount = constant_payment(principal, monthly_rate, term)?;

        let mut rows = Vec::with_capacity(term as usize);
        let mut balance = principal;

        for seq in 1..=term {
            let due_date = add_months(first_due_date, seq - 1)?;
            let interest = balance * monthly_rate.as_decimal();

            let principal_portion = if seq == term {
                balance
            } else {
                // never amortize past the remaining balance
                installment_amount.saturating_sub(interest).min(balance)
            };

            let payment = principal_portion + interest;
            let balance_after = balance.saturating_sub(principal_portion);

            rows.push(ScheduledInstallment {
                seq,
                due_date,
                balance_before: balance,
                interest,
                principal: principal_portion,
                payment,
                balance_after,
            });

            balance = balance_after;
        }

        debug!(
            principal = %principal,
            term,
            rate = %annual_rate,
            installment = %installment_amount,
            "schedule generated"
        );

        Ok(Schedule {
            installment_amount,
            monthly_rate,
            rows,
        })
    }
}

/// constant installment `P * r(1+r)^n / ((1+r)^n - 1)`, or `P / n` at zero rate
pub fn constant_payment(principal: Money, monthly_rate: Rate, term: u32) -> Result<Money> {
    if term == 0 {
        return Err(LedgerError::invalid_field("term", "must be at least one installment"));
    }

    let r = monthly_rate.as_decimal();

    if r.is_zero() {
        return Ok(principal / Decimal::from(term));
    }

    let overflow = || LedgerError::CalculationError {
        message: format!("installment overflow for rate {} over {} periods", r, term),
    };

    let growth = (Decimal::ONE + r).checked_powu(u64::from(term)).ok_or_else(overflow)?;
    let denominator = growth - Decimal::ONE;

    if denominator.is_zero() {
        return Err(LedgerError::CalculationError {
            message: format!("monthly rate {} too small to amortize", r),
        });
    }

    let numerator = principal
        .as_decimal()
        .checked_mul(r)
        .and_then(|v| v.checked_mul(growth))
        .ok_or_else(overflow)?;

    let payment = numerator.checked_div(denominator).ok_or_else(overflow)?;

    Ok(Money::round_half_up(payment))
}

/// calendar month addition clamped to month end (jan 31 + 1 = feb 28/29)
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| LedgerError::invalid_field("first_due_date", format!("{} + {} months is out of range", date, months)))
}
