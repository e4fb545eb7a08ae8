/// quick start - originate a loan, pay one installment
use loan_ledger_rs::{
    LedgerConfig, LoanBook, LoanView, Money, NewLoan, PaymentRequest, Rate, SafeTimeProvider,
    TimeSource, views,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let time = SafeTimeProvider::new(TimeSource::System);
    let book = LoanBook::new(LedgerConfig::default())?;

    // 1,000,000 over 12 months at 24% nominal
    let loan = book.create_loan(
        NewLoan::builder()
            .borrower("0912345678")
            .principal(Money::from_major(1_000_000))
            .term(12)
            .rate(Rate::from_percentage(dec!(24)))
            .build()?,
        &time,
    )?;

    let cuota = loan.installment_amount().unwrap_or(Money::ZERO);
    println!("installment: {}", cuota);

    let receipt = book.pay(loan.id, PaymentRequest::manual(cuota, loan.first_due_date), &time)?;
    println!("balance {} -> {}", receipt.balance_before, receipt.balance_after);

    let view = LoanView::from(&book.loan(loan.id)?);
    println!("{}", views::to_json_pretty(&view)?);

    Ok(())
}
