/// waterfall - how a payment spreads over moratory, interest, charges, principal
use chrono::{NaiveDate, TimeZone, Utc};
use loan_ledger_rs::{
    Concept, LedgerConfig, LoanBook, Money, NewLoan, PaymentRequest, Rate, ReceiptView,
    SafeTimeProvider, TimeSource,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    ));
    let book = LoanBook::new(LedgerConfig::default())?;

    let loan = book.create_loan(
        NewLoan::builder()
            .borrower("0102030405")
            .principal(Money::from_major(10_000))
            .term(6)
            .rate(Rate::from_percentage(dec!(12)))
            .charges(Money::from_major(15), Money::from_major(5))
            .build()?,
        &time,
    )?;

    for row in &loan.installments {
        println!(
            "#{:<2} {}  interest {:>8}  principal {:>9}  charges {:>6}",
            row.seq,
            row.due_date,
            row.interest_due,
            row.principal_due,
            row.due(Concept::Charges),
        );
    }

    // the first installment is late: a penalty was assessed elsewhere
    book.assess_moratory(loan.id, 1, Money::from_major(40), &time)?;

    let paid_on = NaiveDate::from_ymd_opt(2024, 3, 1).ok_or("bad date")?;
    let payments = [Money::from_major(100), Money::from_major(2_000), Money::from_major(20_000)];

    for amount in payments {
        let receipt = book.pay(loan.id, PaymentRequest::manual(amount, paid_on), &time)?;
        let view = ReceiptView::from(&receipt);
        println!(
            "\npaid {}: moratory {} interest {} charges {} principal {} unapplied {}",
            view.amount,
            view.to_moratory,
            view.to_interest,
            view.to_charges,
            view.to_principal,
            view.unapplied,
        );
        println!("balance {} -> {}", view.balance_before, view.balance_after);
    }

    let loan = book.loan(loan.id)?;
    println!("\nfinal status: {:?}", loan.status);

    Ok(())
}
