/// bulk import - apply a payment file and read the per-row report
use chrono::NaiveDate;
use loan_ledger_rs::{
    LedgerConfig, LoanBook, Money, NewLoan, RowStatus, SafeTimeProvider, TimeSource,
};

const FILE: &str = "\
Cédula;Nombre;Monto pagado
0912345678;Ana Torres;1.200,00
09-8765432-1;Luis Paz;350,50
;Sin cédula;100
0102030405;Marta Gil;0
0555555555;Desconocido;80
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let time = SafeTimeProvider::new(TimeSource::System);
    let book = LoanBook::new(LedgerConfig::default())?;

    for borrower in ["0912345678", "0987654321", "0102030405"] {
        book.create_loan(
            NewLoan::builder()
                .borrower(borrower)
                .principal(Money::from_major(5_000))
                .term(10)
                .build()?,
            &time,
        )?;
    }

    let effective = NaiveDate::from_ymd_opt(2024, 6, 30).ok_or("bad date")?;
    let report = book.import_payments(FILE.as_bytes(), effective, &time)?;

    for outcome in &report.rows {
        let status = match &outcome.status {
            RowStatus::Applied { unapplied, .. } => format!("applied (unapplied {})", unapplied),
            other => format!("{:?}", other),
        };
        println!("row {:<2} {:<14} {}", outcome.row, outcome.identifier, status);
    }

    println!(
        "\n{} rows: {} applied, {} skipped, {} zero, {} not found, total {}",
        report.total(),
        report.applied,
        report.skipped,
        report.zero_amount,
        report.not_found,
        report.amount_applied,
    );

    Ok(())
}
