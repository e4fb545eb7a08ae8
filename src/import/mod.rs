//! Bulk payment file import.
//!
//! A file is parsed up front into [`ImportRow`]s; any format or header
//! problem fails the whole import before a single row is applied. Rows are
//! then applied one by one by [`crate::book::LoanBook::import_payments`],
//! each in its own transaction.
//!
//! Rows are matched to loans by borrower identifier only. Importing the same
//! file twice applies every payment twice.
//!
//! Delimited text and the first worksheet of an XLSX/XLS workbook go through
//! the same column lookup and row building. Workbook identifiers should be
//! text cells, a numeric cell loses its leading zeros.

pub mod delimited;
pub mod sniff;
pub mod workbook;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ImportConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{LoanId, ReceiptId};

pub use delimited::{amount_from_decimal, normalize_identifier, parse_amount};
pub use sniff::{detect_format, ImportFormat};

/// a cell as read from the upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Text(String),
    /// a native spreadsheet number, never re-read through separator rules
    Number(Decimal),
}

impl Cell {
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.trim().to_string(),
            Cell::Number(value) => value.normalize().to_string(),
        }
    }

    pub fn amount(&self) -> Option<Money> {
        match self {
            Cell::Empty => None,
            Cell::Text(text) => parse_amount(text),
            Cell::Number(value) => amount_from_decimal(*value),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }
}

/// one data row of an import file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    /// 1-based data row number, the header is not counted
    pub row: usize,
    pub identifier: String,
    /// identifier reduced to its digits
    pub normalized: String,
    pub raw_amount: String,
    /// `None` when the amount cell could not be read as a number
    pub amount: Option<Money>,
}

impl ImportRow {
    /// outcome for rows that never reach a loan lookup
    pub fn precheck(&self) -> Option<RowStatus> {
        if self.identifier.is_empty() {
            return Some(RowStatus::Skipped);
        }

        match self.amount {
            None => Some(RowStatus::Failed {
                message: format!("unreadable amount '{}'", self.raw_amount),
            }),
            Some(amount) if !amount.is_positive() => Some(RowStatus::ZeroAmount),
            Some(_) => None,
        }
    }
}

/// a parsed file, ready to apply
#[derive(Debug, Clone)]
pub struct ParsedImport {
    pub format: ImportFormat,
    /// `None` for workbooks
    pub delimiter: Option<u8>,
    pub amount_header: String,
    pub identifier_header: String,
    pub rows: Vec<ImportRow>,
}

/// detect the format and parse every row
pub fn parse(bytes: &[u8], config: &ImportConfig) -> Result<ParsedImport> {
    if bytes.is_empty() {
        return Err(LedgerError::EmptyImport);
    }

    let format = detect_format(bytes);
    let parsed = match format {
        ImportFormat::Delimited => delimited::read_rows(&delimited::decode(bytes), config)?,
        ImportFormat::Xlsx | ImportFormat::Xls => workbook::read_rows(bytes, format, config)?,
    };

    info!(
        format = format.name(),
        rows = parsed.rows.len(),
        amount_column = %parsed.amount_header,
        identifier_column = %parsed.identifier_header,
        "import file parsed"
    );

    Ok(parsed)
}

/// locate the amount and identifier columns and build one row per record
pub(crate) fn tabulate(
    format: ImportFormat,
    delimiter: Option<u8>,
    headers: Vec<String>,
    records: Vec<Vec<Cell>>,
    config: &ImportConfig,
) -> Result<ParsedImport> {
    let (amount_idx, id_idx) = sniff::locate_columns(&headers, config)?;

    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let empty = Cell::Empty;
            let id_cell = record.get(id_idx).unwrap_or(&empty);
            let amount_cell = record.get(amount_idx).unwrap_or(&empty);
            let identifier = id_cell.text();

            ImportRow {
                row: i + 1,
                normalized: normalize_identifier(&identifier),
                identifier,
                raw_amount: amount_cell.text(),
                amount: amount_cell.amount(),
            }
        })
        .collect();

    Ok(ParsedImport {
        format,
        delimiter,
        amount_header: headers[amount_idx].clone(),
        identifier_header: headers[id_idx].clone(),
        rows,
    })
}

/// what happened to one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    Applied {
        loan_id: LoanId,
        receipt_id: ReceiptId,
        unapplied: Money,
    },
    /// empty identifier
    Skipped,
    ZeroAmount,
    NotFound,
    /// more than one open loan for the identifier
    Ambiguous {
        references: Vec<String>,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub row: usize,
    pub identifier: String,
    pub amount: Option<Money>,
    #[serde(flatten)]
    pub status: RowStatus,
}

/// flat per-row report plus summary counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub rows: Vec<RowOutcome>,
    pub applied: usize,
    pub skipped: usize,
    pub zero_amount: usize,
    pub not_found: usize,
    pub ambiguous: usize,
    pub failed: usize,
    pub amount_applied: Money,
    pub amount_unapplied: Money,
}

impl ImportReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, row: &ImportRow, status: RowStatus) {
        match &status {
            RowStatus::Applied { unapplied, .. } => {
                self.applied += 1;
                if let Some(amount) = row.amount {
                    self.amount_applied += amount - *unapplied;
                }
                self.amount_unapplied += *unapplied;
            }
            RowStatus::Skipped => self.skipped += 1,
            RowStatus::ZeroAmount => self.zero_amount += 1,
            RowStatus::NotFound => self.not_found += 1,
            RowStatus::Ambiguous { .. } => self.ambiguous += 1,
            RowStatus::Failed { .. } => self.failed += 1,
        }

        self.rows.push(RowOutcome {
            row: row.row,
            identifier: row.identifier.clone(),
            amount: row.amount,
            status,
        });
    }

    pub fn total(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn row(identifier: &str, amount: Option<Money>) -> ImportRow {
        ImportRow {
            row: 1,
            identifier: identifier.to_string(),
            normalized: normalize_identifier(identifier),
            raw_amount: amount.map(|a| a.to_string()).unwrap_or_else(|| "x".to_string()),
            amount,
        }
    }

    #[test]
    fn test_precheck() {
        assert_eq!(row("", Some(Money::from_major(5))).precheck(), Some(RowStatus::Skipped));
        assert_eq!(row("123", Some(Money::ZERO)).precheck(), Some(RowStatus::ZeroAmount));
        assert_eq!(row("123", Some(Money::from_major(-5))).precheck(), Some(RowStatus::ZeroAmount));
        assert!(matches!(row("123", None).precheck(), Some(RowStatus::Failed { .. })));
        assert_eq!(row("123", Some(Money::from_major(5))).precheck(), None);
    }

    #[test]
    fn test_corrupt_workbook_is_unreadable() {
        let config = ImportConfig::default();

        let err = parse(b"PK\x03\x04....", &config).unwrap_err();
        assert!(matches!(err, LedgerError::UnsupportedFormat { ref detected } if detected == "xlsx workbook"));
        assert!(matches!(parse(b"", &config), Err(LedgerError::EmptyImport)));
    }

    #[test]
    fn test_cells() {
        assert_eq!(Cell::Number(dec!(912345678)).text(), "912345678");
        assert_eq!(Cell::Number(dec!(1113.270)).text(), "1113.27");
        assert_eq!(Cell::Number(dec!(1113.27)).amount(), Some(Money::from_decimal(dec!(1113.27))));
        assert_eq!(Cell::Number(dec!(12.345)).amount(), None);
        assert_eq!(Cell::Text(" 1.500 ".to_string()).amount(), Some(Money::from_major(1_500)));
        assert_eq!(Cell::Empty.amount(), None);
        assert!(Cell::Text("  ".to_string()).is_empty());
    }

    #[test]
    fn test_tabulate_pads_short_records() {
        let headers = vec!["cedula".to_string(), "monto".to_string()];
        let records = vec![
            vec![Cell::Text("0912".to_string()), Cell::Number(dec!(20))],
            vec![Cell::Text("0913".to_string())],
        ];

        let parsed = tabulate(ImportFormat::Xlsx, None, headers, records, &ImportConfig::default()).unwrap();
        assert_eq!(parsed.rows[0].amount, Some(Money::from_major(20)));
        assert_eq!(parsed.rows[1].row, 2);
        assert_eq!(parsed.rows[1].amount, None);
        assert_eq!(parsed.rows[1].raw_amount, "");
    }

    #[test]
    fn test_report_counts() {
        let mut report = ImportReport::new();
        let paid = row("1", Some(Money::from_major(100)));

        report.record(&paid, RowStatus::Applied {
            loan_id: Uuid::new_v4(),
            receipt_id: Uuid::new_v4(),
            unapplied: Money::from_major(30),
        });
        report.record(&row("", None), RowStatus::Skipped);
        report.record(&row("2", Some(Money::from_major(1))), RowStatus::NotFound);

        assert_eq!(report.total(), 3);
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.not_found, 1);
        assert_eq!(report.amount_applied, Money::from_major(70));
        assert_eq!(report.amount_unapplied, Money::from_major(30));
    }

    #[test]
    fn test_row_outcome_serializes_flat() {
        let outcome = RowOutcome {
            row: 4,
            identifier: "0912".to_string(),
            amount: Some(Money::from_major(10)),
            status: RowStatus::NotFound,
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "not_found");
        assert_eq!(json["row"], 4);
    }
}
