use std::io::Cursor;
use std::str::FromStr;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::ImportConfig;
use crate::errors::{LedgerError, Result};

use super::sniff::ImportFormat;
use super::{tabulate, Cell, ParsedImport};

/// read the first worksheet: first row is the header, blank rows are dropped
pub fn read_rows(bytes: &[u8], format: ImportFormat, config: &ImportConfig) -> Result<ParsedImport> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| {
        warn!(error = %e, format = format.name(), "workbook could not be opened");
        LedgerError::UnsupportedFormat {
            detected: format.name().to_string(),
        }
    })?;

    let sheet = workbook.sheet_names().first().cloned().unwrap_or_default();
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(LedgerError::EmptyImport)??;
    debug!(sheet = %sheet, size = ?range.get_size(), "reading first worksheet");

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(to_cell).collect::<Vec<_>>())
        .filter(|cells| !cells.iter().all(Cell::is_empty));

    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(Cell::text).collect(),
        None => return Err(LedgerError::EmptyImport),
    };
    let records: Vec<Vec<Cell>> = rows.collect();

    tabulate(format, None, headers, records, config)
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(value) => Cell::Number(Decimal::from(*value)),
        // shortest round-trip text of the float, so 1113.27 stays 1113.27
        Data::Float(value) => match Decimal::from_str(&value.to_string()) {
            Ok(decimal) => Cell::Number(decimal),
            Err(_) => Cell::Text(value.to_string()),
        },
        Data::String(text) => Cell::Text(text.clone()),
        other => Cell::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::decimal::Money;

    #[test]
    fn test_numeric_cells() {
        assert_eq!(to_cell(&Data::Int(1500)), Cell::Number(dec!(1500)));
        assert_eq!(to_cell(&Data::Float(1113.27)), Cell::Number(dec!(1113.27)));
        assert_eq!(to_cell(&Data::Float(0.1 + 0.2)).amount(), None);
        assert_eq!(to_cell(&Data::Float(f64::NAN)).amount(), None);
        assert_eq!(to_cell(&Data::Empty), Cell::Empty);
        assert_eq!(
            to_cell(&Data::String("1.234,50".to_string())).amount(),
            Some(Money::from_decimal(dec!(1234.50)))
        );
    }

    #[test]
    fn test_garbage_behind_zip_magic() {
        let err = read_rows(b"PK\x03\x04not a zip", ImportFormat::Xlsx, &ImportConfig::default()).unwrap_err();
        assert!(matches!(err, LedgerError::UnsupportedFormat { .. }));
    }
}
