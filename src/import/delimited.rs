use std::str::FromStr;

use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::ImportConfig;
use crate::decimal::{Money, MONEY_SCALE};
use crate::errors::{LedgerError, Result};

use super::sniff::{sniff_delimiter, ImportFormat};
use super::{tabulate, Cell, ParsedImport};

const UTF8_BOM: &str = "\u{feff}";

/// decode as utf-8, falling back to latin-1 byte-for-byte
pub fn decode(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            warn!(
                valid_up_to = e.valid_up_to(),
                bytes = bytes.len(),
                "import file is not utf-8, reading it as latin-1"
            );
            bytes.iter().map(|&b| b as char).collect()
        }
    };

    match text.strip_prefix(UTF8_BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// parse delimited text into rows keyed by the located columns
pub fn read_rows(text: &str, config: &ImportConfig) -> Result<ParsedImport> {
    if text.trim().is_empty() {
        return Err(LedgerError::EmptyImport);
    }

    let delimiter = sniff_delimiter(text, config.sniff_lines);
    debug!(delimiter = %(delimiter as char), "delimiter sniffed");

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(
            record
                .iter()
                .map(|field| if field.is_empty() { Cell::Empty } else { Cell::Text(field.to_string()) })
                .collect(),
        );
    }

    tabulate(ImportFormat::Delimited, Some(delimiter), headers, records, config)
}

/// keep only the digits of a borrower identifier
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// parse a money amount written with either decimal separator.
///
/// Currency symbols and spaces are dropped. When both `,` and `.` appear the
/// last one is the decimal separator and the other groups thousands. A lone
/// separator followed by exactly three digits groups thousands, otherwise it
/// is the decimal point. A repeated separator must group in threes. Amounts
/// with more than two decimals are rejected rather than rounded.
pub fn parse_amount(raw: &str) -> Option<Money> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let canonical = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) => {
            let (decimal, grouping) = if comma > dot { (',', '.') } else { ('.', ',') };
            let (whole, fraction) = cleaned.rsplit_once(decimal)?;
            if whole.contains(decimal) || !grouped_in_threes(whole, grouping) {
                return None;
            }
            format!("{}.{}", whole.replace(grouping, ""), fraction)
        }
        (Some(_), None) => single_separator(&cleaned, ',')?,
        (None, Some(_)) => single_separator(&cleaned, '.')?,
        (None, None) => cleaned,
    };

    amount_from_decimal(Decimal::from_str(&canonical).ok()?)
}

/// `separator` is the only separator present
fn single_separator(cleaned: &str, separator: char) -> Option<String> {
    let groups: Vec<&str> = cleaned.split(separator).collect();

    match groups.as_slice() {
        [whole, tail] if tail.len() == 3 => Some(format!("{}{}", whole, tail)),
        [whole, fraction] => Some(format!("{}.{}", whole, fraction)),
        _ if grouped_in_threes(cleaned, separator) => Some(cleaned.replace(separator, "")),
        _ => None,
    }
}

/// every group after the first is exactly three digits
fn grouped_in_threes(whole: &str, separator: char) -> bool {
    whole.split(separator).skip(1).all(|group| group.len() == 3)
}

/// exact cents, or `None` when the value carries sub-cent digits
pub fn amount_from_decimal(value: Decimal) -> Option<Money> {
    if value.normalize().scale() > MONEY_SCALE {
        return None;
    }
    Some(Money::from_decimal(value))
}
