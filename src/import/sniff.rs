use crate::config::ImportConfig;
use crate::errors::{LedgerError, Result};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// container format of an uploaded payment file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Delimited,
    Xlsx,
    Xls,
}

impl ImportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ImportFormat::Delimited => "delimited text",
            ImportFormat::Xlsx => "xlsx workbook",
            ImportFormat::Xls => "xls workbook",
        }
    }
}

/// detect the format from the leading bytes
pub fn detect_format(bytes: &[u8]) -> ImportFormat {
    if bytes.starts_with(ZIP_MAGIC) {
        ImportFormat::Xlsx
    } else if bytes.starts_with(OLE_MAGIC) {
        ImportFormat::Xls
    } else {
        ImportFormat::Delimited
    }
}

/// pick `;` or `,` by counting both over the first non-empty lines
pub fn sniff_delimiter(text: &str, sample_lines: usize) -> u8 {
    let (commas, semicolons) = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(sample_lines)
        .fold((0usize, 0usize), |(c, s), line| {
            (
                c + line.matches(',').count(),
                s + line.matches(';').count(),
            )
        });

    if semicolons > commas { b';' } else { b',' }
}

/// lower-case, fold accents, collapse everything else to single spaces
pub fn normalize_header(header: &str) -> String {
    let folded: String = header
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_accent)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// find the single header matching one of `keywords`.
///
/// Exact matches on the normalized header win. Only when there is none does
/// the lookup fall back to substring matching. Either pass fails with
/// `AmbiguousColumns` when it finds more than one header.
pub fn locate_column(
    headers: &[String],
    keywords: &[String],
    column: &'static str,
) -> Result<usize> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let keywords: Vec<String> = keywords.iter().map(|k| normalize_header(k)).collect();

    let exact: Vec<usize> = normalized
        .iter()
        .enumerate()
        .filter(|(_, h)| keywords.iter().any(|k| *h == k))
        .map(|(i, _)| i)
        .collect();

    let candidates = if exact.is_empty() {
        normalized
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty() && keywords.iter().any(|k| h.contains(k.as_str())))
            .map(|(i, _)| i)
            .collect()
    } else {
        exact
    };

    match candidates.as_slice() {
        [] => Err(LedgerError::MissingColumn { column }),
        [index] => Ok(*index),
        many => Err(LedgerError::AmbiguousColumns {
            column,
            candidates: many.iter().map(|&i| headers[i].clone()).collect(),
        }),
    }
}

/// indexes of the amount and identifier columns
pub fn locate_columns(headers: &[String], config: &ImportConfig) -> Result<(usize, usize)> {
    let amount = locate_column(headers, &config.amount_keywords, "amount")?;
    let identifier = locate_column(headers, &config.identifier_keywords, "identifier")?;

    if amount == identifier {
        return Err(LedgerError::ColumnsCoincide {
            header: headers[amount].clone(),
        });
    }

    Ok((amount, identifier))
}
