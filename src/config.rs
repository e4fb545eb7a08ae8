use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::Rate;
use crate::errors::{LedgerError, Result};

/// ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// nominal annual rate in percent applied when a loan omits one
    pub default_annual_rate_pct: Decimal,
    /// prefix for generated loan references
    pub reference_prefix: String,
    pub import: ImportConfig,
}

/// bulk import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// lines sampled when sniffing the delimiter
    pub sniff_lines: usize,
    /// header fragments naming the amount column
    pub amount_keywords: Vec<String>,
    /// header fragments naming the borrower identifier column
    pub identifier_keywords: Vec<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_annual_rate_pct: dec!(24),
            reference_prefix: "LN".to_string(),
            import: ImportConfig::default(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            sniff_lines: 5,
            amount_keywords: ["monto", "amount", "importe", "valor", "pago"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            identifier_keywords: ["cedula", "identificacion", "identifier", "documento", "dni", "id"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl LedgerConfig {
    /// load from json, missing keys fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LedgerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_rate(&self) -> Rate {
        Rate::from_percentage(self.default_annual_rate_pct)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_annual_rate_pct < Decimal::ZERO {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("default rate {} is negative", self.default_annual_rate_pct),
            });
        }

        if self.reference_prefix.trim().is_empty() {
            return Err(LedgerError::InvalidConfiguration {
                message: "reference prefix is empty".to_string(),
            });
        }

        self.import.validate()
    }
}

impl ImportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sniff_lines == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "sniff_lines must be at least 1".to_string(),
            });
        }

        let blank = |keywords: &[String]| keywords.is_empty() || keywords.iter().any(|k| k.trim().is_empty());

        if blank(&self.amount_keywords) {
            return Err(LedgerError::InvalidConfiguration {
                message: "amount keywords are empty".to_string(),
            });
        }

        if blank(&self.identifier_keywords) {
            return Err(LedgerError::InvalidConfiguration {
                message: "identifier keywords are empty".to_string(),
            });
        }

        Ok(())
    }
}
