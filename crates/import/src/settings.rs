use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::columns::AmountConvention;
use crate::history::HistoryIndex;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Delimiter must be a single ASCII character, got {0:?}")]
    InvalidDelimiter(char),
}

/// Import tuning, typically read from an `import.toml`. Every field is
/// optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Field separator for delimited text; sniffed from the header when unset.
    pub delimiter: Option<char>,
    pub default_convention: AmountConvention,
    pub duplicate_tolerance_cents: i64,
    pub delimited_source_tag: String,
    pub statement_source_tag: String,
    /// Year for statements without a period marker. Current year when unset.
    pub fallback_year: Option<i32>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            delimiter: None,
            default_convention: AmountConvention::NegativeIsExpense,
            duplicate_tolerance_cents: HistoryIndex::DEFAULT_TOLERANCE_CENTS,
            delimited_source_tag: "csv_import".to_string(),
            statement_source_tag: "statement_import".to_string(),
            fallback_year: None,
        }
    }
}

impl ImportSettings {
    pub fn from_toml(toml_content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(toml_content)?;
        settings.delimiter_byte()?;
        Ok(settings)
    }

    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn delimiter_byte(&self) -> Result<Option<u8>, SettingsError> {
        match self.delimiter {
            None => Ok(None),
            Some(c) if c.is_ascii() && c != '"' && c != '\n' && c != '\r' => Ok(Some(c as u8)),
            Some(c) => Err(SettingsError::InvalidDelimiter(c)),
        }
    }
}
