use thiserror::Error;

use crate::columns::ColumnRole;
use crate::extract::ExtractError;
use crate::session::SessionPhase;
use crate::store::StoreError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImportError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Invalid column mapping: missing {}", describe_missing(.missing))]
    InvalidMapping { missing: Vec<ColumnRole> },
    #[error("Row {row}: unparsable date '{value}'")]
    UnparsableDate { row: usize, value: String },
    #[error("Text extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractError),
    #[error("No transactions found; the statement layout was not recognized")]
    NoTransactionsFound,
    #[error("Row {row}: failed to persist transaction: {source}")]
    PersistenceFailure {
        row: usize,
        #[source]
        source: StoreError,
    },
    #[error("Transaction history unavailable: {0}")]
    HistoryUnavailable(#[source] StoreError),
    #[error("No transactions are selected for import")]
    NothingSelected,
    #[error("Cannot {operation} while the import is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionPhase,
    },
    #[error("Row {0} does not exist")]
    RowOutOfRange(usize),
}

fn describe_missing(roles: &[ColumnRole]) -> String {
    roles
        .iter()
        .map(|role| match role {
            ColumnRole::Amount => "amount (or debit/credit)".to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
