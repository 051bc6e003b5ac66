pub mod classify;
pub mod columns;
pub mod csv;
pub mod error;
pub mod extract;
pub mod history;
pub mod normalize;
pub mod session;
pub mod settings;
pub mod statement;
pub mod store;
pub(crate) mod util;

pub use columns::{AmountConvention, ColumnMapping, ColumnRole};
pub use csv::{RawRow, RowNormalizer};
pub use error::ImportError;
pub use extract::{ExtractError, StaticTextExtractor, TextExtractor, Utf8TextExtractor};
#[cfg(feature = "pdf")]
pub use extract::pdf_backend::PdfTextExtractor;
pub use history::HistoryIndex;
pub use normalize::normalize_description;
pub use session::{CommitReport, ImportSession, ReviewSummary, RowCommit, SessionPhase};
pub use settings::{ImportSettings, SettingsError};
pub use statement::{ParsedStatement, StatementExtraction, StatementLine};
pub use store::{MemoryStore, StoreError, TransactionStore};

