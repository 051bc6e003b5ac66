pub mod money;
pub mod period;
pub mod transaction;

pub use money::Money;
pub use period::{DateRange, StatementMonth};
pub use transaction::{
    HistoryRecord, NewTransaction, RowIssue, TransactionCandidate, TransactionKind,
    TransactionTypeTag,
};
