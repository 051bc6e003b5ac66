use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Income => write!(f, "income"),
            TransactionKind::Expense => write!(f, "expense"),
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(format!("Unknown transaction kind: '{other}'")),
        }
    }
}

/// Statement-line classification. Only the statement path assigns one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionTypeTag {
    Recurring,
    Debit,
    TransferIn,
    CheckDeposit,
    CashWithdrawal,
    BillPay,
    Refund,
    Other,
}

impl TransactionTypeTag {
    pub const ALL: [TransactionTypeTag; 8] = [
        TransactionTypeTag::Recurring,
        TransactionTypeTag::Debit,
        TransactionTypeTag::TransferIn,
        TransactionTypeTag::CheckDeposit,
        TransactionTypeTag::CashWithdrawal,
        TransactionTypeTag::BillPay,
        TransactionTypeTag::Refund,
        TransactionTypeTag::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionTypeTag::Recurring => "recurring",
            TransactionTypeTag::Debit => "debit",
            TransactionTypeTag::TransferIn => "transfer_in",
            TransactionTypeTag::CheckDeposit => "check_deposit",
            TransactionTypeTag::CashWithdrawal => "cash_withdrawal",
            TransactionTypeTag::BillPay => "bill_pay",
            TransactionTypeTag::Refund => "refund",
            TransactionTypeTag::Other => "other",
        }
    }
}

impl fmt::Display for TransactionTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionTypeTag {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionTypeTag::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown transaction type: '{s}'"))
    }
}

/// Per-row problem that keeps a candidate out of the commit without
/// aborting the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssue {
    UnparsableDate(String),
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIssue::UnparsableDate(raw) => write!(f, "unparsable date '{raw}'"),
        }
    }
}

/// An imported, not-yet-persisted transaction awaiting review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCandidate {
    /// Zero-based position of the source row (data row or statement line)
    /// among the rows the parser read.
    pub row: usize,
    pub date: Option<NaiveDate>,
    pub raw_description: String,
    pub cleaned_description: String,
    /// Always a non-negative magnitude; direction lives in `kind`.
    pub amount: Money,
    pub kind: TransactionKind,
    pub category: Option<String>,
    pub transaction_type: Option<TransactionTypeTag>,
    pub included: bool,
    pub duplicate: bool,
    pub source_tag: String,
    pub issue: Option<RowIssue>,
}

impl TransactionCandidate {
    /// Income positive, expense negative.
    pub fn signed_amount(&self) -> Money {
        match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense => Money::zero() - self.amount,
        }
    }

    /// Whether the row passes the default inclusion rule: dated, positive
    /// and not already on record.
    pub fn is_new(&self) -> bool {
        self.date.is_some() && self.amount.is_positive() && !self.duplicate
    }

    /// Builds the record handed to storage. `None` for rows without a date.
    pub fn to_new_transaction(&self, profile_id: &str) -> Option<NewTransaction> {
        Some(NewTransaction {
            profile_id: profile_id.to_string(),
            date: self.date?,
            description: self.cleaned_description.clone(),
            raw_description: self.raw_description.clone(),
            amount: self.amount,
            kind: self.kind,
            category: self.category.clone(),
            transaction_type: self.transaction_type,
            source_tag: self.source_tag.clone(),
        })
    }
}

/// A previously stored transaction as the persistence adapter reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
    pub category: Option<String>,
}

/// A record ready to be created by the persistence adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub profile_id: String,
    pub date: NaiveDate,
    pub description: String,
    pub raw_description: String,
    pub amount: Money,
    pub kind: TransactionKind,
    pub category: Option<String>,
    pub transaction_type: Option<TransactionTypeTag>,
    pub source_tag: String,
}

impl NewTransaction {
    /// The history view of this record once stored; expenses are negative.
    pub fn to_history_record(&self) -> HistoryRecord {
        let amount = match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense => Money::zero() - self.amount,
        };
        HistoryRecord {
            date: self.date,
            amount,
            description: self.description.clone(),
            category: self.category.clone(),
        }
    }
}
