use serde::{Deserialize, Serialize};
use std::fmt;
use tally_core::{Money, TransactionKind};

use crate::error::ImportError;
use crate::util::{first_match, KeywordTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    #[default]
    Skip,
    Date,
    Description,
    Amount,
    Debit,
    Credit,
    Category,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Skip => write!(f, "skip"),
            ColumnRole::Date => write!(f, "date"),
            ColumnRole::Description => write!(f, "description"),
            ColumnRole::Amount => write!(f, "amount"),
            ColumnRole::Debit => write!(f, "debit"),
            ColumnRole::Credit => write!(f, "credit"),
            ColumnRole::Category => write!(f, "category"),
        }
    }
}

/// Header keyword families, checked in order. Debit and credit sit above
/// amount so "Debit Amount" is a debit column.
const ROLE_KEYWORDS: &KeywordTable<ColumnRole> = &[
    (ColumnRole::Date, &["date", "posted", "posting", "time"]),
    (ColumnRole::Debit, &["debit", "withdrawal", "money out", "paid out"]),
    (ColumnRole::Credit, &["credit", "deposit", "money in", "paid in"]),
    (ColumnRole::Amount, &["amount", "amt", "value", "total"]),
    (ColumnRole::Category, &["category", "class"]),
    (
        ColumnRole::Description,
        &["description", "desc", "payee", "merchant", "memo", "narrative", "name"],
    ),
];

/// Guess a single header's role. Unrecognized headers are skipped.
pub fn infer_role(header: &str) -> ColumnRole {
    first_match(ROLE_KEYWORDS, header).unwrap_or_default()
}

/// How to read the sign of a single amount column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountConvention {
    #[default]
    NegativeIsExpense,
    PositiveIsExpense,
}

impl AmountConvention {
    /// A zero amount reads as an expense under either convention.
    pub fn kind_of(self, signed: Money) -> TransactionKind {
        let expense = match self {
            AmountConvention::NegativeIsExpense => !signed.is_positive(),
            AmountConvention::PositiveIsExpense => !signed.is_negative(),
        };
        if expense {
            TransactionKind::Expense
        } else {
            TransactionKind::Income
        }
    }
}

/// Column index → role. Indices past the end read as `Skip`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnMapping {
    roles: Vec<ColumnRole>,
}

impl ColumnMapping {
    pub fn new(roles: Vec<ColumnRole>) -> Self {
        Self { roles }
    }

    /// Initial mapping from a header row. Each role is given to the first
    /// column that matches it; later matches stay `Skip`.
    pub fn infer(headers: &[String]) -> Self {
        let mut mapping = Self::new(Vec::with_capacity(headers.len()));
        for header in headers {
            let role = infer_role(header);
            if role != ColumnRole::Skip && mapping.has(role) {
                mapping.roles.push(ColumnRole::Skip);
            } else {
                mapping.roles.push(role);
            }
        }
        mapping
    }

    pub fn roles(&self) -> &[ColumnRole] {
        &self.roles
    }

    pub fn role(&self, index: usize) -> ColumnRole {
        self.roles.get(index).copied().unwrap_or_default()
    }

    /// Caller override for one column.
    pub fn set(&mut self, index: usize, role: ColumnRole) {
        if index >= self.roles.len() {
            self.roles.resize(index + 1, ColumnRole::Skip);
        }
        self.roles[index] = role;
    }

    /// First column carrying `role`.
    pub fn column(&self, role: ColumnRole) -> Option<usize> {
        self.roles.iter().position(|r| *r == role)
    }

    pub fn has(&self, role: ColumnRole) -> bool {
        self.column(role).is_some()
    }

    /// Whether amounts come from a single signed column. Amount wins over
    /// debit/credit when both are mapped.
    pub fn uses_amount_column(&self) -> bool {
        self.has(ColumnRole::Amount)
    }

    /// Roles a valid mapping still lacks. `Amount` stands in for the whole
    /// amount group (amount, or debit and/or credit).
    pub fn missing_roles(&self) -> Vec<ColumnRole> {
        let mut missing = Vec::new();
        if !self.has(ColumnRole::Date) {
            missing.push(ColumnRole::Date);
        }
        if !self.has(ColumnRole::Description) {
            missing.push(ColumnRole::Description);
        }
        if !(self.has(ColumnRole::Amount)
            || self.has(ColumnRole::Debit)
            || self.has(ColumnRole::Credit))
        {
            missing.push(ColumnRole::Amount);
        }
        missing
    }

    pub fn is_valid(&self) -> bool {
        self.missing_roles().is_empty()
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        let missing = self.missing_roles();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ImportError::InvalidMapping { missing })
        }
    }
}
