//! Statement text parser for the one supported checking-statement layout:
//! a `<Month> d, yyyy through <Month> d, yyyy` period marker and a
//! `TRANSACTION DETAIL` section of `MM/DD description amount [balance]` lines.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tally_core::{
    DateRange, Money, RowIssue, StatementMonth, TransactionCandidate, TransactionKind,
    TransactionTypeTag,
};
use tracing::debug;

use crate::classify::classify;
use crate::csv::{parse_amount, parse_date};
use crate::error::ImportError;
use crate::history::HistoryIndex;
use crate::normalize::normalize_description;
use crate::util::collapse_whitespace;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_period, concat!(
    r"(?i)([a-z]{3,9}\.?\s+\d{1,2},\s*\d{4})",
    r"\s*(?:through|to|-|–)\s*",
    r"([a-z]{3,9}\.?\s+\d{1,2},\s*\d{4})"
));
re!(re_section_start, r"(?i)^(?:\*start\*)?transaction\s+detail");
re!(re_section_end, r"(?i)^(?:ending\s+balance|total\b)");
// Column headers, summary rows and page furniture inside the section.
re!(re_skip,
    r"(?i)^(?:beginning\s+balance|date\s+description|\*(?:start|end)\*|page\s+\d+\s+of\s+\d+$)");
re!(re_txn_line, concat!(
    r"^(0?[1-9]|1[0-2])/(0?[1-9]|[12]\d|3[01])\s+(.+?)",
    r"\s+(-?\$?-?[\d,]*\d\.\d{2})(?:\s+(-?\$?-?[\d,]*\d\.\d{2}))?\s*$"
));

/// One recognized transaction line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub row: usize,
    /// `None` when `MM/DD` is not a real day in the inferred year.
    pub date: Option<NaiveDate>,
    pub raw_date: String,
    pub description: String,
    /// Signed as printed: deposits positive, withdrawals negative.
    pub amount: Money,
    pub balance: Option<Money>,
    pub transaction_type: TransactionTypeTag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub period: Option<DateRange>,
    pub statement_month: StatementMonth,
    pub lines: Vec<StatementLine>,
}

/// Candidates for review plus the statement they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementExtraction {
    pub statement_month: StatementMonth,
    pub period: Option<DateRange>,
    pub candidates: Vec<TransactionCandidate>,
}

struct PendingLine {
    month: u32,
    day: u32,
    description: String,
    amount: Money,
    balance: Option<Money>,
}

fn find_period(text: &str) -> Option<DateRange> {
    text.lines().find_map(|line| {
        let caps = re_period().captures(line)?;
        let start = parse_period_date(caps.get(1)?.as_str())?;
        let end = parse_period_date(caps.get(2)?.as_str())?;
        (start <= end).then(|| DateRange::new(start, end))
    })
}

fn parse_period_date(raw: &str) -> Option<NaiveDate> {
    parse_date(&collapse_whitespace(&raw.replace('.', "")))
}

/// Parse extracted statement text. Dates take the period-end year, except
/// months after the period-end month, which belong to the year before.
/// Without a period marker every date uses `fallback_year`.
pub fn parse_statement(text: &str, fallback_year: i32) -> Result<ParsedStatement, ImportError> {
    let period = find_period(text);

    let mut pending: Vec<PendingLine> = Vec::new();
    let mut in_section = false;
    for raw_line in text.lines() {
        let line = collapse_whitespace(raw_line);
        if line.is_empty() {
            continue;
        }
        if re_section_start().is_match(&line) {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }
        if re_section_end().is_match(&line) {
            in_section = false;
            continue;
        }
        if re_skip().is_match(&line) {
            continue;
        }

        if let Some(caps) = re_txn_line().captures(&line) {
            let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
            let amount = caps.get(4).and_then(|m| parse_amount(m.as_str()));
            if let (Some(month), Some(day), Some(amount)) = (number(1), number(2), amount) {
                pending.push(PendingLine {
                    month,
                    day,
                    description: caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
                    amount,
                    balance: caps.get(5).and_then(|m| parse_amount(m.as_str())),
                });
                continue;
            }
        }

        if let Some(last) = pending.last_mut() {
            last.description = format!("{} {}", last.description, line);
        } else {
            debug!("Ignoring statement line before first transaction: {line}");
        }
    }

    if pending.is_empty() {
        return Err(ImportError::NoTransactionsFound);
    }

    let year_of = |month: u32| match period {
        Some(p) if month > p.end.month() => p.end.year() - 1,
        Some(p) => p.end.year(),
        None => fallback_year,
    };

    let lines: Vec<StatementLine> = pending
        .into_iter()
        .enumerate()
        .map(|(row, p)| StatementLine {
            row,
            date: NaiveDate::from_ymd_opt(year_of(p.month), p.month, p.day),
            raw_date: format!("{:02}/{:02}", p.month, p.day),
            transaction_type: classify(&p.description),
            description: p.description,
            amount: p.amount,
            balance: p.balance,
        })
        .collect();

    let statement_month = match period {
        Some(p) => StatementMonth::of(p.end),
        None => lines
            .iter()
            .filter_map(|l| l.date)
            .max()
            .map(StatementMonth::of)
            .ok_or(ImportError::NoTransactionsFound)?,
    };

    debug!(
        "Parsed statement {statement_month}: {} line(s), period {}",
        lines.len(),
        period.map(|p| p.to_string()).unwrap_or_else(|| "unknown".into())
    );

    Ok(ParsedStatement {
        period,
        statement_month,
        lines,
    })
}

impl ParsedStatement {
    /// Resolve each line against history. Lines with an impossible date and
    /// a zero amount are dropped.
    pub fn into_extraction(self, history: &HistoryIndex, source_tag: &str) -> StatementExtraction {
        let candidates = self
            .lines
            .into_iter()
            .filter(|line| line.date.is_some() || !line.amount.is_zero())
            .map(|line| {
                let amount = line.amount.abs();
                let duplicate = line
                    .date
                    .is_some_and(|d| history.is_duplicate(d, amount, Some(&line.description)));
                let mut candidate = TransactionCandidate {
                    row: line.row,
                    date: line.date,
                    cleaned_description: normalize_description(&line.description),
                    category: history.fill_category(None, &line.description),
                    amount,
                    kind: if line.amount.is_positive() {
                        TransactionKind::Income
                    } else {
                        TransactionKind::Expense
                    },
                    transaction_type: Some(line.transaction_type),
                    included: false,
                    duplicate,
                    source_tag: source_tag.to_string(),
                    issue: line
                        .date
                        .is_none()
                        .then(|| RowIssue::UnparsableDate(line.raw_date.clone())),
                    raw_description: line.description,
                };
                candidate.included = candidate.is_new();
                candidate
            })
            .collect();

        StatementExtraction {
            statement_month: self.statement_month,
            period: self.period,
            candidates,
        }
    }
}
