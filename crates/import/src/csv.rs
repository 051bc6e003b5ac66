use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::str::FromStr;
use tally_core::{Money, RowIssue, TransactionCandidate, TransactionKind};
use tracing::debug;

use crate::columns::{AmountConvention, ColumnMapping, ColumnRole};
use crate::error::ImportError;
use crate::history::HistoryIndex;
use crate::normalize::normalize_description;

/// One input line split into trimmed fields.
pub type RawRow = Vec<String>;

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Picks the candidate separator seen most often outside quotes on the
/// first non-blank line. Ties go to the earlier candidate; `,` when none
/// appear.
pub fn sniff_delimiter(text: &str) -> u8 {
    let Some(line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return b',';
    };

    let mut counts = [0usize; DELIMITER_CANDIDATES.len()];
    let mut in_quotes = false;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(i) = DELIMITER_CANDIDATES.iter().position(|d| *d == byte) {
                counts[i] += 1;
            }
        }
    }

    let mut best = 0;
    for i in 1..counts.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    if counts[best] == 0 {
        b','
    } else {
        DELIMITER_CANDIDATES[best]
    }
}

/// Drops whitespace at the start of each unquoted field, so a padded
/// field like `, "Acme, Inc."` still opens a quote for the csv reader.
fn strip_field_padding(text: &str, delimiter: u8) -> Cow<'_, str> {
    if !text.contains([' ', '\t']) {
        return Cow::Borrowed(text);
    }
    let delimiter = char::from(delimiter);
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_quotes = false;
    let mut field_start = true;

    while let Some(c) = chars.next() {
        if in_quotes {
            out.push(c);
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    out.push('"');
                } else {
                    in_quotes = false;
                }
            }
            continue;
        }
        if c == delimiter || c == '\n' || c == '\r' {
            field_start = true;
        } else if field_start && matches!(c, ' ' | '\t') {
            continue;
        } else {
            in_quotes = field_start && c == '"';
            field_start = false;
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Split delimited text into rows of trimmed fields. Line endings are
/// normalized and blank lines dropped; quoted fields may contain the
/// separator and use `""` for a literal quote, with or without padding
/// before the opening quote. At least a header and one data row are
/// required.
pub fn tokenize(text: &str, delimiter: Option<u8>) -> Result<Vec<RawRow>, ImportError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(text));
    let text = strip_field_padding(text, delimiter);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ImportError::MalformedInput(e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect::<RawRow>());
    }

    if rows.len() < 2 {
        return Err(ImportError::MalformedInput(format!(
            "expected a header and at least one data row, found {} row(s)",
            rows.len()
        )));
    }

    Ok(rows)
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Generic calendar-date parsing. Month-first wins for ambiguous slashed
/// dates; day-first is tried when month-first is impossible.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let parse_plain = |s: &str| {
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    };

    parse_plain(s)
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            let (head, _) = s.split_once(['T', ' '])?;
            parse_plain(head)
        })
}

/// Magnitudes at or above this many dollars are not treated as money.
const AMOUNT_LIMIT: i64 = 1_000_000_000_000;

/// Parse a money field: currency symbols, thousands separators and spaces
/// are ignored; `(12.00)` and `12.00-` are negative. `None` for blank or
/// unreadable input, and for magnitudes of a trillion dollars or more.
pub fn parse_amount(raw: &str) -> Option<Money> {
    let s = raw.trim();
    let parenthesized = s.strip_prefix('(').and_then(|v| v.strip_suffix(')'));
    let (negative, s) = if let Some(inner) = parenthesized {
        (true, inner)
    } else if let Some(inner) = s.strip_suffix('-') {
        (true, inner)
    } else {
        (false, s)
    };

    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | ' ' | '+'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let mut dec = Decimal::from_str(&cleaned).ok()?;
    if dec.abs() >= Decimal::from(AMOUNT_LIMIT) {
        debug!("Ignoring out-of-range amount {raw:?}");
        return None;
    }
    if negative {
        dec = -dec;
    }
    Some(Money::from_decimal(dec))
}

/// Turns tokenized data rows into candidates for one mapping and sign
/// convention, resolving duplicates and categories against history.
pub struct RowNormalizer<'a> {
    mapping: &'a ColumnMapping,
    convention: AmountConvention,
    history: &'a HistoryIndex,
    source_tag: &'a str,
}

impl<'a> RowNormalizer<'a> {
    pub fn new(
        mapping: &'a ColumnMapping,
        convention: AmountConvention,
        history: &'a HistoryIndex,
        source_tag: &'a str,
    ) -> Self {
        Self {
            mapping,
            convention,
            history,
            source_tag,
        }
    }

    /// Data rows only (no header). Output keeps input order; rows that are
    /// blank, or have both an unparsable date and a zero amount, are dropped.
    pub fn normalize(&self, rows: &[RawRow]) -> Vec<TransactionCandidate> {
        rows.iter()
            .enumerate()
            .filter_map(|(i, row)| self.normalize_row(i, row))
            .collect()
    }

    pub fn normalize_row(&self, index: usize, row: &RawRow) -> Option<TransactionCandidate> {
        if row.iter().all(|f| f.trim().is_empty()) {
            return None;
        }

        let field = |role: ColumnRole| {
            self.mapping
                .column(role)
                .and_then(|col| row.get(col))
                .map(|s| s.trim())
                .unwrap_or_default()
        };

        let raw_date = field(ColumnRole::Date);
        let date = parse_date(raw_date);
        let raw_description = field(ColumnRole::Description).to_string();

        let (amount, kind) = if self.mapping.uses_amount_column() {
            let signed = parse_amount(field(ColumnRole::Amount)).unwrap_or_else(Money::zero);
            (signed.abs(), self.convention.kind_of(signed))
        } else {
            let credit = parse_amount(field(ColumnRole::Credit)).unwrap_or_else(Money::zero);
            let debit = parse_amount(field(ColumnRole::Debit)).unwrap_or_else(Money::zero);
            if credit.is_positive() {
                (credit, TransactionKind::Income)
            } else {
                (debit.abs(), TransactionKind::Expense)
            }
        };

        if date.is_none() && amount.is_zero() {
            debug!("Dropping row {index}: no date and no amount");
            return None;
        }

        let mapped_category = Some(field(ColumnRole::Category).to_string());
        let category = self.history.fill_category(mapped_category, &raw_description);
        let duplicate =
            date.is_some_and(|d| self.history.is_duplicate(d, amount, Some(&raw_description)));

        let mut candidate = TransactionCandidate {
            row: index,
            date,
            cleaned_description: normalize_description(&raw_description),
            raw_description,
            amount,
            kind,
            category,
            transaction_type: None,
            included: false,
            duplicate,
            source_tag: self.source_tag.to_string(),
            issue: date
                .is_none()
                .then(|| RowIssue::UnparsableDate(raw_date.to_string())),
        };
        candidate.included = candidate.is_new();
        Some(candidate)
    }
}
