use std::collections::HashMap;

use chrono::NaiveDate;
use tally_core::{HistoryRecord, Money};

use crate::normalize::normalize_description;

/// Comparison key for descriptions: normalized and case-folded.
pub fn description_key(description: &str) -> String {
    normalize_description(description).to_lowercase()
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    amount_cents: i64,
    key: String,
}

/// Read-only lookup over previously stored transactions, built once per
/// import session.
#[derive(Debug, Clone)]
pub struct HistoryIndex {
    categories: HashMap<String, String>,
    by_date: HashMap<NaiveDate, Vec<HistoryEntry>>,
    tolerance_cents: i64,
    len: usize,
}

impl Default for HistoryIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl HistoryIndex {
    pub const DEFAULT_TOLERANCE_CENTS: i64 = 1;

    pub fn empty() -> Self {
        Self {
            categories: HashMap::new(),
            by_date: HashMap::new(),
            tolerance_cents: Self::DEFAULT_TOLERANCE_CENTS,
            len: 0,
        }
    }

    pub fn build(records: &[HistoryRecord]) -> Self {
        Self::with_tolerance(records, Self::DEFAULT_TOLERANCE_CENTS)
    }

    /// The last-used category per description is the one on the latest-dated
    /// record; equal dates go to the record later in `records`.
    pub fn with_tolerance(records: &[HistoryRecord], tolerance_cents: i64) -> Self {
        let mut latest: HashMap<String, (NaiveDate, String)> = HashMap::new();
        let mut by_date: HashMap<NaiveDate, Vec<HistoryEntry>> = HashMap::new();

        for record in records {
            let key = description_key(&record.description);

            if let Some(category) = record
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
            {
                let replace = latest
                    .get(&key)
                    .map_or(true, |(seen, _)| record.date >= *seen);
                if replace {
                    latest.insert(key.clone(), (record.date, category.to_string()));
                }
            }

            by_date.entry(record.date).or_default().push(HistoryEntry {
                amount_cents: record.amount.abs().to_cents(),
                key,
            });
        }

        Self {
            categories: latest
                .into_iter()
                .map(|(key, (_, category))| (key, category))
                .collect(),
            by_date,
            tolerance_cents: tolerance_cents.max(0),
            len: records.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tolerance_cents(&self) -> i64 {
        self.tolerance_cents
    }

    /// Same date and amount magnitude within tolerance, and, when a
    /// description is supplied, the same description key.
    pub fn is_duplicate(&self, date: NaiveDate, amount: Money, description: Option<&str>) -> bool {
        let Some(entries) = self.by_date.get(&date) else {
            return false;
        };
        let cents = amount.abs().to_cents();
        let key = description.map(description_key);
        entries.iter().any(|entry| {
            (entry.amount_cents - cents).abs() <= self.tolerance_cents
                && key.as_ref().map_or(true, |k| *k == entry.key)
        })
    }

    pub fn suggest_category(&self, description: &str) -> Option<&str> {
        self.categories
            .get(&description_key(description))
            .map(String::as_str)
    }

    /// Fills a blank category from history. A non-blank value is returned
    /// untouched.
    pub fn fill_category(&self, current: Option<String>, description: &str) -> Option<String> {
        match current {
            Some(c) if !c.trim().is_empty() => Some(c),
            _ => self.suggest_category(description).map(str::to_string),
        }
    }
}
