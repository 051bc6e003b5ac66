use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use tally_core::{HistoryRecord, NewTransaction};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// The persistence collaborator: supplies a profile's transaction history
/// and creates new records one at a time.
#[allow(async_fn_in_trait)]
pub trait TransactionStore {
    async fn list_history(&self, profile_id: &str) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Returns the id of the stored record.
    async fn create_transaction(&self, record: &NewTransaction) -> Result<i64, StoreError>;
}

type FailPredicate = Box<dyn Fn(&NewTransaction) -> bool>;

/// In-memory store. Created records show up in later history reads.
#[derive(Default)]
pub struct MemoryStore {
    history: RefCell<HashMap<String, Vec<HistoryRecord>>>,
    created: RefCell<Vec<(i64, NewTransaction)>>,
    next_id: Cell<i64>,
    fail_on: Option<FailPredicate>,
    history_error: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(profile_id: &str, records: Vec<HistoryRecord>) -> Self {
        let store = Self::new();
        store
            .history
            .borrow_mut()
            .insert(profile_id.to_string(), records);
        store
    }

    /// Reject every record matching `predicate`.
    pub fn fail_on(mut self, predicate: impl Fn(&NewTransaction) -> bool + 'static) -> Self {
        self.fail_on = Some(Box::new(predicate));
        self
    }

    /// Make history reads fail with `message`.
    pub fn fail_history(mut self, message: impl Into<String>) -> Self {
        self.history_error = Some(message.into());
        self
    }

    /// Records created so far, with their ids, in creation order.
    pub fn created(&self) -> Vec<(i64, NewTransaction)> {
        self.created.borrow().clone()
    }
}

impl TransactionStore for MemoryStore {
    async fn list_history(&self, profile_id: &str) -> Result<Vec<HistoryRecord>, StoreError> {
        if let Some(message) = &self.history_error {
            return Err(StoreError::Backend(message.clone()));
        }
        Ok(self
            .history
            .borrow()
            .get(profile_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_transaction(&self, record: &NewTransaction) -> Result<i64, StoreError> {
        if self.fail_on.as_ref().is_some_and(|reject| reject(record)) {
            return Err(StoreError::Rejected(format!(
                "{} on {}",
                record.description, record.date
            )));
        }

        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.history
            .borrow_mut()
            .entry(record.profile_id.clone())
            .or_default()
            .push(record.to_history_record());
        self.created.borrow_mut().push((id, record.clone()));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::{Money, TransactionKind};

    fn record(profile: &str, desc: &str, cents: i64) -> NewTransaction {
        NewTransaction {
            profile_id: profile.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            description: desc.to_string(),
            raw_description: desc.to_string(),
            amount: Money::from_cents(cents),
            kind: TransactionKind::Expense,
            category: None,
            transaction_type: None,
            source_tag: "csv_import".to_string(),
        }
    }

    #[tokio::test]
    async fn history_is_per_profile() {
        let store = MemoryStore::with_history(
            "a",
            vec![HistoryRecord {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                amount: Money::from_cents(-100),
                description: "Bakery".into(),
                category: Some("Food".into()),
            }],
        );
        assert_eq!(store.list_history("a").await.unwrap().len(), 1);
        assert!(store.list_history("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_records_join_history() {
        let store = MemoryStore::new();
        let first = store.create_transaction(&record("a", "Grocery Store", 5432)).await.unwrap();
        let second = store.create_transaction(&record("a", "Bakery", 300)).await.unwrap();
        assert_eq!((first, second), (1, 2));

        let history = store.list_history("a").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, Money::from_cents(-5432));
        assert_eq!(store.created().len(), 2);
    }

    #[tokio::test]
    async fn fail_on_rejects_matching_records() {
        let store = MemoryStore::new().fail_on(|r| r.description == "Bakery");
        assert!(store.create_transaction(&record("a", "Grocery Store", 1)).await.is_ok());
        assert!(matches!(
            store.create_transaction(&record("a", "Bakery", 1)).await,
            Err(StoreError::Rejected(_))
        ));
        assert_eq!(store.created().len(), 1);
    }

    #[tokio::test]
    async fn fail_history_surfaces_backend_error() {
        let store = MemoryStore::new().fail_history("offline");
        assert_eq!(
            store.list_history("a").await,
            Err(StoreError::Backend("offline".into()))
        );
    }
}
