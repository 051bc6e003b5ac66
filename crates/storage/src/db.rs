use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tally_core::{HistoryRecord, Money, NewTransaction, TransactionKind};
use tally_import::{StoreError, TransactionStore};
use tracing::debug;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_id TEXT NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            raw_description TEXT NOT NULL,
            amount_cents INTEGER NOT NULL CHECK (amount_cents >= 0),
            kind TEXT NOT NULL CHECK (kind IN ('income', 'expense')),
            category TEXT,
            transaction_type TEXT,
            source_tag TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_profile_date \
         ON transactions (profile_id, date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_transaction(
    pool: &DbPool,
    record: &NewTransaction,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO transactions (
            profile_id, date, description, raw_description, amount_cents,
            kind, category, transaction_type, source_tag
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.profile_id)
    .bind(record.date)
    .bind(&record.description)
    .bind(&record.raw_description)
    .bind(record.amount.to_cents())
    .bind(record.kind.to_string())
    .bind(record.category.as_deref())
    .bind(record.transaction_type.map(|t| t.as_str()))
    .bind(&record.source_tag)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// History in date order. Expense amounts come back negative.
pub async fn list_history(
    pool: &DbPool,
    profile_id: &str,
) -> Result<Vec<HistoryRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (NaiveDate, i64, String, String, Option<String>)>(
        r#"
        SELECT date, amount_cents, kind, description, category
        FROM transactions
        WHERE profile_id = ?
        ORDER BY date, id
        "#,
    )
    .bind(profile_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| -> Result<HistoryRecord, sqlx::Error> {
            let kind = TransactionKind::from_str(&r.2)
                .map_err(|e| sqlx::Error::Decode(e.into()))?;
            let cents = match kind {
                TransactionKind::Income => r.1,
                TransactionKind::Expense => -r.1,
            };
            Ok(HistoryRecord {
                date: r.0,
                amount: Money::from_cents(cents),
                description: r.3,
                category: r.4,
            })
        })
        .collect()
}

/// [`TransactionStore`] over a SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        Ok(Self::new(create_db(path).await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db) => StoreError::Rejected(db.message().to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

impl TransactionStore for SqliteStore {
    async fn list_history(&self, profile_id: &str) -> Result<Vec<HistoryRecord>, StoreError> {
        list_history(&self.pool, profile_id).await.map_err(store_error)
    }

    async fn create_transaction(&self, record: &NewTransaction) -> Result<i64, StoreError> {
        let id = insert_transaction(&self.pool, record)
            .await
            .map_err(store_error)?;
        debug!("Inserted transaction {id} for {}", record.profile_id);
        Ok(id)
    }
}
