pub mod db;

pub use db::{create_db, insert_transaction, list_history, DbPool, SqliteStore};
