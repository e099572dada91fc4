//! SQLite database layer (embedded, no external dependencies)

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::error::StoreError;

/// A user aggregate as returned by lookups. The address list is empty,
/// never absent, when the user has no addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub addresses: Vec<String>,
}

/// Input for user creation. The identifier is caller-supplied.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub addresses: Vec<String>,
}

pub struct Database {
    pool: Arc<SqlitePool>,
}

impl Database {
    pub async fn new(database_path: &str) -> Result<Self> {
        tracing::info!("Opening SQLite database at: {}", database_path);

        // Create parent directory if needed
        if let Some(parent) = std::path::Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| {
                format!("Failed to connect to SQLite database at: {}", database_path)
            })?;

        // Run migrations (inline for simplicity)
        Self::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        tracing::info!("Database initialization complete");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        // Users table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Addresses table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS addresses (
                uid INTEGER NOT NULL REFERENCES users(id),
                address TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Inserts a user row plus its address rows in one transaction. Nothing
    /// is committed if any insert fails.
    ///
    /// Returns the identifier as confirmed by the insert.
    pub async fn create_user(&self, user: &NewUser) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Fast-path duplicate check for a friendlier error; the primary-key
        // constraint on the insert below is the real guarantee.
        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM users WHERE id = ?1
            "#,
        )
        .bind(user.id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            return Err(StoreError::UserExists(user.id));
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (id, first_name, last_name)
            VALUES (?1, ?2, ?3)
            RETURNING id
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| duplicate_or_database(e, user.id))?;

        for address in &user.addresses {
            sqlx::query(
                r#"
                INSERT INTO addresses (uid, address) VALUES (?1, ?2)
                "#,
            )
            .bind(id)
            .bind(address)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!("User created: id={}", id);
        Ok(id)
    }

    /// Looks up a user and its addresses. Address order is unspecified.
    pub async fn get_user_by_id(&self, user_id: i64) -> Result<User, StoreError> {
        // fetch_optional keeps "row absent" distinct from query faults.
        let row: Option<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT id, first_name, last_name FROM users WHERE id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await?;

        let Some((id, first_name, last_name)) = row else {
            return Err(StoreError::UserNotFound(user_id));
        };

        let addresses: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT address FROM addresses WHERE uid = ?1
            "#,
        )
        .bind(id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(User {
            id,
            first_name,
            last_name,
            addresses,
        })
    }
}

/// Two concurrent creates can both pass the pre-check and race on the
/// insert; the primary-key violation is the second valid path to the
/// duplicate sentinel.
fn duplicate_or_database(err: sqlx::Error, id: i64) -> StoreError {
    match &err {
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
        {
            StoreError::UserExists(id)
        }
        _ => StoreError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db(dir: &tempfile::TempDir) -> Database {
        let path = dir.path().join("users.db");
        Database::new(path.to_str().unwrap()).await.unwrap()
    }

    fn sample_user(id: i64) -> NewUser {
        NewUser {
            id,
            first_name: "TestName".to_string(),
            last_name: "LastName".to_string(),
            addresses: vec!["Address1".to_string(), "User Address2 value".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;

        let id = db.create_user(&sample_user(1)).await.unwrap();
        assert_eq!(id, 1);

        let user = db.get_user_by_id(1).await.unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.first_name, "TestName");
        assert_eq!(user.last_name, "LastName");

        // Retrieval order is unspecified; compare as a set.
        let mut addresses = user.addresses;
        addresses.sort();
        assert_eq!(addresses, vec!["Address1", "User Address2 value"]);
    }

    #[tokio::test]
    async fn test_duplicate_create_leaves_single_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;

        db.create_user(&sample_user(2)).await.unwrap();
        let err = db.create_user(&sample_user(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::UserExists(2)));

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?1")
            .bind(2)
            .fetch_one(&*db.pool)
            .await
            .unwrap();
        assert_eq!(users, 1);

        let addresses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE uid = ?1")
            .bind(2)
            .fetch_one(&*db.pool)
            .await
            .unwrap();
        assert_eq!(addresses, 2);
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;

        let err = db.get_user_by_id(42).await.unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(42)));
    }

    #[tokio::test]
    async fn test_create_without_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;

        let user = NewUser {
            id: 3,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            addresses: Vec::new(),
        };
        db.create_user(&user).await.unwrap();

        let fetched = db.get_user_by_id(3).await.unwrap();
        assert_eq!(fetched.addresses, Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_pk_violation_maps_to_user_exists() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;

        db.create_user(&sample_user(9)).await.unwrap();

        // Insert bypassing the pre-check to hit the constraint directly.
        let err = sqlx::query("INSERT INTO users (id, first_name, last_name) VALUES (?1, ?2, ?3)")
            .bind(9)
            .bind("Other")
            .bind("Name")
            .execute(&*db.pool)
            .await
            .unwrap_err();
        assert!(matches!(
            duplicate_or_database(err, 9),
            StoreError::UserExists(9)
        ));
    }

    #[tokio::test]
    async fn test_failed_address_insert_leaves_no_partial_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;

        // Force the second address insert to fail mid-sequence.
        sqlx::query(
            r#"
            CREATE TRIGGER reject_marked_address BEFORE INSERT ON addresses
            WHEN NEW.address = 'rejected address'
            BEGIN
                SELECT RAISE(ABORT, 'address rejected');
            END
            "#,
        )
        .execute(&*db.pool)
        .await
        .unwrap();

        let user = NewUser {
            id: 6,
            first_name: "TestName".to_string(),
            last_name: "LastName".to_string(),
            addresses: vec!["Address1".to_string(), "rejected address".to_string()],
        };
        let err = db.create_user(&user).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));

        // The whole aggregate rolls back: no user row, no address rows.
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?1")
            .bind(6)
            .fetch_one(&*db.pool)
            .await
            .unwrap();
        assert_eq!(users, 0);

        let addresses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE uid = ?1")
            .bind(6)
            .fetch_one(&*db.pool)
            .await
            .unwrap();
        assert_eq!(addresses, 0);
    }

    #[tokio::test]
    async fn test_concurrent_creates_persist_single_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = std::sync::Arc::new(test_db(&dir).await);

        let first = {
            let db = db.clone();
            tokio::spawn(async move { db.create_user(&sample_user(5)).await })
        };
        let second = {
            let db = db.clone();
            tokio::spawn(async move { db.create_user(&sample_user(5)).await })
        };

        let first = first.await.unwrap();
        let second = second.await.unwrap();

        // Exactly one create wins; the loser fails via the pre-check or the
        // primary-key constraint.
        assert!(first.is_ok() != second.is_ok());

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?1")
            .bind(5)
            .fetch_one(&*db.pool)
            .await
            .unwrap();
        assert_eq!(users, 1);

        let addresses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE uid = ?1")
            .bind(5)
            .fetch_one(&*db.pool)
            .await
            .unwrap();
        assert_eq!(addresses, 2);
    }
}
