use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::db::models::{NewUser, User};
use crate::error::{AppError, DatabaseError};
use crate::Result;

/// Storage seam used by the auth service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// First record (lowest id) with this username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Inserts the user, refusing usernames that are already taken.
    async fn create_user(&self, user: NewUser) -> Result<User>;
}

#[derive(Clone)]
pub struct DbOperations {
    pool: Arc<SqlitePool>,
}

impl DbOperations {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Opens the database file (creating it if needed) and applies the schema.
    /// Connections are kept for the life of the pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?;

        let db = Self::new(Arc::new(pool));
        db.migrate().await?;
        info!("Credential store ready at {}", config.url);
        Ok(db)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        self.pool.as_ref()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Sqlite>> {
        Ok(self.pool.as_ref().begin().await?)
    }

    pub async fn create_user_with_transaction(
        &self,
        user: NewUser,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<User> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM users WHERE username = ? LIMIT 1",
        )
        .bind(&user.username)
        .fetch_optional(&mut **transaction)
        .await?;

        if existing.is_some() {
            return Err(DatabaseError::Duplicate.into());
        }

        let result = sqlx::query("INSERT INTO users (username, email, password) VALUES (?, ?, ?)")
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .execute(&mut **transaction)
            .await?;

        Ok(user.into_user(result.last_insert_rowid()))
    }

    pub async fn count_users(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl UserRepository for DbOperations {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password FROM users WHERE username = ? ORDER BY id LIMIT 1",
        )
        .bind(username)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut transaction = self.begin_transaction().await?;

        let result = self.create_user_with_transaction(user, &mut transaction).await;

        match result {
            Ok(user) => {
                transaction.commit().await?;
                debug!("Inserted user id {}", user.id);
                Ok(user)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> DbOperations {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        };
        DbOperations::connect(&config).await.expect("Failed to open test database")
    }

    fn new_user(username: &str) -> NewUser {
        NewUser::new(username.to_string(), format!("{}@x.com", username), "hash".to_string())
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let db = setup_test_db().await;

        let created = db.create_user(new_user("alice")).await.unwrap();
        assert!(created.id > 0);

        let found = db.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.email, "alice@x.com");
        assert_eq!(found.password_hash, "hash");

        assert!(db.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let db = setup_test_db().await;

        db.create_user(new_user("alice")).await.unwrap();
        let err = db.create_user(new_user("alice")).await.unwrap_err();

        assert!(matches!(err, AppError::DatabaseError(DatabaseError::Duplicate)));
        assert_eq!(db.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_first_record_wins_for_legacy_duplicates() {
        let db = setup_test_db().await;

        for hash in ["first", "second"] {
            sqlx::query("INSERT INTO users (username, email, password) VALUES (?, ?, ?)")
                .bind("alice")
                .bind("a@x.com")
                .bind(hash)
                .execute(db.pool())
                .await
                .unwrap();
        }

        let found = db.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.password_hash, "first");
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let db = setup_test_db().await;
        let mut transaction = db.begin_transaction().await.unwrap();

        let created = db
            .create_user_with_transaction(new_user("carol"), &mut transaction)
            .await
            .unwrap();
        assert!(created.id > 0);

        transaction.rollback().await.unwrap();

        assert!(db.find_by_username("carol").await.unwrap().is_none());
        assert_eq!(db.count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = setup_test_db().await;
        db.migrate().await.unwrap();
        assert_eq!(db.count_users().await.unwrap(), 0);
    }
}
