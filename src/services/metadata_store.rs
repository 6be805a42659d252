//! AvatarStore: durable avatar records keyed by identifier, backed by SQLite.

use crate::models::avatar::Avatar;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("avatar `{0}` not found")]
    NotFound(String),
    #[error("avatar `{0}` already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const AVATAR_COLUMNS: &str = "identifier, object_path, created_at";

/// Metadata store for avatars.
///
/// Per-key atomicity comes from SQLite; nothing here coordinates requests.
#[derive(Clone)]
pub struct AvatarStore {
    pub db: Arc<SqlitePool>,
}

impl AvatarStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Strict insert. Fails with `AlreadyExists` if the identifier is taken.
    pub async fn create(&self, identifier: &str, object_path: &str) -> StoreResult<Avatar> {
        sqlx::query_as::<_, Avatar>(&format!(
            "INSERT INTO avatars (identifier, object_path, created_at)
             VALUES (?, ?, ?)
             RETURNING {AVATAR_COLUMNS}"
        ))
        .bind(identifier)
        .bind(object_path)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::AlreadyExists(identifier.to_string())
            } else {
                StoreError::Sqlx(err)
            }
        })
    }

    pub async fn get(&self, identifier: &str) -> StoreResult<Avatar> {
        sqlx::query_as::<_, Avatar>(&format!(
            "SELECT {AVATAR_COLUMNS} FROM avatars WHERE identifier = ?"
        ))
        .bind(identifier)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(identifier.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    /// Point an existing record at a new blob. `created_at` is never touched.
    pub async fn update(&self, identifier: &str, object_path: &str) -> StoreResult<Avatar> {
        sqlx::query_as::<_, Avatar>(&format!(
            "UPDATE avatars SET object_path = ? WHERE identifier = ?
             RETURNING {AVATAR_COLUMNS}"
        ))
        .bind(object_path)
        .bind(identifier)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StoreError::NotFound(identifier.to_string()))
    }

    /// Create the record or move its pointer, in one transaction.
    ///
    /// Returns the stored avatar and whether this call created it.
    pub async fn upsert(&self, identifier: &str, object_path: &str) -> StoreResult<(Avatar, bool)> {
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query_as::<_, Avatar>(&format!(
            "UPDATE avatars SET object_path = ? WHERE identifier = ?
             RETURNING {AVATAR_COLUMNS}"
        ))
        .bind(object_path)
        .bind(identifier)
        .fetch_optional(&mut *tx)
        .await?;

        let result = match updated {
            Some(avatar) => (avatar, false),
            None => {
                let created = sqlx::query_as::<_, Avatar>(&format!(
                    "INSERT INTO avatars (identifier, object_path, created_at)
                     VALUES (?, ?, ?)
                     RETURNING {AVATAR_COLUMNS}"
                ))
                .bind(identifier)
                .bind(object_path)
                .bind(Utc::now())
                .fetch_one(&mut *tx)
                .await?;
                (created, true)
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    /// All avatars, newest first. Equal timestamps fall back to identifier order.
    pub async fn list(&self) -> StoreResult<Vec<Avatar>> {
        let rows = sqlx::query_as::<_, Avatar>(&format!(
            "SELECT {AVATAR_COLUMNS} FROM avatars
             ORDER BY created_at DESC, identifier ASC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
