use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
#[cfg(test)]
use std::{collections::HashMap, sync::Mutex};

use crate::users::error::AccountError;
use crate::users::model::{NewUser, User};

/// Port for durable user storage. Every operation borrows the record
/// for a single request; the repository owns it between requests.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AccountError>;

    /// Insert a new row. Duplicate emails are rejected by the storage
    /// layer itself (UNIQUE constraint), surfaced as `Conflict`, so no
    /// check-then-insert race exists.
    async fn insert(&self, new: NewUser) -> Result<User, AccountError>;

    /// Persist a mutated record, last write wins.
    async fn update(&self, user: &User) -> Result<User, AccountError>;

    async fn count(&self) -> Result<i64, AccountError>;
}

pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AccountError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, bio, image, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn insert(&self, new: NewUser) -> Result<User, AccountError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, username, password_hash, bio, image, created_at
            "#,
        )
        .bind(&new.email)
        .bind(&new.username)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AccountError::Conflict(new.email.clone())
            }
            _ => anyhow::Error::new(e).context("insert user").into(),
        })?;
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<User, AccountError> {
        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = $2, password_hash = $3, bio = $4, image = $5
            WHERE email = $1
            RETURNING id, email, username, password_hash, bio, image, created_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.bio)
        .bind(&user.image)
        .fetch_one(&self.db)
        .await
        .context("update user")?;
        Ok(updated)
    }

    async fn count(&self) -> Result<i64, AccountError> {
        let (n,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM users"#)
            .fetch_one(&self.db)
            .await
            .context("count users")?;
        Ok(n)
    }
}

/// In-memory repository keyed by email, mirroring the UNIQUE constraint
/// the Postgres implementation relies on. Used by unit tests and
/// `AppState::fake`.
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
}

#[cfg(test)]
impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AccountError> {
        let users = self.users.lock().unwrap();
        Ok(users.get(email).cloned())
    }

    async fn insert(&self, new: NewUser) -> Result<User, AccountError> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(&new.email) {
            return Err(AccountError::Conflict(new.email));
        }
        let user = User {
            id: uuid::Uuid::new_v4(),
            email: new.email.clone(),
            username: new.username,
            password_hash: new.password_hash,
            bio: None,
            image: None,
            created_at: time::OffsetDateTime::now_utc(),
        };
        users.insert(new.email, user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<User, AccountError> {
        let mut users = self.users.lock().unwrap();
        if !users.contains_key(&user.email) {
            return Err(AccountError::NotFound(user.email.clone()));
        }
        users.insert(user.email.clone(), user.clone());
        Ok(user.clone())
    }

    async fn count(&self) -> Result<i64, AccountError> {
        Ok(self.users.lock().unwrap().len() as i64)
    }
}
