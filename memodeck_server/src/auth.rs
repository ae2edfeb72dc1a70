//! Authentication collaborators: the credential store and the token gate.
//! The core treats both as opaque; everything HTTP-flavored stays here.

use crate::AppState;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, StatusCode};
use axum::Json;
use memodeck::model::CardId;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;

pub const SESSION_COOKIE: &str = "memodeck_session";

#[derive(Clone, Debug)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("Username already taken")]
    Duplicate,
    #[error("credential store failure: {0}")]
    Storage(String),
}

/// The credential store the rest of the system depends on. The bundled
/// implementation keeps a SQLite table next to the collections; a deployment
/// may swap in anything that satisfies this trait.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, username: &str, name: &str, password: &str)
        -> Result<User, UserStoreError>;
    async fn verify_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserStoreError>;
    async fn lookup(&self, username: &str) -> Result<Option<User>, UserStoreError>;
    /// Rolls back a registration whose collection could not be created.
    async fn remove(&self, user_id: i64) -> Result<(), UserStoreError>;
}

pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub async fn open(data_dir: &Path) -> Result<Self, UserStoreError> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| UserStoreError::Storage(e.to_string()))?;
        let options = SqliteConnectOptions::new()
            .filename(data_dir.join("users.sqlite"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| UserStoreError::Storage(e.to_string()))?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                 id            INTEGER PRIMARY KEY AUTOINCREMENT,
                 username      TEXT NOT NULL UNIQUE COLLATE NOCASE,
                 name          TEXT NOT NULL,
                 salt          TEXT NOT NULL,
                 password_hash TEXT NOT NULL,
                 created_at    INTEGER NOT NULL DEFAULT (unixepoch())
             )",
        )
        .execute(&pool)
        .await
        .map_err(|e| UserStoreError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }
}

fn password_digest(salt: &str, password: &str) -> String {
    sha256::digest(format!("{}:{}", salt, password))
}

fn random_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create(
        &self,
        username: &str,
        name: &str,
        password: &str,
    ) -> Result<User, UserStoreError> {
        let salt = random_token(16);
        let digest = password_digest(&salt, password);
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            "INSERT INTO users (username, name, salt, password_hash)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(username)
        .bind(name)
        .bind(&salt)
        .bind(&digest)
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok((id,)) => Ok(User {
                id,
                username: username.to_string(),
                name: name.to_string(),
            }),
            Err(sqlx::Error::Database(db)) if db.message().contains("UNIQUE") => {
                Err(UserStoreError::Duplicate)
            }
            Err(e) => Err(UserStoreError::Storage(e.to_string())),
        }
    }

    async fn verify_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserStoreError> {
        let row: Option<(i64, String, String, String, String)> = sqlx::query_as(
            "SELECT id, username, name, salt, password_hash FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| UserStoreError::Storage(e.to_string()))?;
        let Some((id, username, name, salt, stored)) = row else {
            return Ok(None);
        };
        if password_digest(&salt, password) == stored {
            Ok(Some(User { id, username, name }))
        } else {
            Ok(None)
        }
    }

    async fn lookup(&self, username: &str) -> Result<Option<User>, UserStoreError> {
        let row: Option<(i64, String, String)> =
            sqlx::query_as("SELECT id, username, name FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| UserStoreError::Storage(e.to_string()))?;
        Ok(row.map(|(id, username, name)| User { id, username, name }))
    }

    async fn remove(&self, user_id: i64) -> Result<(), UserStoreError> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| UserStoreError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct AuthSession {
    pub user: User,
    /// Card handed out by the last `/review`; `/answer` consumes it.
    pub pending_card: Option<CardId>,
}

/// Resolves session tokens to users. Tokens are opaque to clients; the
/// configured secret only salts the digest so tokens from parallel
/// deployments never collide.
pub struct AuthGate {
    secret: String,
    sessions: RwLock<HashMap<String, AuthSession>>,
}

impl AuthGate {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn issue(&self, user: &User) -> String {
        let token = sha256::digest(format!(
            "{}:{}:{}",
            self.secret,
            user.username,
            random_token(24)
        ));
        self.sessions.write().expect("session lock").insert(
            token.clone(),
            AuthSession {
                user: user.clone(),
                pending_card: None,
            },
        );
        token
    }

    pub fn resolve(&self, token: &str) -> Option<AuthSession> {
        self.sessions.read().expect("session lock").get(token).cloned()
    }

    pub fn set_pending_card(&self, token: &str, card_id: Option<CardId>) {
        if let Some(session) = self.sessions.write().expect("session lock").get_mut(token) {
            session.pending_card = card_id;
        }
    }

    pub fn revoke(&self, token: &str) -> Option<User> {
        self.sessions
            .write()
            .expect("session lock")
            .remove(token)
            .map(|session| session.user)
    }
}

/// Extractor for the authenticated user; rejects with the stable 401 body.
pub struct AuthUser {
    pub token: String,
    pub user: User,
}

fn bearer_or_cookie_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }
    let cookies = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        if let Some((key, value)) = pair.trim().split_once('=') {
            if key == SESSION_COOKIE {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Authentication required" })),
            )
        };
        let token = bearer_or_cookie_token(parts).ok_or_else(unauthorized)?;
        let session = state.gate.resolve(&token).ok_or_else(unauthorized)?;
        Ok(AuthUser {
            token,
            user: session.user,
        })
    }
}
