use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ChatSummary;

pub mod auth;
pub mod chats;
pub mod memory;

pub use memory::{MemoryChatStore, StaticIdentityResolver};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRecord {
    pub id: Uuid,
    pub title: String,
    /// Opaque JSON blob owned by the planner.
    pub data: Option<Value>,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatUpsert {
    pub id: Uuid,
    pub title: String,
    pub data: Value,
    /// `None` keeps the stored pin flag (new chats start unpinned).
    pub is_pinned: Option<bool>,
}

/// Chat header + data persistence, always scoped to one user.
pub trait ChatStore: Send + Sync {
    fn list_chats<'a>(&'a self, user_id: Uuid) -> StoreFuture<'a, Vec<ChatSummary>>;
    fn get_chat<'a>(&'a self, user_id: Uuid, chat_id: Uuid) -> StoreFuture<'a, Option<ChatRecord>>;
    fn upsert_chat<'a>(&'a self, user_id: Uuid, chat: ChatUpsert) -> StoreFuture<'a, ()>;
    fn delete_chat<'a>(&'a self, user_id: Uuid, chat_id: Uuid) -> StoreFuture<'a, bool>;
    fn rename_chat<'a>(&'a self, user_id: Uuid, chat_id: Uuid, title: &'a str)
    -> StoreFuture<'a, bool>;
    fn set_pinned<'a>(&'a self, user_id: Uuid, chat_id: Uuid, is_pinned: bool)
    -> StoreFuture<'a, bool>;
    fn ping<'a>(&'a self) -> StoreFuture<'a, ()>;
}

/// Maps a bearer token to the current user, or none.
pub trait IdentityResolver: Send + Sync {
    fn resolve_user<'a>(&'a self, bearer_token: &'a str) -> StoreFuture<'a, Option<Uuid>>;
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let _: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    pub async fn ensure_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
