use chrono::Utc;
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use super::{ChatRecord, ChatStore, ChatUpsert, Store, StoreError, StoreFuture};
use crate::models::ChatSummary;

impl Store {
    pub async fn list_chat_summaries(&self, user_id: Uuid) -> Result<Vec<ChatSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, title, is_pinned, updated_at
             FROM chats
             WHERE user_id = $1
             ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ChatSummary {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    is_pinned: row.try_get("is_pinned")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    pub async fn load_chat(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
    ) -> Result<Option<ChatRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, title, data, is_pinned, created_at, updated_at
             FROM chats
             WHERE user_id = $1
               AND id = $2",
        )
        .bind(user_id)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(chat_record_from_row).transpose()
    }

    pub async fn save_chat(&self, user_id: Uuid, chat: ChatUpsert) -> Result<(), StoreError> {
        self.ensure_user(user_id).await?;

        let data = chat.data.to_string();
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO chats (id, user_id, title, data, is_pinned, created_at, updated_at)
             VALUES ($1, $2, $3, $4, COALESCE($5, FALSE), $6, $6)
             ON CONFLICT (id)
             DO UPDATE SET
               title = EXCLUDED.title,
               data = EXCLUDED.data,
               is_pinned = COALESCE($5, chats.is_pinned),
               updated_at = EXCLUDED.updated_at
             WHERE chats.user_id = EXCLUDED.user_id",
        )
        .bind(chat.id)
        .bind(user_id)
        .bind(&chat.title)
        .bind(&data)
        .bind(chat.is_pinned)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidData(format!(
                "chat {} belongs to another user",
                chat.id
            )));
        }

        Ok(())
    }

    pub async fn remove_chat(&self, user_id: Uuid, chat_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM chats WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_chat_title(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        title: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE chats
             SET title = $3, updated_at = $4
             WHERE user_id = $1
               AND id = $2",
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(title)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_chat_pinned(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        is_pinned: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE chats
             SET is_pinned = $3, updated_at = $4
             WHERE user_id = $1
               AND id = $2",
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(is_pinned)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn chat_record_from_row(row: PgRow) -> Result<ChatRecord, StoreError> {
    let chat_id: Uuid = row.try_get("id")?;
    let data_json: Option<String> = row.try_get("data")?;
    let data = data_json
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| {
            serde_json::from_str::<Value>(&raw)
                .map_err(|err| StoreError::InvalidData(format!("chat {chat_id} data: {err}")))
        })
        .transpose()?;

    Ok(ChatRecord {
        id: chat_id,
        title: row.try_get("title")?,
        data,
        is_pinned: row.try_get("is_pinned")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl ChatStore for Store {
    fn list_chats<'a>(&'a self, user_id: Uuid) -> StoreFuture<'a, Vec<ChatSummary>> {
        Box::pin(self.list_chat_summaries(user_id))
    }

    fn get_chat<'a>(&'a self, user_id: Uuid, chat_id: Uuid) -> StoreFuture<'a, Option<ChatRecord>> {
        Box::pin(self.load_chat(user_id, chat_id))
    }

    fn upsert_chat<'a>(&'a self, user_id: Uuid, chat: ChatUpsert) -> StoreFuture<'a, ()> {
        Box::pin(self.save_chat(user_id, chat))
    }

    fn delete_chat<'a>(&'a self, user_id: Uuid, chat_id: Uuid) -> StoreFuture<'a, bool> {
        Box::pin(self.remove_chat(user_id, chat_id))
    }

    fn rename_chat<'a>(
        &'a self,
        user_id: Uuid,
        chat_id: Uuid,
        title: &'a str,
    ) -> StoreFuture<'a, bool> {
        Box::pin(self.update_chat_title(user_id, chat_id, title))
    }

    fn set_pinned<'a>(
        &'a self,
        user_id: Uuid,
        chat_id: Uuid,
        is_pinned: bool,
    ) -> StoreFuture<'a, bool> {
        Box::pin(self.update_chat_pinned(user_id, chat_id, is_pinned))
    }

    fn ping<'a>(&'a self) -> StoreFuture<'a, ()> {
        Box::pin(Store::ping(self))
    }
}
