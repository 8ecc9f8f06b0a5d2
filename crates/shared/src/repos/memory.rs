use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ChatRecord, ChatStore, ChatUpsert, IdentityResolver, StoreError, StoreFuture};
use crate::models::ChatSummary;

/// In-process chat store used when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryChatStore {
    chats: Mutex<HashMap<Uuid, (Uuid, ChatRecord)>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.chats.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl ChatStore for MemoryChatStore {
    fn list_chats<'a>(&'a self, user_id: Uuid) -> StoreFuture<'a, Vec<ChatSummary>> {
        Box::pin(async move {
            let chats = self.chats.lock().await;
            let mut summaries = chats
                .values()
                .filter(|(owner, _)| *owner == user_id)
                .map(|(_, record)| ChatSummary {
                    id: record.id,
                    title: record.title.clone(),
                    is_pinned: record.is_pinned,
                    updated_at: record.updated_at,
                })
                .collect::<Vec<_>>();
            summaries.sort_by(|left, right| right.updated_at.cmp(&left.updated_at));
            Ok(summaries)
        })
    }

    fn get_chat<'a>(&'a self, user_id: Uuid, chat_id: Uuid) -> StoreFuture<'a, Option<ChatRecord>> {
        Box::pin(async move {
            let chats = self.chats.lock().await;
            Ok(chats
                .get(&chat_id)
                .filter(|(owner, _)| *owner == user_id)
                .map(|(_, record)| record.clone()))
        })
    }

    fn upsert_chat<'a>(&'a self, user_id: Uuid, chat: ChatUpsert) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut chats = self.chats.lock().await;
            let now = Utc::now();

            match chats.get_mut(&chat.id) {
                Some((owner, _)) if *owner != user_id => Err(StoreError::InvalidData(format!(
                    "chat {} belongs to another user",
                    chat.id
                ))),
                Some((_, record)) => {
                    record.title = chat.title;
                    record.data = Some(chat.data);
                    if let Some(is_pinned) = chat.is_pinned {
                        record.is_pinned = is_pinned;
                    }
                    record.updated_at = now;
                    Ok(())
                }
                None => {
                    chats.insert(
                        chat.id,
                        (
                            user_id,
                            ChatRecord {
                                id: chat.id,
                                title: chat.title,
                                data: Some(chat.data),
                                is_pinned: chat.is_pinned.unwrap_or(false),
                                created_at: now,
                                updated_at: now,
                            },
                        ),
                    );
                    Ok(())
                }
            }
        })
    }

    fn delete_chat<'a>(&'a self, user_id: Uuid, chat_id: Uuid) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut chats = self.chats.lock().await;
            let owned = chats
                .get(&chat_id)
                .is_some_and(|(owner, _)| *owner == user_id);
            if owned {
                chats.remove(&chat_id);
            }
            Ok(owned)
        })
    }

    fn rename_chat<'a>(
        &'a self,
        user_id: Uuid,
        chat_id: Uuid,
        title: &'a str,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut chats = self.chats.lock().await;
            match chats.get_mut(&chat_id) {
                Some((owner, record)) if *owner == user_id => {
                    record.title = title.to_string();
                    record.updated_at = Utc::now();
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn set_pinned<'a>(
        &'a self,
        user_id: Uuid,
        chat_id: Uuid,
        is_pinned: bool,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut chats = self.chats.lock().await;
            match chats.get_mut(&chat_id) {
                Some((owner, record)) if *owner == user_id => {
                    record.is_pinned = is_pinned;
                    record.updated_at = Utc::now();
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn ping<'a>(&'a self) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Fixed token table, for local runs without an auth database.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    tokens: HashMap<String, Uuid>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: Uuid) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve_user<'a>(&'a self, bearer_token: &'a str) -> StoreFuture<'a, Option<Uuid>> {
        Box::pin(async move { Ok(self.tokens.get(bearer_token).copied()) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::{MemoryChatStore, StaticIdentityResolver};
    use crate::repos::{ChatStore, ChatUpsert, IdentityResolver};

    fn upsert(id: Uuid, title: &str, is_pinned: Option<bool>) -> ChatUpsert {
        ChatUpsert {
            id,
            title: title.to_string(),
            data: json!({"version": 1}),
            is_pinned,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_pin_flag_unless_provided() {
        let store = MemoryChatStore::new();
        let user_id = Uuid::new_v4();
        let chat_id = Uuid::new_v4();

        store
            .upsert_chat(user_id, upsert(chat_id, "Eras Tour", Some(true)))
            .await
            .expect("insert should succeed");
        store
            .upsert_chat(user_id, upsert(chat_id, "Eras Tour LA", None))
            .await
            .expect("update should succeed");

        let record = store
            .get_chat(user_id, chat_id)
            .await
            .expect("get should succeed")
            .expect("chat should exist");
        assert_eq!(record.title, "Eras Tour LA");
        assert!(record.is_pinned);
    }

    #[tokio::test]
    async fn chats_are_scoped_to_their_owner() {
        let store = MemoryChatStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let chat_id = Uuid::new_v4();

        store
            .upsert_chat(owner, upsert(chat_id, "Mine", None))
            .await
            .expect("insert should succeed");

        assert!(
            store
                .get_chat(stranger, chat_id)
                .await
                .expect("get should succeed")
                .is_none()
        );
        assert!(
            store
                .list_chats(stranger)
                .await
                .expect("list should succeed")
                .is_empty()
        );
        assert!(
            !store
                .rename_chat(stranger, chat_id, "Theirs")
                .await
                .expect("rename should succeed")
        );
        assert!(
            !store
                .delete_chat(stranger, chat_id)
                .await
                .expect("delete should succeed")
        );
        assert!(
            store
                .upsert_chat(stranger, upsert(chat_id, "Hijack", None))
                .await
                .is_err()
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn list_orders_by_most_recent_update() {
        let store = MemoryChatStore::new();
        let user_id = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store
            .upsert_chat(user_id, upsert(first, "First", None))
            .await
            .expect("insert should succeed");
        store
            .upsert_chat(user_id, upsert(second, "Second", None))
            .await
            .expect("insert should succeed");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .set_pinned(user_id, first, true)
            .await
            .expect("pin should succeed");

        let listed = store.list_chats(user_id).await.expect("list should succeed");
        assert_eq!(listed[0].id, first);
        assert!(listed[0].is_pinned);
    }

    #[tokio::test]
    async fn static_resolver_maps_known_tokens_only() {
        let user_id = Uuid::new_v4();
        let resolver = StaticIdentityResolver::new().with_token("token-1", user_id);

        assert_eq!(
            resolver.resolve_user("token-1").await.expect("resolve"),
            Some(user_id)
        );
        assert_eq!(resolver.resolve_user("nope").await.expect("resolve"), None);
    }
}
