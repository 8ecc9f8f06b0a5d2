use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::models::ChatSummary;
use crate::repos::{ChatStore, StoreError};
use crate::session::{normalize_title, sort_sessions};

/// Result of a sidebar mutation. `persisted` is false when the store call
/// failed and only the local list reflects the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryOutcome {
    pub found: bool,
    pub persisted: bool,
}

/// A user's chat list, kept pinned-first then newest-first.
pub struct ChatDirectory {
    store: Arc<dyn ChatStore>,
    user_id: Uuid,
    sessions: Vec<ChatSummary>,
}

impl ChatDirectory {
    pub async fn load(store: Arc<dyn ChatStore>, user_id: Uuid) -> Result<Self, StoreError> {
        let mut directory = Self {
            store,
            user_id,
            sessions: Vec::new(),
        };
        directory.reload().await?;
        Ok(directory)
    }

    pub fn sessions(&self) -> &[ChatSummary] {
        &self.sessions
    }

    pub fn into_sessions(self) -> Vec<ChatSummary> {
        self.sessions
    }

    pub async fn reload(&mut self) -> Result<(), StoreError> {
        let mut sessions = self.store.list_chats(self.user_id).await?;
        sort_sessions(&mut sessions);
        self.sessions = sessions;
        Ok(())
    }

    pub async fn rename(&mut self, chat_id: Uuid, raw_title: &str) -> DirectoryOutcome {
        let title = normalize_title(raw_title);
        let found = self.update_local(chat_id, |session| session.title = title.clone());

        let persisted = match self.store.rename_chat(self.user_id, chat_id, &title).await {
            Ok(updated) => updated,
            Err(err) => {
                warn!(chat_id = %chat_id, "failed to rename chat: {err}");
                false
            }
        };

        self.reconcile().await;
        DirectoryOutcome { found, persisted }
    }

    pub async fn set_pinned(&mut self, chat_id: Uuid, is_pinned: bool) -> DirectoryOutcome {
        let found = self.update_local(chat_id, |session| session.is_pinned = is_pinned);

        let persisted = match self.store.set_pinned(self.user_id, chat_id, is_pinned).await {
            Ok(updated) => updated,
            Err(err) => {
                warn!(chat_id = %chat_id, "failed to update chat pin: {err}");
                false
            }
        };

        self.reconcile().await;
        DirectoryOutcome { found, persisted }
    }

    pub async fn delete(&mut self, chat_id: Uuid) -> DirectoryOutcome {
        let before = self.sessions.len();
        self.sessions.retain(|session| session.id != chat_id);
        let found = self.sessions.len() != before;

        let persisted = match self.store.delete_chat(self.user_id, chat_id).await {
            Ok(deleted) => deleted,
            Err(err) => {
                warn!(chat_id = %chat_id, "failed to delete chat: {err}");
                false
            }
        };

        self.reconcile().await;
        DirectoryOutcome { found, persisted }
    }

    fn update_local(&mut self, chat_id: Uuid, apply: impl FnOnce(&mut ChatSummary)) -> bool {
        let Some(session) = self.sessions.iter_mut().find(|session| session.id == chat_id) else {
            return false;
        };
        apply(session);
        session.updated_at = Utc::now();
        sort_sessions(&mut self.sessions);
        true
    }

    /// Pulls the canonical list; on failure the optimistic list stays.
    async fn reconcile(&mut self) {
        if let Err(err) = self.reload().await {
            warn!(user_id = %self.user_id, "failed to reload chat list: {err}");
        }
    }
}
