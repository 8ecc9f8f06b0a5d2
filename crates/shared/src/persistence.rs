use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::repos::{ChatStore, ChatUpsert};

/// Written sequences are forgotten after this long without a newer snapshot.
const WRITTEN_RETENTION: Duration = Duration::from_secs(60 * 60);

/// One session snapshot headed for the store. `sequence` grows with every
/// snapshot a session produces and keeps growing across reopens.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub sequence: u64,
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub title: String,
    pub data: Value,
    pub is_pinned: Option<bool>,
}

enum WriterCommand {
    Save(SaveRequest),
    Forget(Uuid),
    Flush(oneshot::Sender<()>),
}

/// Sidebar edits for a chat with a live planning session. The session
/// consults this before every snapshot, so a rename or delete made while it
/// is busy is never undone by its later saves.
#[derive(Debug, Default)]
pub struct SidebarEdits {
    inner: Mutex<PendingEdits>,
}

#[derive(Debug, Default)]
pub struct PendingEdits {
    pub title: Option<String>,
    pub is_pinned: Option<bool>,
    pub deleted: bool,
}

impl SidebarEdits {
    pub fn lock(&self) -> MutexGuard<'_, PendingEdits> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn rename(&self, title: String) {
        self.lock().title = Some(title);
    }

    pub fn set_pinned(&self, is_pinned: bool) {
        self.lock().is_pinned = Some(is_pinned);
    }

    pub fn mark_deleted(&self) {
        self.lock().deleted = true;
    }

    pub fn is_deleted(&self) -> bool {
        self.lock().deleted
    }
}

/// Next snapshot sequence: wall-clock micros, bumped past `previous` so a
/// session never repeats one.
pub fn next_sequence(previous: u64) -> u64 {
    let now = u64::try_from(chrono::Utc::now().timestamp_micros()).unwrap_or(0);
    now.max(previous.saturating_add(1))
}

/// Handle to the single background task that writes session snapshots.
/// Snapshots for the same chat are written newest-last and never regress.
#[derive(Clone)]
pub struct SaveWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl SaveWriter {
    pub fn spawn(store: Arc<dyn ChatStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store, rx));
        Self { tx }
    }

    pub fn enqueue(&self, request: SaveRequest) {
        let chat_id = request.chat_id;
        if self.tx.send(WriterCommand::Save(request)).is_err() {
            warn!(chat_id = %chat_id, "session writer stopped; snapshot dropped");
        }
    }

    /// Drops the writer's record of a deleted chat.
    pub fn forget(&self, chat_id: Uuid) {
        if self.tx.send(WriterCommand::Forget(chat_id)).is_err() {
            warn!(chat_id = %chat_id, "session writer stopped; forget dropped");
        }
    }

    /// Resolves once every snapshot queued before this call has been handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

async fn run_writer(store: Arc<dyn ChatStore>, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    let mut last_written: HashMap<Uuid, (u64, Instant)> = HashMap::new();

    while let Some(first) = rx.recv().await {
        let mut pending: Vec<SaveRequest> = Vec::new();
        let mut waiters: Vec<oneshot::Sender<()>> = Vec::new();

        let mut next = Some(first);
        while let Some(command) = next {
            match command {
                WriterCommand::Save(request) => coalesce(&mut pending, request),
                WriterCommand::Forget(chat_id) => {
                    pending.retain(|queued| queued.chat_id != chat_id);
                    last_written.remove(&chat_id);
                }
                WriterCommand::Flush(done_tx) => waiters.push(done_tx),
            }
            next = rx.try_recv().ok();
        }

        for request in pending {
            let chat_id = request.chat_id;
            let sequence = request.sequence;
            if last_written
                .get(&chat_id)
                .is_some_and(|(written, _)| *written >= sequence)
            {
                debug!(chat_id = %chat_id, sequence, "skipping stale session snapshot");
                continue;
            }

            let upsert = ChatUpsert {
                id: chat_id,
                title: request.title,
                data: request.data,
                is_pinned: request.is_pinned,
            };
            match store.upsert_chat(request.user_id, upsert).await {
                Ok(()) => {
                    last_written.insert(chat_id, (sequence, Instant::now()));
                    debug!(chat_id = %chat_id, sequence, "session snapshot written");
                }
                Err(err) => {
                    warn!(chat_id = %chat_id, sequence, "failed to persist session snapshot: {err}");
                }
            }
        }

        last_written.retain(|_, (_, written_at)| written_at.elapsed() < WRITTEN_RETENTION);

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

/// Keeps only the newest queued snapshot per chat.
fn coalesce(pending: &mut Vec<SaveRequest>, request: SaveRequest) {
    match pending
        .iter_mut()
        .find(|queued| queued.chat_id == request.chat_id)
    {
        Some(queued) if queued.sequence < request.sequence => *queued = request,
        Some(_) => {}
        None => pending.push(request),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use uuid::Uuid;

    use super::{SaveRequest, SaveWriter, coalesce, next_sequence};
    use crate::repos::{ChatStore, MemoryChatStore};

    fn request(chat_id: Uuid, user_id: Uuid, sequence: u64, title: &str) -> SaveRequest {
        SaveRequest {
            sequence,
            user_id,
            chat_id,
            title: title.to_string(),
            data: json!({"version": 1, "sequence": sequence}),
            is_pinned: None,
        }
    }

    #[test]
    fn coalesce_keeps_newest_per_chat() {
        let user_id = Uuid::new_v4();
        let chat_a = Uuid::new_v4();
        let chat_b = Uuid::new_v4();
        let mut pending = Vec::new();

        coalesce(&mut pending, request(chat_a, user_id, 2, "a2"));
        coalesce(&mut pending, request(chat_b, user_id, 1, "b1"));
        coalesce(&mut pending, request(chat_a, user_id, 1, "a1"));
        coalesce(&mut pending, request(chat_a, user_id, 3, "a3"));

        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].title, "a3");
        assert_eq!(pending[1].title, "b1");
    }

    #[tokio::test]
    async fn older_snapshot_never_overwrites_newer_one() {
        let store = Arc::new(MemoryChatStore::new());
        let writer = SaveWriter::spawn(store.clone());
        let user_id = Uuid::new_v4();
        let chat_id = Uuid::new_v4();

        writer.enqueue(request(chat_id, user_id, 5, "newest"));
        writer.flush().await;
        writer.enqueue(request(chat_id, user_id, 4, "stale"));
        writer.flush().await;

        let record = store
            .get_chat(user_id, chat_id)
            .await
            .expect("get should succeed")
            .expect("chat should be written");
        assert_eq!(record.title, "newest");
        assert_eq!(record.data, Some(json!({"version": 1, "sequence": 5})));
    }

    #[test]
    fn sequences_increase_even_within_one_microsecond() {
        let first = next_sequence(0);
        let second = next_sequence(first);
        assert!(second > first);
        assert_eq!(next_sequence(u64::MAX - 1), u64::MAX);
    }

    #[tokio::test]
    async fn forgotten_chat_drops_its_queued_snapshot() {
        let store = Arc::new(MemoryChatStore::new());
        let writer = SaveWriter::spawn(store.clone());
        let user_id = Uuid::new_v4();
        let chat_id = Uuid::new_v4();

        writer.enqueue(request(chat_id, user_id, 9, "written"));
        writer.flush().await;
        writer.forget(chat_id);
        writer.enqueue(request(chat_id, user_id, 3, "after reopen"));
        writer.flush().await;

        let record = store
            .get_chat(user_id, chat_id)
            .await
            .expect("get should succeed")
            .expect("chat should be written");
        assert_eq!(record.title, "after reopen");
    }

    #[tokio::test]
    async fn flush_waits_for_queued_snapshots() {
        let store = Arc::new(MemoryChatStore::new());
        let writer = SaveWriter::spawn(store.clone());
        let user_id = Uuid::new_v4();

        for index in 0..5 {
            writer.enqueue(request(Uuid::new_v4(), user_id, 1, &format!("chat {index}")));
        }
        writer.flush().await;

        let listed = store.list_chats(user_id).await.expect("list should succeed");
        assert_eq!(listed.len(), 5);
    }
}
