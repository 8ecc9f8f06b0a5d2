mod support;

use chrono::{Duration, Utc};
use serde_json::json;
use serial_test::serial;
use shared::repos::auth::hash_access_token;
use shared::repos::{ChatStore, ChatUpsert, IdentityResolver};
use uuid::Uuid;

fn upsert(id: Uuid, title: &str, is_pinned: Option<bool>) -> ChatUpsert {
    ChatUpsert {
        id,
        title: title.to_string(),
        data: json!({"version": 1, "schedule": []}),
        is_pinned,
    }
}

#[tokio::test]
#[serial]
async fn chats_round_trip_and_stay_scoped_to_owner() {
    let store = support::test_store().await;
    support::reset_database(store.pool()).await;

    let user_a = Uuid::new_v4();
    let user_b = Uuid::new_v4();
    let chat_id = Uuid::new_v4();

    store
        .upsert_chat(user_a, upsert(chat_id, "Eras Tour", None))
        .await
        .expect("first save should succeed");
    store
        .set_pinned(user_a, chat_id, true)
        .await
        .expect("pin should succeed");
    store
        .upsert_chat(user_a, upsert(chat_id, "Eras Tour weekend", None))
        .await
        .expect("second save should succeed");

    let record = store
        .get_chat(user_a, chat_id)
        .await
        .expect("load should succeed")
        .expect("chat should exist");
    assert_eq!(record.title, "Eras Tour weekend");
    assert!(record.is_pinned, "a save without a pin flag keeps the stored one");
    assert_eq!(record.data, Some(json!({"version": 1, "schedule": []})));

    assert!(
        store
            .get_chat(user_b, chat_id)
            .await
            .expect("cross-user load should succeed")
            .is_none()
    );
    assert!(
        store
            .upsert_chat(user_b, upsert(chat_id, "Hijacked", None))
            .await
            .is_err()
    );
    assert!(
        !store
            .rename_chat(user_b, chat_id, "Hijacked")
            .await
            .expect("cross-user rename should run")
    );
    assert!(
        !store
            .delete_chat(user_b, chat_id)
            .await
            .expect("cross-user delete should run")
    );

    let listed = store.list_chats(user_a).await.expect("list should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Eras Tour weekend");

    assert!(
        store
            .delete_chat(user_a, chat_id)
            .await
            .expect("delete should succeed")
    );
    assert!(
        store
            .list_chats(user_a)
            .await
            .expect("list should succeed")
            .is_empty()
    );
}

#[tokio::test]
#[serial]
async fn bearer_tokens_resolve_only_while_active() {
    let store = support::test_store().await;
    support::reset_database(store.pool()).await;

    let user_id = Uuid::new_v4();
    store
        .create_session(
            user_id,
            &hash_access_token("live-token"),
            Utc::now() + Duration::hours(1),
        )
        .await
        .expect("live session should insert");
    store
        .create_session(
            user_id,
            &hash_access_token("expired-token"),
            Utc::now() - Duration::minutes(1),
        )
        .await
        .expect("expired session should insert");

    assert_eq!(
        store
            .resolve_user("live-token")
            .await
            .expect("lookup should succeed"),
        Some(user_id)
    );
    assert_eq!(
        store
            .resolve_user("expired-token")
            .await
            .expect("lookup should succeed"),
        None
    );
    assert_eq!(
        store
            .resolve_user("unknown-token")
            .await
            .expect("lookup should succeed"),
        None
    );
}
