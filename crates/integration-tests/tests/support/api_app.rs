use std::sync::Arc;

use api_server::http::{AppState, PlannerRegistry, Readiness, build_router};
use shared::controller::PlannerDeps;
use shared::llm::LlmGateway;
use shared::persistence::SaveWriter;
use shared::repos::{ChatStore, MemoryChatStore, StaticIdentityResolver};
use shared::search::SearchAdapter;
use uuid::Uuid;

use super::fakes::{FixedDistances, FixedEvents, FixedHotels, FixedPlaces, ScriptedLlm};

pub const USER_A_TOKEN: &str = "token-user-a";
pub const USER_B_TOKEN: &str = "token-user-b";
pub const USER_A: Uuid = Uuid::from_u128(0x0a11ce00_0000_4000_8000_00000000000a);
pub const USER_B: Uuid = Uuid::from_u128(0x0b0b0000_0000_4000_8000_00000000000b);

pub struct TestApp {
    pub router: axum::Router,
    pub store: Arc<MemoryChatStore>,
    pub writer: SaveWriter,
    pub sessions: PlannerRegistry,
}

impl TestApp {
    /// Waits until every queued session snapshot has reached the store.
    pub async fn flush_saves(&self) {
        self.writer.flush().await;
    }
}

pub fn build_test_app(replies: &[&str]) -> TestApp {
    build_test_app_with_llm(Arc::new(ScriptedLlm::new(replies)))
}

pub fn build_test_app_with_llm(llm: Arc<dyn LlmGateway>) -> TestApp {
    let store = Arc::new(MemoryChatStore::new());
    let chat_store: Arc<dyn ChatStore> = store.clone();
    let writer = SaveWriter::spawn(chat_store.clone());
    let identity = StaticIdentityResolver::new()
        .with_token(USER_A_TOKEN, USER_A)
        .with_token(USER_B_TOKEN, USER_B);
    let sessions = PlannerRegistry::default();

    let state = AppState {
        store: chat_store,
        identity: Arc::new(identity),
        planner: Arc::new(PlannerDeps {
            llm,
            search: SearchAdapter::new(Arc::new(FixedEvents), Arc::new(FixedPlaces), 10)
                .with_hotel_offers(Arc::new(FixedHotels)),
            writer: Some(writer.clone()),
        }),
        distances: Arc::new(FixedDistances),
        sessions: sessions.clone(),
        readiness: Readiness {
            llm: true,
            events: true,
            places: true,
            hotels: true,
        },
    };

    TestApp {
        router: build_router(state),
        store,
        writer,
        sessions,
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
