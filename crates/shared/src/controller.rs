use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::directives::{Directive, DirectiveKind, DirectiveScanner};
use crate::itinerary::Itinerary;
use crate::llm::{LlmChatRequest, LlmGateway, LlmGatewayError, PLANNER_SYSTEM_PROMPT};
use crate::models::{Event, Place, SearchCategory};
use crate::persistence::{SaveRequest, SaveWriter, SidebarEdits, next_sequence};
use crate::planning::{
    PlaceConfirmation, PlaceSearchPlan, PlaceSearchStart, PlanningError, PlanningSession,
    PlanningState, SessionView,
};
use crate::repos::{ChatStore, StoreError};
use crate::schedule::{ScheduleItem, extract_schedule};
use crate::search::{SearchAdapter, SearchFilters, SearchStatus};
use crate::session::ChatSession;

const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Collaborators shared by every planning controller in the process.
pub struct PlannerDeps {
    pub llm: Arc<dyn LlmGateway>,
    pub search: SearchAdapter,
    pub writer: Option<SaveWriter>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PlannerAction {
    SendMessage { text: String },
    SelectEvent { event_id: String },
    ConfirmEvent { event_id: String },
    SelectPlace { place_id: String },
    ConfirmPlace { place_id: String },
    FindHotels,
    AcceptPrompt,
    DeclinePrompt,
    OpenFilters { category: SearchCategory },
    ClosePanel,
    UpdateFilters {
        category: SearchCategory,
        filters: SearchFilters,
    },
    RunFilterSearch { category: SearchCategory },
    RemoveItineraryItem { item_id: String },
    GenerateSchedule,
}

/// Incremental updates streamed to the browser while an action runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionUpdate {
    AssistantStarted,
    /// Directive-free text of the in-flight assistant message.
    AssistantContent { content: String },
    AssistantFinished { content: String },
    AssistantFailed { message: String },
    DirectiveFired { directive: DirectiveKind },
    EventsUpdated {
        events: Vec<Event>,
        status: SearchStatus,
    },
    PlacesUpdated {
        category: SearchCategory,
        places: Vec<Place>,
        status: SearchStatus,
    },
    StateChanged { state: PlanningState },
    ItineraryChanged { itinerary: Itinerary },
    ScheduleUpdated { schedule: Vec<ScheduleItem> },
    ScheduleUnchanged { reason: String },
    Rejected { code: String, message: String },
    Snapshot { view: Box<SessionView> },
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Planning(#[from] PlanningError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("chat not found")]
    NotFound,
    #[error("message text is empty")]
    EmptyMessage,
}

impl ControllerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Planning(PlanningError::Transition(_)) => "invalid_transition",
            Self::Planning(PlanningError::NoSelectedEvent) => "no_selected_event",
            Self::Planning(PlanningError::UnknownEvent(_)) => "unknown_event",
            Self::Planning(PlanningError::UnknownPlace(_)) => "unknown_place",
            Self::Planning(PlanningError::UnknownItineraryItem(_)) => "unknown_itinerary_item",
            Self::Planning(PlanningError::EmptyItinerary) => "empty_itinerary",
            Self::Store(_) => "store_unavailable",
            Self::NotFound => "not_found",
            Self::EmptyMessage => "empty_message",
        }
    }
}

/// Drives one conversation: runs actions against the planning session,
/// streams the model's reply, fires directives and queues saves.
pub struct PlanningController {
    deps: Arc<PlannerDeps>,
    owner: Option<Uuid>,
    session: PlanningSession,
    published_state: PlanningState,
    save_sequence: u64,
    sidebar: Arc<SidebarEdits>,
}

impl PlanningController {
    pub fn new_draft(deps: Arc<PlannerDeps>, owner: Option<Uuid>) -> Self {
        let session = PlanningSession::new_draft(Uuid::new_v4(), Utc::now());
        Self::with_session(deps, owner, session)
    }

    pub async fn open(
        deps: Arc<PlannerDeps>,
        store: &dyn ChatStore,
        owner: Uuid,
        chat_id: Uuid,
    ) -> Result<Self, ControllerError> {
        let record = store
            .get_chat(owner, chat_id)
            .await?
            .ok_or(ControllerError::NotFound)?;
        let session = PlanningSession::restore(ChatSession::from_record(record)?);
        info!(session_id = %chat_id, "planning session restored");

        Ok(Self::with_session(deps, Some(owner), session))
    }

    fn with_session(deps: Arc<PlannerDeps>, owner: Option<Uuid>, session: PlanningSession) -> Self {
        Self {
            published_state: session.state(),
            deps,
            owner,
            session,
            save_sequence: 0,
            sidebar: Arc::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.session.id()
    }

    pub fn owner(&self) -> Option<Uuid> {
        self.owner
    }

    pub fn session(&self) -> &PlanningSession {
        &self.session
    }

    pub fn view(&self) -> SessionView {
        self.session.view()
    }

    /// Cell through which sidebar edits reach this session, even while an
    /// action holds it.
    pub fn sidebar(&self) -> Arc<SidebarEdits> {
        self.sidebar.clone()
    }

    /// Takes pending sidebar edits into the session.
    pub fn sync_sidebar(&mut self) {
        let mut pending = self.sidebar.lock();
        if let Some(title) = pending.title.take() {
            self.session.set_title(title);
        }
        if let Some(is_pinned) = pending.is_pinned.take() {
            self.session.set_pinned(is_pinned);
        }
    }

    /// Runs one action. Updates go to `updates`; a `snapshot` always closes
    /// the sequence, also when the action is rejected.
    pub async fn apply(
        &mut self,
        action: PlannerAction,
        updates: &mpsc::Sender<SessionUpdate>,
    ) -> Result<(), ControllerError> {
        self.sync_sidebar();
        let result = self.dispatch(action, updates).await;
        if let Err(err) = &result {
            debug!(session_id = %self.id(), code = err.code(), "planner action rejected: {err}");
            emit(
                updates,
                SessionUpdate::Rejected {
                    code: err.code().to_string(),
                    message: err.to_string(),
                },
            )
            .await;
        }

        self.publish_state(updates).await;
        self.persist();
        emit(
            updates,
            SessionUpdate::Snapshot {
                view: Box::new(self.session.view()),
            },
        )
        .await;
        result
    }

    async fn dispatch(
        &mut self,
        action: PlannerAction,
        updates: &mpsc::Sender<SessionUpdate>,
    ) -> Result<(), ControllerError> {
        match action {
            PlannerAction::SendMessage { text } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(ControllerError::EmptyMessage);
                }
                self.session.push_user_message(text);
                self.stream_turn(updates).await;
            }
            PlannerAction::SelectEvent { event_id } => self.session.select_event(&event_id)?,
            PlannerAction::ConfirmEvent { event_id } => {
                let event = self.session.confirm_event(&event_id)?;
                info!(session_id = %self.id(), event_id = %event.id, "event confirmed");
                emit(
                    updates,
                    SessionUpdate::EventsUpdated {
                        events: Vec::new(),
                        status: SearchStatus::Ok,
                    },
                )
                .await;
                self.publish_itinerary(updates).await;
                self.publish_state(updates).await;
                self.persist();
                self.stream_turn(updates).await;
            }
            PlannerAction::SelectPlace { place_id } => self.session.select_place(&place_id)?,
            PlannerAction::ConfirmPlace { place_id } => {
                match self.session.confirm_place(&place_id)? {
                    PlaceConfirmation::Added { place, source } => {
                        info!(
                            session_id = %self.id(),
                            place_id = %place.id,
                            category = ?place.category,
                            "place confirmed"
                        );
                        self.publish_bucket(source, updates).await;
                        self.publish_itinerary(updates).await;
                        self.publish_state(updates).await;
                        self.persist();
                        self.stream_turn(updates).await;
                    }
                    PlaceConfirmation::AlreadyPresent => {
                        debug!(session_id = %self.id(), place_id = %place_id, "place already confirmed");
                    }
                }
            }
            PlannerAction::FindHotels => self.session.request_hotels()?,
            PlannerAction::AcceptPrompt => {
                self.session.accept_prompt()?;
            }
            PlannerAction::DeclinePrompt => {
                self.session.decline_prompt()?;
                self.publish_state(updates).await;
                self.stream_turn(updates).await;
            }
            PlannerAction::OpenFilters { category } => self.session.open_filters(category),
            PlannerAction::ClosePanel => self.session.close_panel(),
            PlannerAction::UpdateFilters { category, filters } => {
                self.session.update_filters(category, filters);
            }
            PlannerAction::RunFilterSearch { category } => {
                let start = self.session.plan_filter_search(category)?;
                self.start_place_search(start, updates).await;
            }
            PlannerAction::RemoveItineraryItem { item_id } => {
                self.session.remove_itinerary_item(&item_id)?;
                self.publish_itinerary(updates).await;
            }
            PlannerAction::GenerateSchedule => self.generate_schedule(updates).await?,
        }

        Ok(())
    }

    async fn generate_schedule(
        &mut self,
        updates: &mpsc::Sender<SessionUpdate>,
    ) -> Result<(), ControllerError> {
        self.session.request_schedule()?;
        let Some(response) = self.stream_turn(updates).await else {
            emit(
                updates,
                SessionUpdate::ScheduleUnchanged {
                    reason: "assistant response failed".to_string(),
                },
            )
            .await;
            return Ok(());
        };

        match extract_schedule(&response) {
            Ok(schedule) => {
                info!(session_id = %self.id(), items = schedule.len(), "schedule generated");
                self.session.apply_schedule(schedule.clone());
                emit(updates, SessionUpdate::ScheduleUpdated { schedule }).await;
            }
            Err(err) => {
                warn!(session_id = %self.id(), "schedule response not usable: {err}");
                emit(
                    updates,
                    SessionUpdate::ScheduleUnchanged {
                        reason: err.to_string(),
                    },
                )
                .await;
            }
        }

        Ok(())
    }

    /// Streams one assistant reply into a fresh placeholder message and
    /// returns its raw text, or `None` when nothing usable arrived.
    async fn stream_turn(&mut self, updates: &mpsc::Sender<SessionUpdate>) -> Option<String> {
        let requester = self
            .owner
            .map_or_else(|| self.id().to_string(), |owner| owner.to_string());
        let request = LlmChatRequest::new(PLANNER_SYSTEM_PROMPT, self.session.llm_transcript())
            .with_requester_id(requester);

        self.session.begin_assistant_message();
        emit(updates, SessionUpdate::AssistantStarted).await;

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(CHUNK_CHANNEL_CAPACITY);
        let llm = self.deps.llm.clone();
        let stream_task = tokio::spawn(async move { llm.stream_chat(request, chunk_tx).await });

        let mut scanner = DirectiveScanner::new();
        while let Some(chunk) = chunk_rx.recv().await {
            let fired = scanner.push(&chunk);
            self.session.update_assistant_message(scanner.raw());
            emit(
                updates,
                SessionUpdate::AssistantContent {
                    content: scanner.display().to_string(),
                },
            )
            .await;
            for directive in fired {
                self.handle_directive(directive, updates).await;
            }
        }

        for directive in scanner.finish() {
            self.handle_directive(directive, updates).await;
        }
        self.session.update_assistant_message(scanner.raw());

        let outcome = match stream_task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(LlmGatewayError::StreamInterrupted(format!(
                "stream task failed: {err}"
            ))),
        };

        match outcome {
            Ok(summary) if !scanner.raw().trim().is_empty() => {
                debug!(
                    session_id = %self.id(),
                    model = %summary.model,
                    chars = scanner.raw().len(),
                    "assistant response completed"
                );
                emit(
                    updates,
                    SessionUpdate::AssistantFinished {
                        content: scanner.display().to_string(),
                    },
                )
                .await;
                Some(scanner.raw().to_string())
            }
            Ok(_) => {
                self.session.discard_empty_assistant_message();
                warn!(session_id = %self.id(), "assistant returned an empty response");
                emit(
                    updates,
                    SessionUpdate::AssistantFailed {
                        message: "assistant returned an empty response".to_string(),
                    },
                )
                .await;
                None
            }
            Err(err) => {
                self.session.discard_empty_assistant_message();
                warn!(
                    session_id = %self.id(),
                    received_chars = scanner.raw().len(),
                    "assistant stream failed: {err}"
                );
                emit(
                    updates,
                    SessionUpdate::AssistantFailed {
                        message: err.to_string(),
                    },
                )
                .await;
                None
            }
        }
    }

    async fn handle_directive(&mut self, directive: Directive, updates: &mpsc::Sender<SessionUpdate>) {
        let kind = directive.kind();
        debug!(session_id = %self.id(), directive = kind.token(), "directive fired");
        emit(updates, SessionUpdate::DirectiveFired { directive: kind }).await;

        match directive {
            Directive::SearchEvent { keyword } => {
                let ticket = self.session.begin_event_search();
                let outcome = self.deps.search.search_events(&keyword).await;
                if self.session.apply_event_results(ticket, outcome) {
                    emit(
                        updates,
                        SessionUpdate::EventsUpdated {
                            events: self.session.workspace().events().to_vec(),
                            status: self.session.workspace().events_status(),
                        },
                    )
                    .await;
                } else {
                    debug!(session_id = %self.id(), keyword = %keyword, "stale event results dropped");
                }
            }
            Directive::FindPlaces(params) => match self.session.plan_directive_search(params) {
                Ok(start) => self.start_place_search(start, updates).await,
                Err(err) => {
                    warn!(
                        session_id = %self.id(),
                        category = ?params.category,
                        "skipping FIND_PLACES: {err}"
                    );
                }
            },
            Directive::AskHotels => {
                if let Err(err) = self.session.request_hotels() {
                    warn!(session_id = %self.id(), "skipping ASK_HOTELS: {err}");
                }
            }
            Directive::ConfirmEvent => self.session.mark_confirm_event_pending(),
        }

        self.publish_state(updates).await;
    }

    async fn start_place_search(
        &mut self,
        start: PlaceSearchStart,
        updates: &mpsc::Sender<SessionUpdate>,
    ) {
        match start {
            PlaceSearchStart::Ready(plan) => self.run_place_search(plan, updates).await,
            PlaceSearchStart::NoLocation(category) => {
                info!(session_id = %self.id(), category = ?category, "no located event; place search skipped");
                self.publish_bucket(category, updates).await;
            }
        }
    }

    async fn run_place_search(&mut self, plan: PlaceSearchPlan, updates: &mpsc::Sender<SessionUpdate>) {
        let category = plan.ticket.category;
        let outcome = self.deps.search.search_places(&plan.query, &plan.filter).await;
        if self.session.apply_place_results(plan.ticket, outcome) {
            self.publish_bucket(category, updates).await;
        } else {
            debug!(session_id = %self.id(), category = ?category, "stale place results dropped");
        }
    }

    async fn publish_bucket(&self, category: SearchCategory, updates: &mpsc::Sender<SessionUpdate>) {
        let bucket = self.session.workspace().bucket(category);
        emit(
            updates,
            SessionUpdate::PlacesUpdated {
                category,
                places: bucket.places.clone(),
                status: bucket.status,
            },
        )
        .await;
    }

    async fn publish_itinerary(&self, updates: &mpsc::Sender<SessionUpdate>) {
        emit(
            updates,
            SessionUpdate::ItineraryChanged {
                itinerary: self.session.itinerary().clone(),
            },
        )
        .await;
    }

    async fn publish_state(&mut self, updates: &mpsc::Sender<SessionUpdate>) {
        let state = self.session.state();
        if state == self.published_state {
            return;
        }
        self.published_state = state;
        emit(updates, SessionUpdate::StateChanged { state }).await;
    }

    /// Queues a snapshot when the session is owned, titled and dirty. The
    /// sidebar cell stays locked until the snapshot is queued, so a rename or
    /// delete lands either before it or after it in the writer.
    fn persist(&mut self) {
        let (Some(user_id), Some(writer)) = (self.owner, self.deps.writer.as_ref()) else {
            return;
        };
        let mut pending = self.sidebar.lock();
        if pending.deleted {
            debug!(session_id = %self.session.id(), "chat deleted; snapshot skipped");
            return;
        }
        if let Some(title) = pending.title.take() {
            self.session.set_title(title);
        }
        if let Some(is_pinned) = pending.is_pinned.take() {
            self.session.set_pinned(is_pinned);
        }
        if !self.session.take_save() {
            return;
        }

        let session = self.session.session();
        let Some(title) = session.title.clone() else {
            return;
        };
        let data = match session.data_value() {
            Ok(data) => data,
            Err(err) => {
                warn!(session_id = %session.id, "failed to serialize session snapshot: {err}");
                return;
            }
        };

        self.save_sequence = next_sequence(self.save_sequence);
        writer.enqueue(SaveRequest {
            sequence: self.save_sequence,
            user_id,
            chat_id: session.id,
            title,
            data,
            is_pinned: None,
        });
        drop(pending);
    }
}

async fn emit(updates: &mpsc::Sender<SessionUpdate>, update: SessionUpdate) {
    if updates.send(update).await.is_err() {
        debug!("session update receiver dropped");
    }
}
