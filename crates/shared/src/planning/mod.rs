mod state;
mod workspace;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub use state::{PlanningState, PlanningTrigger, TransitionError};
pub use workspace::{EventTicket, MapMarker, MarkerKind, PlaceTicket, PlanningWorkspace, ResultBucket};

use crate::directives::{FindPlacesParams, strip_directives};
use crate::itinerary::{ConfirmOutcome, Itinerary, ItineraryItem};
use crate::llm::schedule_request;
use crate::models::{Event, LatLng, Message, Place, Role, SearchCategory};
use crate::schedule::ScheduleItem;
use crate::search::{
    LocationError, PlaceFilter, PlaceQuery, SearchFilters, SearchOutcome, SearchStatus,
    resolve_search_center,
};
use crate::session::{ChatSession, PersistenceGate, welcome_back_message};

#[derive(Debug, Error, PartialEq)]
pub enum PlanningError {
    #[error("no event has been selected")]
    NoSelectedEvent,
    #[error("event {0} is not in the current results")]
    UnknownEvent(String),
    #[error("place {0} is not in the current results")]
    UnknownPlace(String),
    #[error("itinerary has no item {0}")]
    UnknownItineraryItem(String),
    #[error("itinerary is empty")]
    EmptyItinerary,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Everything needed to run one place search outside the session lock.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceSearchPlan {
    pub ticket: PlaceTicket,
    pub query: PlaceQuery,
    pub filter: PlaceFilter,
}

/// How a place search starts. Without a located event the category's bucket
/// is already set to an empty `no_location` result and nothing is fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceSearchStart {
    Ready(PlaceSearchPlan),
    NoLocation(SearchCategory),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaceConfirmation {
    Added { place: Place, source: SearchCategory },
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiltersView {
    pub hotel: SearchFilters,
    pub food: SearchFilters,
    pub explore: SearchFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsView {
    pub category: SearchCategory,
    pub places: Vec<Place>,
    pub status: SearchStatus,
}

/// Browser-facing projection of a planning session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub title: Option<String>,
    pub is_pinned: bool,
    pub state: PlanningState,
    pub messages: Vec<DisplayMessage>,
    pub events: Vec<Event>,
    pub events_status: SearchStatus,
    pub results: Option<ResultsView>,
    pub highlighted: Option<String>,
    pub map_markers: Vec<MapMarker>,
    pub selected_event: Option<Event>,
    pub itinerary: Itinerary,
    pub schedule: Vec<ScheduleItem>,
    pub filters: FiltersView,
}

/// One conversation's planning state. All methods are synchronous and apply
/// their whole effect or none of it.
#[derive(Debug, Clone)]
pub struct PlanningSession {
    session: ChatSession,
    transcript: Vec<Message>,
    state: PlanningState,
    workspace: PlanningWorkspace,
    gate: PersistenceGate,
}

impl PlanningSession {
    pub fn new_draft(id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            session: ChatSession::draft(id, now),
            transcript: Vec::new(),
            state: PlanningState::Idle,
            workspace: PlanningWorkspace::default(),
            gate: PersistenceGate::loaded(),
        }
    }

    /// Reopens a saved session. History is not restored; a greeting stands in.
    pub fn restore(session: ChatSession) -> Self {
        let state = if session.selected_event.is_some() {
            PlanningState::EventSelected
        } else {
            PlanningState::Idle
        };

        Self {
            transcript: vec![welcome_back_message(&session)],
            session,
            state,
            workspace: PlanningWorkspace::default(),
            gate: PersistenceGate::loaded(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.session.id
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn state(&self) -> PlanningState {
        self.state
    }

    pub fn workspace(&self) -> &PlanningWorkspace {
        &self.workspace
    }

    pub fn itinerary(&self) -> &Itinerary {
        &self.session.itinerary
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// True once per dirty period when a snapshot should be written.
    pub fn take_save(&mut self) -> bool {
        self.gate.take_save(&self.session)
    }

    pub fn set_pinned(&mut self, is_pinned: bool) {
        self.session.is_pinned = is_pinned;
    }

    pub fn set_title(&mut self, title: String) {
        self.session.title = Some(title);
    }

    pub fn push_user_message(&mut self, content: impl Into<String>) {
        self.transcript.push(Message::user(content));
    }

    pub fn begin_assistant_message(&mut self) {
        self.transcript.push(Message::assistant(String::new()));
    }

    /// Replaces the raw text of the in-flight assistant message.
    pub fn update_assistant_message(&mut self, raw: &str) {
        if let Some(message) = self
            .transcript
            .last_mut()
            .filter(|message| message.role == Role::Assistant)
        {
            message.content.clear();
            message.content.push_str(raw);
        }
    }

    pub fn discard_empty_assistant_message(&mut self) -> bool {
        let empty = self
            .transcript
            .last()
            .is_some_and(|message| message.role == Role::Assistant && message.content.trim().is_empty());
        if empty {
            self.transcript.pop();
        }
        empty
    }

    /// Transcript sent to the model: raw content, directives included.
    pub fn llm_transcript(&self) -> Vec<Message> {
        self.transcript
            .iter()
            .filter(|message| !(message.role == Role::Assistant && message.content.is_empty()))
            .cloned()
            .collect()
    }

    pub fn display_messages(&self) -> Vec<DisplayMessage> {
        self.transcript
            .iter()
            .map(|message| DisplayMessage {
                role: message.role,
                content: match message.role {
                    Role::User => message.content.clone(),
                    Role::Assistant => strip_directives(&message.content),
                },
            })
            .collect()
    }

    pub fn begin_event_search(&mut self) -> EventTicket {
        self.workspace.begin_event_search()
    }

    pub fn apply_event_results(&mut self, ticket: EventTicket, outcome: SearchOutcome<Event>) -> bool {
        let populated = !outcome.items.is_empty();
        if !self.workspace.apply_events(ticket, outcome) {
            return false;
        }
        if populated {
            self.advance(PlanningTrigger::EventsListed);
        }
        true
    }

    pub fn select_event(&mut self, event_id: &str) -> Result<(), PlanningError> {
        if self.workspace.find_event(event_id).is_none() {
            return Err(PlanningError::UnknownEvent(event_id.to_string()));
        }
        self.workspace.highlight(event_id);
        Ok(())
    }

    /// Makes a listed event the trip's main event. Transient results are
    /// reset; confirmed places and the schedule stay.
    pub fn confirm_event(&mut self, event_id: &str) -> Result<Event, PlanningError> {
        let event = self
            .workspace
            .find_event(event_id)
            .cloned()
            .ok_or_else(|| PlanningError::UnknownEvent(event_id.to_string()))?;

        self.workspace.reset_for_event();
        self.session.itinerary.set_main_event(event.clone());
        self.session.selected_event = Some(event.clone());
        if self.session.title.is_none() {
            self.session.title = Some(event.name.clone());
        }
        self.state = PlanningState::EventSelected;
        self.transcript.push(Message::user(format!(
            "I want to attend: {} at {} on {}",
            event.name, event.venue, event.date
        )));
        self.gate.record_user_mutation();

        Ok(event)
    }

    pub fn mark_confirm_event_pending(&mut self) {
        self.advance(PlanningTrigger::ConfirmEventDirective);
    }

    pub fn request_hotels(&mut self) -> Result<(), PlanningError> {
        if self.session.selected_event.is_none() {
            return Err(PlanningError::NoSelectedEvent);
        }
        self.state = self.state.transition(PlanningTrigger::AskHotels)?;
        Ok(())
    }

    pub fn accept_prompt(&mut self) -> Result<SearchCategory, PlanningError> {
        let next = self.state.transition(PlanningTrigger::Accept)?;
        let category = next
            .filter_category()
            .ok_or(PlanningError::Transition(TransitionError {
                from: self.state,
                trigger: PlanningTrigger::Accept,
            }))?;
        self.state = next;
        Ok(category)
    }

    /// Declines the open prompt and records the quick reply for the model.
    pub fn decline_prompt(&mut self) -> Result<String, PlanningError> {
        let category = self.state.prompt_category();
        let next = self.state.transition(PlanningTrigger::Decline)?;
        let label = category.map_or("that", SearchCategory::plural_label);
        let reply = format!("No thanks, I'll skip {label} for now.");

        self.state = next;
        self.transcript.push(Message::user(reply.clone()));
        Ok(reply)
    }

    pub fn open_filters(&mut self, category: SearchCategory) {
        self.advance(PlanningTrigger::OpenFilters(category));
    }

    pub fn close_panel(&mut self) {
        self.advance(PlanningTrigger::ClosePanel);
    }

    pub fn update_filters(&mut self, category: SearchCategory, filters: SearchFilters) {
        self.workspace.set_filters(category, filters);
    }

    /// Search from the open filter panel, using that panel's filters.
    pub fn plan_filter_search(
        &mut self,
        category: SearchCategory,
    ) -> Result<PlaceSearchStart, PlanningError> {
        self.state.transition(PlanningTrigger::RunFilterSearch(category))?;
        let filters = self.workspace.filters(category).clone();
        Ok(self.start_place_search(category, &filters))
    }

    /// Search requested by a `FIND_PLACES` directive. Its parameters become
    /// the category's filters. Needs a selected event.
    pub fn plan_directive_search(
        &mut self,
        params: FindPlacesParams,
    ) -> Result<PlaceSearchStart, PlanningError> {
        let event = self
            .session
            .selected_event
            .as_ref()
            .ok_or(PlanningError::NoSelectedEvent)?;
        let located = event.location.is_some();

        let category = params.category;
        let mut filters = self.workspace.filters(category).clone();
        filters.radius_m = params.radius_m;
        filters.budget = Some(params.budget);
        filters.min_rating = params.min_rating;
        self.workspace.set_filters(category, filters);
        let filters = self.workspace.filters(category).clone();

        if !located {
            return Ok(self.mark_no_location(category));
        }
        Ok(self.start_place_search(category, &filters))
    }

    fn start_place_search(
        &mut self,
        category: SearchCategory,
        filters: &SearchFilters,
    ) -> PlaceSearchStart {
        match resolve_search_center(
            None,
            filters.location_preference,
            self.session.selected_event.as_ref(),
            &self.session.itinerary,
        ) {
            Ok(center) => PlaceSearchStart::Ready(PlaceSearchPlan {
                ticket: self.workspace.begin_place_search(category),
                query: PlaceQuery {
                    center,
                    category,
                    radius_m: filters.radius_m,
                    keyword: filters.keyword.clone(),
                },
                filter: filters.place_filter(),
            }),
            Err(LocationError::NoLocatedEvent) => self.mark_no_location(category),
        }
    }

    /// Replaces the bucket with an empty `no_location` result. Searches still
    /// in flight for the category go stale.
    fn mark_no_location(&mut self, category: SearchCategory) -> PlaceSearchStart {
        let ticket = self.workspace.begin_place_search(category);
        self.workspace
            .apply_places(ticket, SearchOutcome::no_location(), &self.session.itinerary);
        PlaceSearchStart::NoLocation(category)
    }

    pub fn apply_place_results(&mut self, ticket: PlaceTicket, outcome: SearchOutcome<Place>) -> bool {
        self.workspace
            .apply_places(ticket, outcome, &self.session.itinerary)
    }

    pub fn select_place(&mut self, place_id: &str) -> Result<(), PlanningError> {
        if self.workspace.find_place(place_id).is_none() {
            return Err(PlanningError::UnknownPlace(place_id.to_string()));
        }
        self.workspace.highlight(place_id);
        Ok(())
    }

    /// Adds a result to the itinerary, removes it from every bucket, tells
    /// the model, and advances the workflow, all in one step. Confirming a
    /// place that is already in the itinerary changes nothing.
    pub fn confirm_place(&mut self, place_id: &str) -> Result<PlaceConfirmation, PlanningError> {
        if self.session.itinerary.contains_place(place_id) {
            self.workspace.remove_place_everywhere(place_id);
            return Ok(PlaceConfirmation::AlreadyPresent);
        }

        let (source, place) = self
            .workspace
            .find_place(place_id)
            .map(|(source, place)| (source, place.clone()))
            .ok_or_else(|| PlanningError::UnknownPlace(place_id.to_string()))?;
        let next = self.state.transition(PlanningTrigger::PlaceConfirmed {
            category: place.category,
            source,
        })?;

        if self.session.itinerary.add_place(place.clone()) == ConfirmOutcome::AlreadyPresent {
            return Ok(PlaceConfirmation::AlreadyPresent);
        }
        self.workspace.remove_place_everywhere(place_id);
        self.transcript.push(Message::user(format!(
            "I've added {} ({}) to my itinerary.",
            place.name,
            place.category.label()
        )));
        self.state = next;
        self.gate.record_user_mutation();

        Ok(PlaceConfirmation::Added { place, source })
    }

    pub fn remove_itinerary_item(&mut self, item_id: &str) -> Result<ItineraryItem, PlanningError> {
        let removed = self
            .session
            .itinerary
            .remove(item_id)
            .ok_or_else(|| PlanningError::UnknownItineraryItem(item_id.to_string()))?;

        if let ItineraryItem::Event(event) = &removed {
            if self
                .session
                .selected_event
                .as_ref()
                .is_some_and(|selected| selected.id == event.id)
            {
                self.session.selected_event = None;
                self.workspace.reset_for_event();
            }
            self.state = PlanningState::Idle;
        }
        self.gate.record_user_mutation();

        Ok(removed)
    }

    /// Queues the schedule request as a user message and returns its text.
    pub fn request_schedule(&mut self) -> Result<String, PlanningError> {
        if self.session.itinerary.is_empty() {
            return Err(PlanningError::EmptyItinerary);
        }
        let request = schedule_request(&self.session.itinerary);
        self.transcript.push(Message::user(request.clone()));
        Ok(request)
    }

    pub fn apply_schedule(&mut self, schedule: Vec<ScheduleItem>) {
        self.session.schedule = schedule;
        self.gate.record_user_mutation();
    }

    pub fn view(&self) -> SessionView {
        let results = self
            .workspace
            .visible_category(self.state)
            .map(|category| {
                let bucket = self.workspace.bucket(category);
                ResultsView {
                    category,
                    places: bucket.places.clone(),
                    status: bucket.status,
                }
            });

        SessionView {
            id: self.session.id,
            title: self.session.title.clone(),
            is_pinned: self.session.is_pinned,
            state: self.state,
            messages: self.display_messages(),
            events: self.workspace.events().to_vec(),
            events_status: self.workspace.events_status(),
            results,
            highlighted: self.workspace.highlighted().map(str::to_string),
            map_markers: self
                .workspace
                .map_markers(self.state, self.session.selected_event.as_ref()),
            selected_event: self.session.selected_event.clone(),
            itinerary: self.session.itinerary.clone(),
            schedule: self.session.schedule.clone(),
            filters: FiltersView {
                hotel: self.workspace.filters(SearchCategory::Hotel).clone(),
                food: self.workspace.filters(SearchCategory::Food).clone(),
                explore: self.workspace.filters(SearchCategory::Explore).clone(),
            },
        }
    }

    /// Applies a trigger that is legal from every state it can be fired in.
    fn advance(&mut self, trigger: PlanningTrigger) {
        if let Ok(next) = self.state.transition(trigger) {
            self.state = next;
        }
    }
}
