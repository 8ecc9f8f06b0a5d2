use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::itinerary::Itinerary;
use crate::models::{ChatSummary, Event, Message};
use crate::repos::{ChatRecord, StoreError};
use crate::schedule::ScheduleItem;

pub const SESSION_DATA_VERSION: u32 = 1;
pub const UNTITLED_CHAT_TITLE: &str = "Untitled Chat";

/// The persisted `data` blob of a chat. Message history is deliberately not
/// part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default = "default_data_version")]
    pub version: u32,
    #[serde(default)]
    pub itinerary: Itinerary,
    #[serde(default)]
    pub schedule: Vec<ScheduleItem>,
    #[serde(default)]
    pub selected_event: Option<Event>,
}

fn default_data_version() -> u32 {
    SESSION_DATA_VERSION
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub id: Uuid,
    /// `None` until an event is confirmed; untitled sessions are never saved.
    pub title: Option<String>,
    pub itinerary: Itinerary,
    pub schedule: Vec<ScheduleItem>,
    pub selected_event: Option<Event>,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn draft(id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: None,
            itinerary: Itinerary::default(),
            schedule: Vec::new(),
            selected_event: None,
            is_pinned: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_record(record: ChatRecord) -> Result<Self, StoreError> {
        let data = match record.data {
            Some(value) => serde_json::from_value::<SessionData>(value).map_err(|err| {
                StoreError::InvalidData(format!("chat {} data invalid: {err}", record.id))
            })?,
            None => SessionData::empty(),
        };

        Ok(Self {
            id: record.id,
            title: Some(record.title),
            itinerary: data.itinerary,
            schedule: data.schedule,
            selected_event: data.selected_event,
            is_pinned: record.is_pinned,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn data(&self) -> SessionData {
        SessionData {
            version: SESSION_DATA_VERSION,
            itinerary: self.itinerary.clone(),
            schedule: self.schedule.clone(),
            selected_event: self.selected_event.clone(),
        }
    }

    pub fn data_value(&self) -> Result<Value, StoreError> {
        serde_json::to_value(self.data())
            .map_err(|err| StoreError::InvalidData(format!("chat data not serializable: {err}")))
    }
}

impl SessionData {
    pub fn empty() -> Self {
        Self {
            version: SESSION_DATA_VERSION,
            itinerary: Itinerary::default(),
            schedule: Vec::new(),
            selected_event: None,
        }
    }
}

/// Decides whether a session mutation should be written. Nothing is written
/// before the session has loaded, before this client has changed anything, or
/// while the session still has no title.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistenceGate {
    loaded: bool,
    user_mutated: bool,
    dirty: bool,
}

impl PersistenceGate {
    pub fn loaded() -> Self {
        Self {
            loaded: true,
            ..Self::default()
        }
    }

    pub fn record_user_mutation(&mut self) {
        self.user_mutated = true;
        self.dirty = true;
    }

    /// Returns true once per dirty period when the session may be written.
    pub fn take_save(&mut self, session: &ChatSession) -> bool {
        if !(self.loaded && self.user_mutated && self.dirty) {
            return false;
        }
        if session.title.is_none() {
            return false;
        }

        self.dirty = false;
        true
    }
}

/// Pinned first, then most recently updated.
pub fn sort_sessions(sessions: &mut [ChatSummary]) {
    sessions.sort_by_key(|session| (Reverse(session.is_pinned), Reverse(session.updated_at)));
}

pub fn normalize_title(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNTITLED_CHAT_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Synthetic greeting shown when a saved session is reopened.
pub fn welcome_back_message(session: &ChatSession) -> Message {
    let mut text = String::from("Welcome back!");

    match session.itinerary.main_event.as_ref().or(session.selected_event.as_ref()) {
        Some(event) => {
            text.push_str(&format!(
                " You're planning around **{}** at {} on {}.",
                event.name,
                event.venue,
                event.when()
            ));
        }
        None => text.push_str(" Let's keep planning your trip."),
    }

    let place_count = session.itinerary.places.len();
    match place_count {
        0 => {}
        1 => text.push_str(" Your itinerary has 1 place so far."),
        count => text.push_str(&format!(" Your itinerary has {count} places so far.")),
    }

    if !session.schedule.is_empty() {
        text.push_str(" Your schedule is ready whenever you want to review it.");
    }

    text.push_str(" What would you like to do next?");
    Message::assistant(text)
}
