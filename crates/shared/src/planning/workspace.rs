use serde::Serialize;

use super::state::PlanningState;
use crate::itinerary::Itinerary;
use crate::models::{Event, LatLng, Place, PlaceCategory, SearchCategory};
use crate::search::{SearchFilters, SearchOutcome, SearchStatus};

/// Issued when an event search starts; results are applied only if the
/// ticket is still current when they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTicket {
    generation: u64,
    sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceTicket {
    pub category: SearchCategory,
    generation: u64,
    sequence: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultBucket {
    pub places: Vec<Place>,
    pub status: SearchStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Venue,
    Hotel,
    Restaurant,
    Activity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapMarker {
    pub id: String,
    pub name: String,
    pub kind: MarkerKind,
    pub location: LatLng,
}

/// Transient search state of one planning session: the event list, the
/// three place buckets and the per-category filters.
#[derive(Debug, Clone, Default)]
pub struct PlanningWorkspace {
    events: Vec<Event>,
    events_status: SearchStatus,
    event_sequence: u64,
    buckets: [ResultBucket; 3],
    place_sequences: [u64; 3],
    filters: [SearchFilters; 3],
    highlighted: Option<String>,
    generation: u64,
    last_populated: Option<SearchCategory>,
}

impl PlanningWorkspace {
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_status(&self) -> SearchStatus {
        self.events_status
    }

    pub fn find_event(&self, event_id: &str) -> Option<&Event> {
        self.events.iter().find(|event| event.id == event_id)
    }

    pub fn bucket(&self, category: SearchCategory) -> &ResultBucket {
        &self.buckets[category.index()]
    }

    pub fn filters(&self, category: SearchCategory) -> &SearchFilters {
        &self.filters[category.index()]
    }

    pub fn set_filters(&mut self, category: SearchCategory, filters: SearchFilters) {
        self.filters[category.index()] = filters.normalized();
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.highlighted.as_deref()
    }

    pub fn highlight(&mut self, id: impl Into<String>) {
        self.highlighted = Some(id.into());
    }

    pub fn begin_event_search(&mut self) -> EventTicket {
        self.event_sequence += 1;
        EventTicket {
            generation: self.generation,
            sequence: self.event_sequence,
        }
    }

    /// Returns false when the ticket went stale and the results were dropped.
    pub fn apply_events(&mut self, ticket: EventTicket, outcome: SearchOutcome<Event>) -> bool {
        if ticket.generation != self.generation || ticket.sequence != self.event_sequence {
            return false;
        }

        self.events = outcome.items;
        self.events_status = outcome.status;
        true
    }

    pub fn begin_place_search(&mut self, category: SearchCategory) -> PlaceTicket {
        let sequence = &mut self.place_sequences[category.index()];
        *sequence += 1;
        PlaceTicket {
            category,
            generation: self.generation,
            sequence: *sequence,
        }
    }

    /// Stores fresh results for the ticket's bucket, minus anything already
    /// confirmed.
    pub fn apply_places(
        &mut self,
        ticket: PlaceTicket,
        outcome: SearchOutcome<Place>,
        itinerary: &Itinerary,
    ) -> bool {
        let index = ticket.category.index();
        if ticket.generation != self.generation || ticket.sequence != self.place_sequences[index] {
            return false;
        }

        let places = outcome
            .items
            .into_iter()
            .filter(|place| !itinerary.contains_place(&place.id))
            .collect();
        self.buckets[index] = ResultBucket {
            places,
            status: outcome.status,
        };
        self.last_populated = Some(ticket.category);
        true
    }

    /// Drops everything tied to the previously selected event. Filters stay.
    pub fn reset_for_event(&mut self) {
        self.generation += 1;
        self.events.clear();
        self.events_status = SearchStatus::Ok;
        self.buckets = Default::default();
        self.highlighted = None;
        self.last_populated = None;
    }

    pub fn find_place(&self, place_id: &str) -> Option<(SearchCategory, &Place)> {
        SearchCategory::ALL.into_iter().find_map(|category| {
            self.bucket(category)
                .places
                .iter()
                .find(|place| place.id == place_id)
                .map(|place| (category, place))
        })
    }

    pub fn remove_place_everywhere(&mut self, place_id: &str) -> bool {
        let mut removed = false;
        for bucket in &mut self.buckets {
            let before = bucket.places.len();
            bucket.places.retain(|place| place.id != place_id);
            removed |= bucket.places.len() != before;
        }
        if self.highlighted.as_deref() == Some(place_id) {
            self.highlighted = None;
        }
        removed
    }

    /// The one result bucket the UI shows: the open filter panel's, else the
    /// most recently searched.
    pub fn visible_category(&self, state: PlanningState) -> Option<SearchCategory> {
        state.filter_category().or(self.last_populated)
    }

    pub fn map_markers(&self, state: PlanningState, event: Option<&Event>) -> Vec<MapMarker> {
        let mut markers = Vec::new();

        if let Some((event, location)) =
            event.and_then(|event| event.location.map(|location| (event, location)))
        {
            markers.push(MapMarker {
                id: event.id.clone(),
                name: event.venue.clone(),
                kind: MarkerKind::Venue,
                location,
            });
        }

        let categories: &[SearchCategory] = match state.filter_category() {
            Some(SearchCategory::Hotel) => &[SearchCategory::Hotel],
            Some(SearchCategory::Food) => &[SearchCategory::Food],
            Some(SearchCategory::Explore) => &[SearchCategory::Explore],
            None => &[SearchCategory::Hotel, SearchCategory::Food],
        };

        for category in categories {
            markers.extend(self.bucket(*category).places.iter().map(|place| MapMarker {
                id: place.id.clone(),
                name: place.name.clone(),
                kind: match place.category {
                    PlaceCategory::Hotel => MarkerKind::Hotel,
                    PlaceCategory::Restaurant => MarkerKind::Restaurant,
                    PlaceCategory::Activity => MarkerKind::Activity,
                },
                location: place.location,
            }));
        }

        markers
    }
}
