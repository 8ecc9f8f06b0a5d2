use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::{Event, Place, PlaceCategory};

/// Confirmed selections: at most one main event plus places in confirmation
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    #[serde(default)]
    pub main_event: Option<Event>,
    #[serde(default)]
    pub places: Vec<Place>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItineraryItem {
    Event(Event),
    Place(Place),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Added,
    AlreadyPresent,
}

impl Itinerary {
    pub fn is_empty(&self) -> bool {
        self.main_event.is_none() && self.places.is_empty()
    }

    /// Replaces the main event, returning the previous one.
    pub fn set_main_event(&mut self, event: Event) -> Option<Event> {
        self.main_event.replace(event)
    }

    pub fn contains_place(&self, place_id: &str) -> bool {
        self.places.iter().any(|place| place.id == place_id)
    }

    pub fn add_place(&mut self, place: Place) -> ConfirmOutcome {
        if self.contains_place(&place.id) {
            return ConfirmOutcome::AlreadyPresent;
        }

        self.places.push(place);
        ConfirmOutcome::Added
    }

    pub fn remove(&mut self, id: &str) -> Option<ItineraryItem> {
        if self
            .main_event
            .as_ref()
            .is_some_and(|event| event.id == id)
        {
            return self.main_event.take().map(ItineraryItem::Event);
        }

        let index = self.places.iter().position(|place| place.id == id)?;
        Some(ItineraryItem::Place(self.places.remove(index)))
    }

    /// Most recently confirmed hotel.
    pub fn latest_hotel(&self) -> Option<&Place> {
        self.places
            .iter()
            .rev()
            .find(|place| place.category == PlaceCategory::Hotel)
    }

    pub fn places_in(&self, category: PlaceCategory) -> impl Iterator<Item = &Place> {
        self.places
            .iter()
            .filter(move |place| place.category == category)
    }

    /// Plain-text rendering used when asking the assistant for a schedule.
    pub fn planning_summary(&self) -> String {
        let mut summary = String::new();

        match &self.main_event {
            Some(event) => {
                let _ = write!(summary, "Main event: {} at {}", event.name, event.venue);
                let locality = event.locality();
                if !locality.is_empty() {
                    let _ = write!(summary, " ({locality})");
                }
                let _ = writeln!(summary, " on {}", event.when());
            }
            None => summary.push_str("Main event: not chosen yet\n"),
        }

        for (category, heading) in [
            (PlaceCategory::Hotel, "Hotels"),
            (PlaceCategory::Restaurant, "Restaurants"),
            (PlaceCategory::Activity, "Activities"),
        ] {
            let mut places = self.places_in(category).peekable();
            if places.peek().is_none() {
                continue;
            }

            let _ = writeln!(summary, "{heading}:");
            for place in places {
                let _ = write!(summary, "- {}", place.name);
                if !place.address.is_empty() {
                    let _ = write!(summary, " ({})", place.address);
                }
                if place.rating > 0.0 {
                    let _ = write!(summary, ", rated {:.1}", place.rating);
                }
                if place.price_level.is_some() {
                    let _ = write!(summary, ", {}", place.price_label);
                }
                summary.push('\n');
            }
        }

        summary
    }
}
