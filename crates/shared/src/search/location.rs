use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::itinerary::Itinerary;
use crate::models::{Event, LatLng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPreference {
    #[default]
    Venue,
    LastHotel,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("no located event is selected")]
    NoLocatedEvent,
}

/// Picks the center for a nearby search: explicit override, then the latest
/// confirmed hotel when preferred, then the selected event's venue.
pub fn resolve_search_center(
    override_center: Option<LatLng>,
    preference: LocationPreference,
    event: Option<&Event>,
    itinerary: &Itinerary,
) -> Result<LatLng, LocationError> {
    if let Some(center) = override_center {
        return Ok(center);
    }

    if preference == LocationPreference::LastHotel {
        match itinerary.latest_hotel() {
            Some(hotel) => return Ok(hotel.location),
            None => warn!("no confirmed hotel for last_hotel search; using event venue"),
        }
    }

    event
        .and_then(|event| event.location)
        .ok_or(LocationError::NoLocatedEvent)
}
