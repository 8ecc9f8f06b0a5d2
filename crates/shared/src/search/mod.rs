pub mod amadeus;
pub mod filters;
pub mod google;
pub mod location;
pub mod ticketmaster;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Event, HotelOffer, LatLng, Place, SearchCategory};

pub use amadeus::AmadeusHotelsClient;
pub use filters::{Budget, PlaceFilter, SearchFilters, apply_place_filter};
pub use google::GooglePlacesClient;
pub use location::{LocationError, LocationPreference, resolve_search_center};
pub use ticketmaster::TicketmasterClient;

pub type SearchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SearchError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search provider request timed out")]
    Timeout,
    #[error("search provider request failed: {0}")]
    ProviderFailure(String),
    #[error("search provider returned an invalid payload: {0}")]
    InvalidPayload(String),
    #[error("search provider is not configured: missing {0}")]
    NotConfigured(&'static str),
}

impl SearchError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::ProviderFailure(format!("status={}", status.as_u16()))
        } else {
            Self::ProviderFailure("request_unavailable".to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceQuery {
    pub center: LatLng,
    pub category: SearchCategory,
    pub radius_m: u32,
    pub keyword: Option<String>,
}

pub const DEFAULT_HOTEL_RADIUS_M: u32 = 5_000;

/// A stay to price near `center`.
#[derive(Debug, Clone, PartialEq)]
pub struct HotelQuery {
    pub center: LatLng,
    pub radius_m: u32,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: u8,
}

impl HotelQuery {
    /// One adult, one night, a week after `today`.
    pub fn for_next_week(center: LatLng, today: NaiveDate) -> Self {
        let check_in = today.checked_add_days(Days::new(7)).unwrap_or(today);
        Self {
            center,
            radius_m: DEFAULT_HOTEL_RADIUS_M,
            check_in,
            check_out: check_in.checked_add_days(Days::new(1)).unwrap_or(check_in),
            adults: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceDestination {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceEntry {
    pub id: String,
    pub distance: String,
    pub distance_meters: u64,
    pub duration: String,
    pub duration_seconds: u64,
    pub status: String,
}

pub trait EventSearch: Send + Sync {
    fn search_events<'a>(&'a self, keyword: &'a str) -> SearchFuture<'a, Vec<Event>>;
}

pub trait PlaceSearch: Send + Sync {
    fn nearby_places<'a>(&'a self, query: &'a PlaceQuery) -> SearchFuture<'a, Vec<Place>>;
}

pub trait HotelOffers: Send + Sync {
    fn hotel_offers<'a>(&'a self, query: &'a HotelQuery) -> SearchFuture<'a, Vec<HotelOffer>>;
}

pub trait DistanceMatrix: Send + Sync {
    fn distances<'a>(
        &'a self,
        origin: LatLng,
        destinations: &'a [DistanceDestination],
    ) -> SearchFuture<'a, Vec<DistanceEntry>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    #[default]
    Ok,
    Failed,
    NoLocation,
}

/// Search result that tells "no matches" apart from "the search broke".
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome<T> {
    pub items: Vec<T>,
    pub status: SearchStatus,
}

impl<T> SearchOutcome<T> {
    pub fn ok(items: Vec<T>) -> Self {
        Self {
            items,
            status: SearchStatus::Ok,
        }
    }

    pub fn failed() -> Self {
        Self {
            items: Vec::new(),
            status: SearchStatus::Failed,
        }
    }

    pub fn no_location() -> Self {
        Self {
            items: Vec::new(),
            status: SearchStatus::NoLocation,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == SearchStatus::Failed
    }
}

/// Front door for event, place and hotel-offer lookups. Provider errors never
/// escape it.
#[derive(Clone)]
pub struct SearchAdapter {
    events: Arc<dyn EventSearch>,
    places: Arc<dyn PlaceSearch>,
    hotels: Option<Arc<dyn HotelOffers>>,
    result_limit: usize,
}

impl SearchAdapter {
    pub fn new(
        events: Arc<dyn EventSearch>,
        places: Arc<dyn PlaceSearch>,
        result_limit: usize,
    ) -> Self {
        Self {
            events,
            places,
            hotels: None,
            result_limit: result_limit.max(1),
        }
    }

    pub fn with_hotel_offers(mut self, hotels: Arc<dyn HotelOffers>) -> Self {
        self.hotels = Some(hotels);
        self
    }

    pub async fn search_events(&self, keyword: &str) -> SearchOutcome<Event> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return SearchOutcome::ok(Vec::new());
        }

        match self.events.search_events(keyword).await {
            Ok(mut events) => {
                events.truncate(self.result_limit);
                debug!(keyword = %keyword, count = events.len(), "event search completed");
                SearchOutcome::ok(events)
            }
            Err(err) => {
                warn!(keyword = %keyword, "event search failed: {err}");
                SearchOutcome::failed()
            }
        }
    }

    pub async fn search_places(&self, query: &PlaceQuery, filter: &PlaceFilter) -> SearchOutcome<Place> {
        match self.places.nearby_places(query).await {
            Ok(places) => {
                let fetched = places.len();
                let places = apply_place_filter(places, filter, self.result_limit);
                debug!(
                    category = ?query.category,
                    radius_m = query.radius_m,
                    fetched,
                    kept = places.len(),
                    "place search completed"
                );
                SearchOutcome::ok(places)
            }
            Err(err) => {
                warn!(
                    category = ?query.category,
                    radius_m = query.radius_m,
                    "place search failed: {err}"
                );
                SearchOutcome::failed()
            }
        }
    }

    pub async fn search_hotel_offers(&self, query: &HotelQuery) -> SearchOutcome<HotelOffer> {
        let Some(hotels) = self.hotels.as_ref() else {
            warn!("hotel offers lookup is not configured");
            return SearchOutcome::failed();
        };

        match hotels.hotel_offers(query).await {
            Ok(mut offers) => {
                offers.truncate(self.result_limit);
                debug!(
                    radius_m = query.radius_m,
                    check_in = %query.check_in,
                    count = offers.len(),
                    "hotel offer search completed"
                );
                SearchOutcome::ok(offers)
            }
            Err(err) => {
                warn!(radius_m = query.radius_m, "hotel offer search failed: {err}");
                SearchOutcome::failed()
            }
        }
    }
}
