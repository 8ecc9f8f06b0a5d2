use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::{DistanceDestination, DistanceEntry};
use crate::session::SessionData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry. `content` is the raw text exchanged with the model,
/// directives included; the UI renders the stripped projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn query_value(&self) -> String {
        format!("{},{}", self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    pub date: String,
    pub time: String,
    pub venue: String,
    pub city: String,
    pub state: String,
    pub image: String,
    pub url: String,
    pub price_range: String,
    pub location: Option<LatLng>,
}

impl Event {
    pub fn locality(&self) -> String {
        match (self.city.is_empty(), self.state.is_empty()) {
            (false, false) => format!("{}, {}", self.city, self.state),
            (false, true) => self.city.clone(),
            (true, false) => self.state.clone(),
            (true, true) => String::new(),
        }
    }

    pub fn when(&self) -> String {
        if self.time.is_empty() {
            self.date.clone()
        } else {
            format!("{} {}", self.date, self.time)
        }
    }
}

/// The three result buckets, filter panels and search kinds of the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchCategory {
    Hotel,
    Food,
    Explore,
}

impl SearchCategory {
    pub const ALL: [SearchCategory; 3] = [Self::Hotel, Self::Food, Self::Explore];

    pub const fn upstream_type(self) -> &'static str {
        match self {
            Self::Hotel => "lodging",
            Self::Food => "restaurant",
            Self::Explore => "tourist_attraction",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Hotel => 0,
            Self::Food => 1,
            Self::Explore => 2,
        }
    }

    pub const fn plural_label(self) -> &'static str {
        match self {
            Self::Hotel => "hotels",
            Self::Food => "restaurants",
            Self::Explore => "activities",
        }
    }

    /// Accepts the `type=` values the assistant emits as well as the upstream
    /// type names.
    pub fn from_type_name(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hotel" | "hotels" | "lodging" => Some(Self::Hotel),
            "restaurant" | "restaurants" | "food" => Some(Self::Food),
            "explore" | "attraction" | "activity" | "activities" | "tourist_attraction" => {
                Some(Self::Explore)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceCategory {
    Hotel,
    Restaurant,
    Activity,
}

const LODGING_TYPES: [&str; 2] = ["lodging", "hotel"];
const DINING_TYPES: [&str; 7] = [
    "restaurant",
    "food",
    "meal_takeaway",
    "meal_delivery",
    "cafe",
    "bar",
    "bakery",
];

impl PlaceCategory {
    /// Lodging membership wins over every other type.
    pub fn classify(types: &[String]) -> Self {
        let has_any = |candidates: &[&str]| {
            types
                .iter()
                .any(|value| candidates.contains(&value.trim().to_ascii_lowercase().as_str()))
        };

        if has_any(&LODGING_TYPES) {
            Self::Hotel
        } else if has_any(&DINING_TYPES) {
            Self::Restaurant
        } else {
            Self::Activity
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Hotel => "Hotel",
            Self::Restaurant => "Restaurant",
            Self::Activity => "Activity",
        }
    }
}

/// A located venue returned by the places lookup. `category` is derived from
/// `types` exactly once, when the place is built, and re-derived on
/// deserialization so persisted data can never disagree with its types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawPlace")]
pub struct Place {
    pub id: String,
    pub name: String,
    pub address: String,
    pub rating: f64,
    pub user_ratings_total: u32,
    pub price_level: Option<u8>,
    pub price_label: String,
    pub types: Vec<String>,
    pub location: LatLng,
    pub photo: Option<String>,
    pub open_now: Option<bool>,
    pub category: PlaceCategory,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub user_ratings_total: u32,
    #[serde(default)]
    pub price_level: Option<u8>,
    #[serde(default)]
    pub price_label: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    pub location: LatLng,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub open_now: Option<bool>,
}

impl From<RawPlace> for Place {
    fn from(raw: RawPlace) -> Self {
        let category = PlaceCategory::classify(&raw.types);
        let price_label = raw
            .price_label
            .unwrap_or_else(|| price_label(raw.price_level).to_string());

        Self {
            id: raw.id,
            name: raw.name,
            address: raw.address,
            rating: raw.rating,
            user_ratings_total: raw.user_ratings_total,
            price_level: raw.price_level,
            price_label,
            types: raw.types,
            location: raw.location,
            photo: raw.photo,
            open_now: raw.open_now,
            category,
        }
    }
}

pub fn price_label(price_level: Option<u8>) -> &'static str {
    match price_level {
        Some(0) => "Free",
        Some(1) => "$",
        Some(2) => "$$",
        Some(3) => "$$$",
        Some(4) => "$$$$",
        _ => "Price N/A",
    }
}

/// A priced hotel stay for fixed dates. `star_rating` is the property's
/// official class, not a review score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelOffer {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub location: Option<LatLng>,
    pub price: Option<f64>,
    pub price_label: String,
    pub currency: String,
    pub star_rating: Option<u8>,
    pub amenities: Vec<String>,
    pub room_type: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

pub fn nightly_price_label(price: Option<f64>) -> String {
    match price {
        Some(price) => format!("${price:.0}/night"),
        None => "Price N/A".to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: Uuid,
    pub title: String,
    pub is_pinned: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListChatsResponse {
    pub items: Vec<ChatSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDetailResponse {
    pub id: Uuid,
    pub title: String,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: SessionData,
}

/// `failed` is true when the upstream search broke, not when it found nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesResponse {
    pub places: Vec<Place>,
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelsResponse {
    pub hotels: Vec<HotelOffer>,
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistancesRequest {
    pub origin: LatLng,
    pub destinations: Vec<DistanceDestination>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistancesResponse {
    pub distances: Vec<DistanceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
