use std::collections::VecDeque;
use std::sync::Arc;

use shared::llm::{LlmChatRequest, LlmGateway, LlmStreamFuture, LlmStreamSummary};
use shared::models::{Event, HotelOffer, LatLng, Place, RawPlace, SearchCategory, nightly_price_label};
use shared::search::{
    DistanceDestination, DistanceEntry, DistanceMatrix, EventSearch, HotelOffers, HotelQuery,
    PlaceQuery, PlaceSearch, SearchError, SearchFuture,
};
use tokio::sync::{Mutex, Notify, mpsc};

/// Replies with queued texts, one chunk per word. When gated, each reply
/// waits for `release` before streaming.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
            gate: None,
        }
    }

    pub fn gated(replies: &[&str], gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(replies)
        }
    }
}

impl LlmGateway for ScriptedLlm {
    fn stream_chat<'a>(
        &'a self,
        _request: LlmChatRequest,
        chunk_tx: mpsc::Sender<String>,
    ) -> LlmStreamFuture<'a> {
        Box::pin(async move {
            if let Some(gate) = self.gate.as_ref() {
                gate.notified().await;
            }
            let text = self
                .replies
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| "Sounds good.".to_string());

            for chunk in text.split_inclusive(' ') {
                let _ = chunk_tx.send(chunk.to_string()).await;
            }

            Ok(LlmStreamSummary {
                model: "scripted".to_string(),
                provider_request_id: None,
                text,
            })
        })
    }
}

pub struct FixedEvents;

impl EventSearch for FixedEvents {
    fn search_events<'a>(&'a self, keyword: &'a str) -> SearchFuture<'a, Vec<Event>> {
        Box::pin(async move {
            if keyword.eq_ignore_ascii_case("outage") {
                return Err(SearchError::ProviderFailure("status=503".to_string()));
            }
            Ok(vec![stadium_event()])
        })
    }
}

pub struct FixedPlaces;

impl PlaceSearch for FixedPlaces {
    fn nearby_places<'a>(&'a self, query: &'a PlaceQuery) -> SearchFuture<'a, Vec<Place>> {
        let places = match query.category {
            SearchCategory::Hotel => vec![
                place("h1", "Century Hotel", "lodging", 4.6, Some(3)),
                place("h2", "Airport Inn", "lodging", 3.1, Some(1)),
            ],
            SearchCategory::Food => vec![place("r1", "Taco Stand", "restaurant", 4.8, Some(1))],
            SearchCategory::Explore => vec![place("x1", "Art Museum", "museum", 4.2, None)],
        };
        Box::pin(async move { Ok(places) })
    }
}

/// Two priced stays near any center except the null island, which fails.
pub struct FixedHotels;

impl HotelOffers for FixedHotels {
    fn hotel_offers<'a>(&'a self, query: &'a HotelQuery) -> SearchFuture<'a, Vec<HotelOffer>> {
        Box::pin(async move {
            if query.center.lat == 0.0 && query.center.lng == 0.0 {
                return Err(SearchError::ProviderFailure("status=500".to_string()));
            }
            Ok(vec![
                hotel_offer("LAXHIL", "Hilton LAX", Some(219.0), query),
                hotel_offer("LAXMOT", "Budget Motel", None, query),
            ])
        })
    }
}

fn hotel_offer(id: &str, name: &str, price: Option<f64>, query: &HotelQuery) -> HotelOffer {
    HotelOffer {
        id: id.to_string(),
        name: name.to_string(),
        address: "5711 W Century Blvd".to_string(),
        city: "LOS ANGELES".to_string(),
        location: Some(query.center),
        price,
        price_label: nightly_price_label(price),
        currency: "USD".to_string(),
        star_rating: Some(4),
        amenities: vec!["WIFI".to_string()],
        room_type: "Standard king".to_string(),
        check_in: query.check_in,
        check_out: query.check_out,
    }
}

pub struct FixedDistances;

impl DistanceMatrix for FixedDistances {
    fn distances<'a>(
        &'a self,
        _origin: LatLng,
        destinations: &'a [DistanceDestination],
    ) -> SearchFuture<'a, Vec<DistanceEntry>> {
        Box::pin(async move {
            Ok(destinations
                .iter()
                .enumerate()
                .map(|(index, destination)| DistanceEntry {
                    id: destination.id.clone(),
                    distance: format!("{}.0 mi", index + 1),
                    distance_meters: (index as u64 + 1) * 1_609,
                    duration: format!("{} mins", (index + 1) * 5),
                    duration_seconds: (index as u64 + 1) * 300,
                    status: "OK".to_string(),
                })
                .collect())
        })
    }
}

pub fn stadium_event() -> Event {
    Event {
        id: "e1".to_string(),
        name: "Eras Tour".to_string(),
        date: "2026-08-01".to_string(),
        time: "19:00:00".to_string(),
        venue: "SoFi Stadium".to_string(),
        city: "Inglewood".to_string(),
        state: "CA".to_string(),
        image: String::new(),
        url: String::new(),
        price_range: "$49.5 - $449".to_string(),
        location: Some(LatLng::new(33.9535, -118.3392)),
    }
}

fn place(id: &str, name: &str, kind: &str, rating: f64, price_level: Option<u8>) -> Place {
    Place::from(RawPlace {
        id: id.to_string(),
        name: name.to_string(),
        address: "Century Blvd".to_string(),
        rating,
        user_ratings_total: 120,
        price_level,
        price_label: None,
        types: vec![kind.to_string()],
        location: LatLng::new(33.95, -118.34),
        photo: None,
        open_now: Some(true),
    })
}
