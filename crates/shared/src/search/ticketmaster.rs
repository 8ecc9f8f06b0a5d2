use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::{EventSearch, SearchError, SearchFuture};
use crate::config::SearchConfig;
use crate::models::{Event, LatLng};

const PAGE_SIZE: &str = "10";
const MIN_WIDE_IMAGE_WIDTH: u32 = 500;

#[derive(Clone)]
pub struct TicketmasterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TicketmasterClient {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| SearchError::ProviderFailure(format!("http_client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.ticketmaster_base_url.clone(),
            api_key: config.ticketmaster_api_key.clone(),
        })
    }

    async fn fetch_events(&self, keyword: &str) -> Result<Vec<Event>, SearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SearchError::NotConfigured("TICKETMASTER_API_KEY"))?;
        let url = Url::parse_with_params(
            &format!("{}/events.json", self.base_url),
            &[("keyword", keyword), ("apikey", api_key), ("size", PAGE_SIZE)],
        )
        .map_err(|err| SearchError::InvalidPayload(format!("request_url: {err}")))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(SearchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::ProviderFailure(format!(
                "status={}",
                status.as_u16()
            )));
        }

        let payload: DiscoveryResponse = response
            .json()
            .await
            .map_err(|_| SearchError::InvalidPayload("response_json_parse_failed".to_string()))?;

        Ok(payload
            .embedded
            .map(|embedded| embedded.events)
            .unwrap_or_default()
            .into_iter()
            .map(DiscoveryEvent::into_event)
            .collect())
    }
}

impl EventSearch for TicketmasterClient {
    fn search_events<'a>(&'a self, keyword: &'a str) -> SearchFuture<'a, Vec<Event>> {
        Box::pin(self.fetch_events(keyword))
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(rename = "_embedded")]
    embedded: Option<DiscoveryEmbedded>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryEmbedded {
    #[serde(default)]
    events: Vec<DiscoveryEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryEvent {
    id: String,
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    dates: Option<DiscoveryDates>,
    #[serde(default)]
    images: Vec<DiscoveryImage>,
    #[serde(default)]
    price_ranges: Vec<DiscoveryPriceRange>,
    #[serde(rename = "_embedded", default)]
    embedded: Option<DiscoveryVenues>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDates {
    start: Option<DiscoveryStart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryStart {
    local_date: Option<String>,
    local_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryImage {
    url: String,
    #[serde(default)]
    ratio: Option<String>,
    #[serde(default)]
    width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryPriceRange {
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryVenues {
    #[serde(default)]
    venues: Vec<DiscoveryVenue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryVenue {
    name: Option<String>,
    city: Option<NamedValue>,
    state: Option<StateValue>,
    location: Option<VenueLocation>,
}

#[derive(Debug, Deserialize)]
struct NamedValue {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateValue {
    state_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VenueLocation {
    latitude: Option<String>,
    longitude: Option<String>,
}

impl VenueLocation {
    fn lat_lng(&self) -> Option<LatLng> {
        let lat = self.latitude.as_deref()?.trim().parse::<f64>().ok()?;
        let lng = self.longitude.as_deref()?.trim().parse::<f64>().ok()?;
        (lat.is_finite() && lng.is_finite()).then(|| LatLng::new(lat, lng))
    }
}

impl DiscoveryEvent {
    fn into_event(self) -> Event {
        let start = self.dates.and_then(|dates| dates.start);
        let (date, time) = match start {
            Some(start) => (start.local_date, start.local_time),
            None => (None, None),
        };
        let venue = self
            .embedded
            .and_then(|embedded| embedded.venues.into_iter().next());
        let image = pick_image(&self.images);
        let price_range = match self.price_ranges.first() {
            Some(DiscoveryPriceRange {
                min: Some(min),
                max: Some(max),
            }) => format!("${min} - ${max}"),
            _ => "Price TBD".to_string(),
        };

        let (venue_name, city, state, location) = match venue {
            Some(venue) => (
                venue.name,
                venue.city.and_then(|city| city.name),
                venue.state.and_then(|state| state.state_code),
                venue.location.as_ref().and_then(VenueLocation::lat_lng),
            ),
            None => (None, None, None, None),
        };

        Event {
            id: self.id,
            name: self.name,
            date: date.unwrap_or_else(|| "TBD".to_string()),
            time: time.unwrap_or_default(),
            venue: venue_name.unwrap_or_else(|| "Venue TBD".to_string()),
            city: city.unwrap_or_default(),
            state: state.unwrap_or_default(),
            image,
            url: self.url.unwrap_or_default(),
            price_range,
            location,
        }
    }
}

/// First wide 16:9 image, then any image.
fn pick_image(images: &[DiscoveryImage]) -> String {
    images
        .iter()
        .find(|image| {
            image.ratio.as_deref() == Some("16_9")
                && image.width.is_some_and(|width| width > MIN_WIDE_IMAGE_WIDTH)
        })
        .or_else(|| images.first())
        .map(|image| image.url.clone())
        .unwrap_or_default()
}
