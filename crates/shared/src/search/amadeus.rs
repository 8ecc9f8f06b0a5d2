use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use super::{HotelOffers, HotelQuery, SearchError, SearchFuture};
use crate::config::SearchConfig;
use crate::models::{HotelOffer, LatLng, nightly_price_label};

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);
const MAX_HOTEL_IDS: usize = 10;
const MIN_RADIUS_KM: u32 = 20;
const MAX_AMENITIES: usize = 5;
const OFFER_CURRENCY: &str = "USD";

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Hotel list and offer pricing client with a cached client-credentials token.
pub struct AmadeusHotelsClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    token: Mutex<Option<CachedToken>>,
}

impl AmadeusHotelsClient {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| SearchError::ProviderFailure(format!("http_client: {err}")))?;

        let credentials = config
            .amadeus_api_key
            .clone()
            .zip(config.amadeus_api_secret.clone());

        Ok(Self {
            client,
            base_url: config.amadeus_base_url.trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, SearchError> {
        let (client_id, client_secret) = self
            .credentials
            .as_ref()
            .ok_or(SearchError::NotConfigured("AMADEUS_API_KEY"))?;

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(format!("{}/v1/security/oauth2/token", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(SearchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::ProviderFailure(format!(
                "token_status={}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|_| SearchError::InvalidPayload("token_json_parse_failed".to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(expires_in = token.expires_in, "amadeus access token refreshed");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, SearchError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(SearchError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.token.lock().await.take();
        }
        if !status.is_success() {
            return Err(SearchError::ProviderFailure(format!(
                "status={}",
                status.as_u16()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|_| SearchError::InvalidPayload("response_json_parse_failed".to_string()))
    }

    async fn hotels_near(&self, query: &HotelQuery) -> Result<Vec<ListedHotel>, SearchError> {
        let latitude = query.center.lat.to_string();
        let longitude = query.center.lng.to_string();
        let radius = radius_km(query.radius_m).to_string();
        let url = Url::parse_with_params(
            &format!("{}/v1/reference-data/locations/hotels/by-geocode", self.base_url),
            &[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("radius", radius.as_str()),
                ("radiusUnit", "KM"),
                ("hotelSource", "ALL"),
            ],
        )
        .map_err(|err| SearchError::InvalidPayload(format!("request_url: {err}")))?;

        let payload: HotelListResponse = self.get_json(url).await?;
        Ok(payload.data.into_iter().take(MAX_HOTEL_IDS).collect())
    }

    async fn fetch_offers(&self, query: &HotelQuery) -> Result<Vec<HotelOffer>, SearchError> {
        let listed = self.hotels_near(query).await?;
        if listed.is_empty() {
            return Ok(Vec::new());
        }

        let hotel_ids = listed
            .iter()
            .map(|hotel| hotel.hotel_id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let adults = query.adults.to_string();
        let check_in = query.check_in.to_string();
        let check_out = query.check_out.to_string();
        let url = Url::parse_with_params(
            &format!("{}/v3/shopping/hotel-offers", self.base_url),
            &[
                ("hotelIds", hotel_ids.as_str()),
                ("adults", adults.as_str()),
                ("checkInDate", check_in.as_str()),
                ("checkOutDate", check_out.as_str()),
                ("currency", OFFER_CURRENCY),
            ],
        )
        .map_err(|err| SearchError::InvalidPayload(format!("request_url: {err}")))?;

        match self.get_json::<HotelOffersResponse>(url).await {
            Ok(payload) => Ok(payload
                .data
                .into_iter()
                .map(|priced| priced.into_offer(query))
                .collect()),
            Err(err) => {
                warn!(hotels = listed.len(), "hotel offers unavailable, returning listings: {err}");
                Ok(listed
                    .into_iter()
                    .map(|hotel| hotel.into_unpriced(query))
                    .collect())
            }
        }
    }
}

impl HotelOffers for AmadeusHotelsClient {
    fn hotel_offers<'a>(&'a self, query: &'a HotelQuery) -> SearchFuture<'a, Vec<HotelOffer>> {
        Box::pin(self.fetch_offers(query))
    }
}

fn radius_km(radius_m: u32) -> u32 {
    radius_m.div_ceil(1_000).max(MIN_RADIUS_KM)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct HotelListResponse {
    #[serde(default)]
    data: Vec<ListedHotel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedHotel {
    hotel_id: String,
    name: String,
    #[serde(default)]
    geo_code: Option<GeoCode>,
    #[serde(default)]
    address: Option<ListedAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedAddress {
    #[serde(default)]
    country_code: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct GeoCode {
    latitude: f64,
    longitude: f64,
}

impl From<GeoCode> for LatLng {
    fn from(code: GeoCode) -> Self {
        LatLng::new(code.latitude, code.longitude)
    }
}

impl ListedHotel {
    fn into_unpriced(self, query: &HotelQuery) -> HotelOffer {
        HotelOffer {
            id: self.hotel_id,
            name: self.name,
            address: self
                .address
                .and_then(|address| address.country_code)
                .unwrap_or_default(),
            city: String::new(),
            location: self.geo_code.map(LatLng::from),
            price: None,
            price_label: "Price unavailable".to_string(),
            currency: OFFER_CURRENCY.to_string(),
            star_rating: None,
            amenities: Vec::new(),
            room_type: String::new(),
            check_in: query.check_in,
            check_out: query.check_out,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HotelOffersResponse {
    #[serde(default)]
    data: Vec<PricedHotel>,
}

#[derive(Debug, Deserialize)]
struct PricedHotel {
    hotel: OfferHotel,
    #[serde(default)]
    offers: Vec<Offer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferHotel {
    hotel_id: String,
    name: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    rating: Option<String>,
    #[serde(default)]
    amenities: Vec<String>,
    #[serde(default)]
    address: Option<OfferAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferAddress {
    #[serde(default)]
    lines: Vec<String>,
    #[serde(default)]
    city_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Offer {
    #[serde(default)]
    price: Option<OfferPrice>,
    #[serde(default)]
    room: Option<OfferRoom>,
}

#[derive(Debug, Deserialize)]
struct OfferPrice {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    total: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OfferRoom {
    #[serde(default)]
    description: Option<RoomDescription>,
}

#[derive(Debug, Deserialize)]
struct RoomDescription {
    #[serde(default)]
    text: Option<String>,
}

impl PricedHotel {
    fn into_offer(self, query: &HotelQuery) -> HotelOffer {
        let first = self.offers.into_iter().next();
        let price_info = first.as_ref().and_then(|offer| offer.price.as_ref());
        let price = price_info
            .and_then(|price| price.total.as_deref())
            .and_then(|total| total.parse::<f64>().ok());
        let currency = price_info
            .and_then(|price| price.currency.clone())
            .unwrap_or_else(|| OFFER_CURRENCY.to_string());
        let room_type = first
            .and_then(|offer| offer.room)
            .and_then(|room| room.description)
            .and_then(|description| description.text)
            .unwrap_or_default();

        let hotel = self.hotel;
        let (address, city) = hotel
            .address
            .map(|address| (address.lines.join(", "), address.city_name.unwrap_or_default()))
            .unwrap_or_default();

        HotelOffer {
            id: hotel.hotel_id,
            name: hotel.name,
            address,
            city,
            location: hotel.latitude.zip(hotel.longitude).map(|(lat, lng)| LatLng::new(lat, lng)),
            price,
            price_label: nightly_price_label(price),
            currency,
            star_rating: hotel.rating.and_then(|rating| rating.trim().parse().ok()),
            amenities: hotel.amenities.into_iter().take(MAX_AMENITIES).collect(),
            room_type,
            check_in: query.check_in,
            check_out: query.check_out,
        }
    }
}
