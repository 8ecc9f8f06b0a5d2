use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::{
    DistanceDestination, DistanceEntry, DistanceMatrix, PlaceQuery, PlaceSearch, SearchError,
    SearchFuture,
};
use crate::config::SearchConfig;
use crate::models::{LatLng, Place, RawPlace};

const PHOTO_MAX_WIDTH: &str = "400";
pub const MAX_DISTANCE_DESTINATIONS: usize = 25;

/// Places nearby-search and Distance Matrix client.
#[derive(Clone)]
pub struct GooglePlacesClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GooglePlacesClient {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| SearchError::ProviderFailure(format!("http_client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.google_maps_base_url.clone(),
            api_key: config.google_api_key.clone(),
        })
    }

    fn api_key(&self) -> Result<&str, SearchError> {
        self.api_key
            .as_deref()
            .ok_or(SearchError::NotConfigured("GOOGLE_API_KEY"))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, SearchError> {
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

        response
            .json::<T>()
            .await
            .map_err(|_| SearchError::InvalidPayload("response_json_parse_failed".to_string()))
    }

    async fn fetch_nearby(&self, query: &PlaceQuery) -> Result<Vec<Place>, SearchError> {
        let api_key = self.api_key()?;
        let location = query.center.query_value();
        let radius = query.radius_m.to_string();
        let mut params = vec![
            ("location", location.as_str()),
            ("radius", radius.as_str()),
            ("type", query.category.upstream_type()),
            ("key", api_key),
        ];
        if let Some(keyword) = query.keyword.as_deref().filter(|value| !value.is_empty()) {
            params.push(("keyword", keyword));
        }

        let url = Url::parse_with_params(
            &format!("{}/place/nearbysearch/json", self.base_url),
            &params,
        )
        .map_err(|err| SearchError::InvalidPayload(format!("request_url: {err}")))?;

        let payload: NearbySearchResponse = self.get_json(url).await?;
        if payload.status != "OK" && payload.status != "ZERO_RESULTS" {
            return Err(SearchError::ProviderFailure(format!(
                "places_status={} message={}",
                payload.status,
                payload.error_message.as_deref().unwrap_or("unknown")
            )));
        }

        payload
            .results
            .into_iter()
            .map(|result| result.into_place(&self.base_url, api_key))
            .collect()
    }

    async fn fetch_distances(
        &self,
        origin: LatLng,
        destinations: &[DistanceDestination],
    ) -> Result<Vec<DistanceEntry>, SearchError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }
        if destinations.len() > MAX_DISTANCE_DESTINATIONS {
            return Err(SearchError::InvalidPayload(format!(
                "at most {MAX_DISTANCE_DESTINATIONS} destinations are supported"
            )));
        }

        let api_key = self.api_key()?;
        let origins = origin.query_value();
        let destination_values = destinations
            .iter()
            .map(|destination| LatLng::new(destination.lat, destination.lng).query_value())
            .collect::<Vec<_>>()
            .join("|");

        let url = Url::parse_with_params(
            &format!("{}/distancematrix/json", self.base_url),
            &[
                ("origins", origins.as_str()),
                ("destinations", destination_values.as_str()),
                ("units", "imperial"),
                ("key", api_key),
            ],
        )
        .map_err(|err| SearchError::InvalidPayload(format!("request_url: {err}")))?;

        let payload: DistanceMatrixResponse = self.get_json(url).await?;
        if payload.status != "OK" {
            return Err(SearchError::ProviderFailure(format!(
                "distance_status={}",
                payload.status
            )));
        }

        let elements = payload
            .rows
            .into_iter()
            .next()
            .map(|row| row.elements)
            .unwrap_or_default();

        Ok(destinations
            .iter()
            .zip(elements)
            .map(|(destination, element)| DistanceEntry {
                id: destination.id.clone(),
                distance: element
                    .distance
                    .as_ref()
                    .map(|value| value.text.clone())
                    .unwrap_or_else(|| "N/A".to_string()),
                distance_meters: element.distance.as_ref().map_or(0, |value| value.value),
                duration: element
                    .duration
                    .as_ref()
                    .map(|value| value.text.clone())
                    .unwrap_or_else(|| "N/A".to_string()),
                duration_seconds: element.duration.as_ref().map_or(0, |value| value.value),
                status: element.status,
            })
            .collect())
    }
}

impl PlaceSearch for GooglePlacesClient {
    fn nearby_places<'a>(&'a self, query: &'a PlaceQuery) -> SearchFuture<'a, Vec<Place>> {
        Box::pin(self.fetch_nearby(query))
    }
}

impl DistanceMatrix for GooglePlacesClient {
    fn distances<'a>(
        &'a self,
        origin: LatLng,
        destinations: &'a [DistanceDestination],
    ) -> SearchFuture<'a, Vec<DistanceEntry>> {
        Box::pin(self.fetch_distances(origin, destinations))
    }
}

#[derive(Debug, Deserialize)]
struct NearbySearchResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<NearbyResult>,
}

#[derive(Debug, Deserialize)]
struct NearbyResult {
    place_id: String,
    name: String,
    #[serde(default)]
    vicinity: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    user_ratings_total: Option<u32>,
    #[serde(default)]
    price_level: Option<u8>,
    #[serde(default)]
    types: Vec<String>,
    geometry: Option<Geometry>,
    #[serde(default)]
    photos: Vec<Photo>,
    #[serde(default)]
    opening_hours: Option<OpeningHours>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct Photo {
    photo_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpeningHours {
    open_now: Option<bool>,
}

impl NearbyResult {
    fn into_place(self, base_url: &str, api_key: &str) -> Result<Place, SearchError> {
        let location = self
            .geometry
            .map(|geometry| geometry.location)
            .ok_or_else(|| SearchError::InvalidPayload(format!("place {} has no geometry", self.place_id)))?;
        let photo = self
            .photos
            .first()
            .and_then(|photo| photo.photo_reference.as_deref())
            .and_then(|reference| {
                Url::parse_with_params(
                    &format!("{base_url}/place/photo"),
                    &[
                        ("maxwidth", PHOTO_MAX_WIDTH),
                        ("photo_reference", reference),
                        ("key", api_key),
                    ],
                )
                .ok()
            })
            .map(String::from);

        Ok(Place::from(RawPlace {
            id: self.place_id,
            name: self.name,
            address: self.vicinity.unwrap_or_default(),
            rating: self.rating.unwrap_or(0.0),
            user_ratings_total: self.user_ratings_total.unwrap_or(0),
            price_level: self.price_level,
            price_label: None,
            types: self.types,
            location,
            photo,
            open_now: self.opening_hours.and_then(|hours| hours.open_now),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<DistanceRow>,
}

#[derive(Debug, Deserialize)]
struct DistanceRow {
    #[serde(default)]
    elements: Vec<DistanceElement>,
}

#[derive(Debug, Deserialize)]
struct DistanceElement {
    status: String,
    distance: Option<TextValue>,
    duration: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
    value: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::NearbyResult;
    use crate::models::PlaceCategory;

    #[test]
    fn maps_nearby_result_to_place() {
        let raw: NearbyResult = serde_json::from_value(json!({
            "place_id": "ChIJ1",
            "name": "Harbor Inn",
            "vicinity": "1 Harbor Way",
            "rating": 4.4,
            "user_ratings_total": 812,
            "price_level": 3,
            "types": ["lodging", "restaurant", "point_of_interest"],
            "geometry": { "location": { "lat": 33.95, "lng": -118.34 } },
            "photos": [{ "photo_reference": "ref-1" }],
            "opening_hours": { "open_now": true }
        }))
        .expect("result should deserialize");

        let place = raw
            .into_place("https://maps.example/api", "key-1")
            .expect("place should map");
        assert_eq!(place.id, "ChIJ1");
        assert_eq!(place.address, "1 Harbor Way");
        assert_eq!(place.price_label, "$$$");
        assert_eq!(place.category, PlaceCategory::Hotel);
        assert_eq!(place.open_now, Some(true));
        assert_eq!(
            place.photo.as_deref(),
            Some("https://maps.example/api/place/photo?maxwidth=400&photo_reference=ref-1&key=key-1")
        );
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let raw: NearbyResult = serde_json::from_value(json!({
            "place_id": "ChIJ2",
            "name": "Pier Park",
            "geometry": { "location": { "lat": 1.0, "lng": 2.0 } }
        }))
        .expect("result should deserialize");

        let place = raw.into_place("https://maps.example/api", "key-1").expect("place should map");
        assert_eq!(place.rating, 0.0);
        assert_eq!(place.user_ratings_total, 0);
        assert_eq!(place.price_label, "Price N/A");
        assert_eq!(place.photo, None);
        assert_eq!(place.category, PlaceCategory::Activity);
    }
}
