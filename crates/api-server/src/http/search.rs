use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use shared::models::{
    DistancesRequest, DistancesResponse, EventsResponse, HotelsResponse, LatLng, PlacesResponse,
    SearchCategory,
};
use shared::search::google::MAX_DISTANCE_DESTINATIONS;
use shared::search::{HotelQuery, PlaceFilter, PlaceQuery, SearchFilters};
use tracing::warn;

use super::AppState;
use super::errors::{bad_gateway_response, bad_request_response};

const MAX_PRICE_LEVEL: u8 = 4;
const MAX_ADULTS: u8 = 9;

#[derive(Debug, Deserialize)]
pub(super) struct EventsQuery {
    #[serde(default)]
    keyword: Option<String>,
}

/// Raw query values; parsed by hand so bad input gets a JSON error body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PlacesQuery {
    lat: Option<String>,
    lng: Option<String>,
    #[serde(rename = "type")]
    place_type: Option<String>,
    radius: Option<String>,
    min_rating: Option<String>,
    max_price: Option<String>,
    keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct HotelsQuery {
    lat: Option<String>,
    lng: Option<String>,
    radius: Option<String>,
    check_in: Option<String>,
    check_out: Option<String>,
    adults: Option<String>,
}

pub(super) async fn search_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let keyword = query.keyword.unwrap_or_default();
    let outcome = state.planner.search.search_events(&keyword).await;

    (
        StatusCode::OK,
        Json(EventsResponse {
            failed: outcome.is_failed(),
            events: outcome.items,
        }),
    )
        .into_response()
}

pub(super) async fn search_places(
    State(state): State<AppState>,
    Query(query): Query<PlacesQuery>,
) -> Response {
    let (place_query, filter) = match parse_places_query(query) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    let outcome = state
        .planner
        .search
        .search_places(&place_query, &filter)
        .await;

    (
        StatusCode::OK,
        Json(PlacesResponse {
            failed: outcome.is_failed(),
            places: outcome.items,
        }),
    )
        .into_response()
}

pub(super) async fn search_hotels(
    State(state): State<AppState>,
    Query(query): Query<HotelsQuery>,
) -> Response {
    let hotel_query = match parse_hotels_query(query, Utc::now().date_naive()) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    let outcome = state.planner.search.search_hotel_offers(&hotel_query).await;

    (
        StatusCode::OK,
        Json(HotelsResponse {
            failed: outcome.is_failed(),
            hotels: outcome.items,
        }),
    )
        .into_response()
}

pub(super) async fn distances(
    State(state): State<AppState>,
    Json(request): Json<DistancesRequest>,
) -> Response {
    if !coordinates_valid(request.origin)
        || request
            .destinations
            .iter()
            .any(|destination| !coordinates_valid(LatLng::new(destination.lat, destination.lng)))
    {
        return bad_request_response("invalid_coordinates", "Coordinates are out of range");
    }
    if request.destinations.len() > MAX_DISTANCE_DESTINATIONS {
        return bad_request_response(
            "too_many_destinations",
            "At most 25 destinations are supported",
        );
    }

    match state
        .distances
        .distances(request.origin, &request.destinations)
        .await
    {
        Ok(distances) => (StatusCode::OK, Json(DistancesResponse { distances })).into_response(),
        Err(err) => {
            warn!(
                destinations = request.destinations.len(),
                "distance lookup failed: {err}"
            );
            bad_gateway_response("distance_unavailable", "Distance lookup failed")
        }
    }
}

fn parse_places_query(query: PlacesQuery) -> Result<(PlaceQuery, PlaceFilter), Response> {
    let center = parse_center(query.lat.as_deref(), query.lng.as_deref())?;

    let category = match query.place_type.as_deref() {
        None => SearchCategory::Hotel,
        Some(raw) => SearchCategory::from_type_name(raw).ok_or_else(|| {
            bad_request_response("invalid_type", "type must be hotel, restaurant or explore")
        })?,
    };

    let mut filters = SearchFilters {
        keyword: query.keyword,
        ..SearchFilters::default()
    };
    if let Some(raw) = query.radius.as_deref() {
        filters.radius_m = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| bad_request_response("invalid_radius", "radius must be whole meters"))?;
    }
    if let Some(raw) = query.min_rating.as_deref() {
        filters.min_rating = parse_f64(raw)
            .ok_or_else(|| bad_request_response("invalid_min_rating", "minRating must be a number"))?;
    }
    let filters = filters.normalized();

    let max_price_level = match query.max_price.as_deref() {
        None => None,
        Some(raw) => Some(
            raw.trim()
                .parse::<u8>()
                .ok()
                .filter(|level| *level <= MAX_PRICE_LEVEL)
                .ok_or_else(|| {
                    bad_request_response("invalid_max_price", "maxPrice must be between 0 and 4")
                })?,
        ),
    };

    Ok((
        PlaceQuery {
            center,
            category,
            radius_m: filters.radius_m,
            keyword: filters.keyword.clone(),
        },
        PlaceFilter {
            min_rating: filters.min_rating,
            max_price_level,
        },
    ))
}

fn parse_hotels_query(query: HotelsQuery, today: NaiveDate) -> Result<HotelQuery, Response> {
    let center = parse_center(query.lat.as_deref(), query.lng.as_deref())?;
    let mut hotel_query = HotelQuery::for_next_week(center, today);

    if let Some(raw) = query.radius.as_deref() {
        hotel_query.radius_m = raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|radius| *radius > 0)
            .ok_or_else(|| bad_request_response("invalid_radius", "radius must be whole meters"))?;
    }

    match (query.check_in.as_deref(), query.check_out.as_deref()) {
        (None, None) => {}
        (Some(check_in), Some(check_out)) => {
            let check_in = parse_date(check_in);
            let check_out = parse_date(check_out);
            match (check_in, check_out) {
                (Some(check_in), Some(check_out)) if check_in >= today && check_out > check_in => {
                    hotel_query.check_in = check_in;
                    hotel_query.check_out = check_out;
                }
                _ => {
                    return Err(bad_request_response(
                        "invalid_dates",
                        "checkIn must not be in the past and checkOut must follow it",
                    ));
                }
            }
        }
        _ => {
            return Err(bad_request_response(
                "invalid_dates",
                "checkIn and checkOut must be given together",
            ));
        }
    }

    if let Some(raw) = query.adults.as_deref() {
        hotel_query.adults = raw
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|adults| (1..=MAX_ADULTS).contains(adults))
            .ok_or_else(|| bad_request_response("invalid_adults", "adults must be between 1 and 9"))?;
    }

    Ok(hotel_query)
}

fn parse_center(lat: Option<&str>, lng: Option<&str>) -> Result<LatLng, Response> {
    match (lat.and_then(parse_f64), lng.and_then(parse_f64)) {
        (Some(lat), Some(lng)) if coordinates_valid(LatLng::new(lat, lng)) => Ok(LatLng::new(lat, lng)),
        _ => Err(bad_request_response(
            "invalid_coordinates",
            "lat and lng are required and must be valid coordinates",
        )),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn coordinates_valid(location: LatLng) -> bool {
    location.lat.is_finite()
        && location.lng.is_finite()
        && (-90.0..=90.0).contains(&location.lat)
        && (-180.0..=180.0).contains(&location.lng)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use shared::models::SearchCategory;

    use super::{HotelsQuery, PlacesQuery, parse_hotels_query, parse_places_query};

    fn query(lat: &str, lng: &str) -> PlacesQuery {
        PlacesQuery {
            lat: Some(lat.to_string()),
            lng: Some(lng.to_string()),
            place_type: None,
            radius: None,
            min_rating: None,
            max_price: None,
            keyword: None,
        }
    }

    #[test]
    fn places_query_defaults_to_hotels_with_default_radius() {
        let (place_query, filter) =
            parse_places_query(query("33.95", "-118.34")).expect("query should parse");
        assert_eq!(place_query.category, SearchCategory::Hotel);
        assert_eq!(place_query.radius_m, 1_500);
        assert_eq!(filter.max_price_level, None);
    }

    #[test]
    fn places_query_rejects_bad_coordinates_and_prices() {
        assert!(parse_places_query(query("95", "0")).is_err());
        assert!(parse_places_query(query("north", "0")).is_err());

        let mut pricey = query("1", "1");
        pricey.max_price = Some("7".to_string());
        assert!(parse_places_query(pricey).is_err());

        let mut unknown = query("1", "1");
        unknown.place_type = Some("spaceport".to_string());
        assert!(parse_places_query(unknown).is_err());
    }

    #[test]
    fn places_query_maps_restaurant_filters() {
        let mut raw = query("1", "1");
        raw.place_type = Some("restaurant".to_string());
        raw.min_rating = Some("4.5".to_string());
        raw.max_price = Some("2".to_string());
        raw.radius = Some("800".to_string());

        let (place_query, filter) = parse_places_query(raw).expect("query should parse");
        assert_eq!(place_query.category, SearchCategory::Food);
        assert_eq!(place_query.radius_m, 800);
        assert_eq!(filter.min_rating, 4.5);
        assert_eq!(filter.max_price_level, Some(2));
    }

    fn hotels(check_in: Option<&str>, check_out: Option<&str>) -> HotelsQuery {
        HotelsQuery {
            lat: Some("36.11".to_string()),
            lng: Some("-115.17".to_string()),
            radius: None,
            check_in: check_in.map(str::to_string),
            check_out: check_out.map(str::to_string),
            adults: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 30).expect("valid date")
    }

    #[test]
    fn hotels_query_defaults_to_one_night_next_week() {
        let parsed = parse_hotels_query(hotels(None, None), today()).expect("query should parse");
        assert_eq!(parsed.radius_m, 5_000);
        assert_eq!(parsed.adults, 1);
        assert_eq!(parsed.check_in, NaiveDate::from_ymd_opt(2026, 4, 6).expect("valid date"));
        assert_eq!(parsed.check_out, NaiveDate::from_ymd_opt(2026, 4, 7).expect("valid date"));
    }

    #[test]
    fn hotels_query_rejects_bad_stays() {
        assert!(parse_hotels_query(hotels(Some("2026-04-10"), None), today()).is_err());
        assert!(parse_hotels_query(hotels(Some("2026-04-10"), Some("2026-04-10")), today()).is_err());
        assert!(parse_hotels_query(hotels(Some("2026-03-01"), Some("2026-03-02")), today()).is_err());
        assert!(parse_hotels_query(hotels(Some("soon"), Some("2026-04-12")), today()).is_err());

        let mut crowd = hotels(None, None);
        crowd.adults = Some("12".to_string());
        assert!(parse_hotels_query(crowd, today()).is_err());

        let stay = parse_hotels_query(hotels(Some("2026-04-10"), Some("2026-04-12")), today())
            .expect("query should parse");
        assert_eq!(stay.check_out, NaiveDate::from_ymd_opt(2026, 4, 12).expect("valid date"));
    }
}
