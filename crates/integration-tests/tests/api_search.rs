mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;

use support::api_app::build_test_app;
use support::http::{error_code, request, send_json};

#[tokio::test]
async fn health_endpoints_report_ok_with_memory_store() {
    let app = build_test_app(&[]);

    let healthz = send_json(&app.router, request(Method::GET, "/healthz", None, None)).await;
    assert_eq!(healthz.status, StatusCode::OK);

    let readyz = send_json(&app.router, request(Method::GET, "/readyz", None, None)).await;
    assert_eq!(readyz.status, StatusCode::OK);
    assert_eq!(
        readyz.body,
        json!({
            "ok": true,
            "store": true,
            "llm": true,
            "events": true,
            "places": true,
            "hotels": true
        })
    );
}

#[tokio::test]
async fn hotel_search_prices_stays_and_reports_outages() {
    let app = build_test_app(&[]);

    let found = send_json(
        &app.router,
        request(
            Method::GET,
            "/v1/hotels?lat=33.94&lng=-118.40&checkIn=2099-06-01&checkOut=2099-06-03&adults=2",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.body["failed"], false);
    assert_eq!(found.body["hotels"][0]["priceLabel"], "$219/night");
    assert_eq!(found.body["hotels"][0]["checkIn"], "2099-06-01");
    assert_eq!(found.body["hotels"][1]["priceLabel"], "Price N/A");

    let outage = send_json(
        &app.router,
        request(Method::GET, "/v1/hotels?lat=0&lng=0", None, None),
    )
    .await;
    assert_eq!(outage.status, StatusCode::OK);
    assert_eq!(outage.body["failed"], true);
    assert_eq!(outage.body["hotels"], json!([]));

    let backwards = send_json(
        &app.router,
        request(
            Method::GET,
            "/v1/hotels?lat=33.94&lng=-118.40&checkIn=2099-06-03&checkOut=2099-06-01",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(backwards.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&backwards.body), Some("invalid_dates"));
}

#[tokio::test]
async fn event_search_reports_upstream_failure_without_erroring() {
    let app = build_test_app(&[]);

    let found = send_json(
        &app.router,
        request(Method::GET, "/v1/events?keyword=Taylor%20Swift", None, None),
    )
    .await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.body["failed"], false);
    assert_eq!(found.body["events"][0]["venue"], "SoFi Stadium");

    let outage = send_json(
        &app.router,
        request(Method::GET, "/v1/events?keyword=outage", None, None),
    )
    .await;
    assert_eq!(outage.status, StatusCode::OK);
    assert_eq!(outage.body["failed"], true);
    assert_eq!(outage.body["events"], json!([]));

    let blank = send_json(&app.router, request(Method::GET, "/v1/events", None, None)).await;
    assert_eq!(blank.status, StatusCode::OK);
    assert_eq!(blank.body["events"], json!([]));
    assert_eq!(blank.body["failed"], false);
}

#[tokio::test]
async fn place_search_applies_rating_and_price_filters() {
    let app = build_test_app(&[]);

    let hotels = send_json(
        &app.router,
        request(
            Method::GET,
            "/v1/places?lat=33.95&lng=-118.34&minRating=4",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(hotels.status, StatusCode::OK);
    let hotel_ids = hotels.body["places"]
        .as_array()
        .expect("places should be an array")
        .iter()
        .map(|place| place["id"].as_str().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(hotel_ids, vec!["h1"]);

    let cheap_hotels = send_json(
        &app.router,
        request(
            Method::GET,
            "/v1/places?lat=33.95&lng=-118.34&type=hotel&maxPrice=1",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(cheap_hotels.body["places"][0]["id"], "h2");
    assert_eq!(cheap_hotels.body["places"][0]["priceLabel"], "$");

    let food = send_json(
        &app.router,
        request(
            Method::GET,
            "/v1/places?lat=33.95&lng=-118.34&type=restaurant",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(food.body["places"][0]["category"], "restaurant");
}

#[tokio::test]
async fn place_search_rejects_bad_parameters() {
    let app = build_test_app(&[]);

    for (path, code) in [
        ("/v1/places?lng=-118.34", "invalid_coordinates"),
        ("/v1/places?lat=91&lng=0", "invalid_coordinates"),
        ("/v1/places?lat=1&lng=1&type=spaceport", "invalid_type"),
        ("/v1/places?lat=1&lng=1&radius=far", "invalid_radius"),
        ("/v1/places?lat=1&lng=1&minRating=high", "invalid_min_rating"),
        ("/v1/places?lat=1&lng=1&maxPrice=9", "invalid_max_price"),
    ] {
        let response = send_json(&app.router, request(Method::GET, path, None, None)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(error_code(&response.body), Some(code), "{path}");
    }
}

#[tokio::test]
async fn distances_are_returned_per_destination() {
    let app = build_test_app(&[]);

    let response = send_json(
        &app.router,
        request(
            Method::POST,
            "/v1/distances",
            None,
            Some(json!({
                "origin": {"lat": 33.9535, "lng": -118.3392},
                "destinations": [
                    {"id": "h1", "lat": 33.95, "lng": -118.34},
                    {"id": "r1", "lat": 33.96, "lng": -118.35}
                ]
            })),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["distances"][0]["id"], "h1");
    assert_eq!(response.body["distances"][1]["distance"], "2.0 mi");

    let destinations = (0..26)
        .map(|index| json!({"id": format!("p{index}"), "lat": 1.0, "lng": 1.0}))
        .collect::<Vec<_>>();
    let too_many = send_json(
        &app.router,
        request(
            Method::POST,
            "/v1/distances",
            None,
            Some(json!({"origin": {"lat": 1.0, "lng": 1.0}, "destinations": destinations})),
        ),
    )
    .await;
    assert_eq!(too_many.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&too_many.body), Some("too_many_destinations"));

    let bad_origin = send_json(
        &app.router,
        request(
            Method::POST,
            "/v1/distances",
            None,
            Some(json!({"origin": {"lat": 100.0, "lng": 1.0}, "destinations": []})),
        ),
    )
    .await;
    assert_eq!(error_code(&bad_origin.body), Some("invalid_coordinates"));
}
