//! REST API tests using TestAppBuilder.
//!
//! These tests drive the `/api/v1` routes through the production router with
//! mock repositories and outbound clients behind it.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::app_builder::{TestApp, TestAppBuilder};
use common::factories::{AddressFactory, LegislatorFactory};
use emailcongress_api::congress::DistrictCandidate;
use serde_json::{json, Value};
use tower::ServiceExt;

// ============================================================================
// Test Helpers
// ============================================================================

/// Send a request and parse the JSON response (`Value::Null` for empty bodies).
async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(uri)
        .method(method)
        .header("Content-Type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .expect("request");

    let response = router.clone().oneshot(request).await.expect("response");

    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Response should be valid JSON")
    };
    (status, json)
}

fn error_code(problem: &Value) -> &str {
    problem["extensions"]["code"].as_str().unwrap_or_default()
}

/// Register a VA-8 constituent and resolve their district through the API.
async fn resolved_sender(app: &TestApp) -> String {
    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/constituents",
        Some(json!({
            "email": format!("{}@example.com", uuid::Uuid::new_v4()),
            "address": AddressFactory::new().build(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    let id = body["constituent"]["id"].as_str().expect("id").to_string();

    app.congress.set_zip_result(Ok(vec![DistrictCandidate {
        state: "VA".to_string(),
        district: Some(8),
    }]));
    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/constituents/{id}/district"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "resolve failed: {body}");
    id
}

fn seat_virginia(app: &TestApp) {
    app.legislators.insert(
        LegislatorFactory::representative("VA", 8)
            .with_bioguide("B000008")
            .build(),
    );
    app.legislators.insert(
        LegislatorFactory::senator("VA")
            .with_bioguide("S000101")
            .build(),
    );
    app.legislators.insert(
        LegislatorFactory::senator("VA")
            .with_bioguide("S000102")
            .build(),
    );
    app.legislators.insert(
        LegislatorFactory::representative("VA", 11)
            .with_bioguide("C000011")
            .build(),
    );
}

// ============================================================================
// Constituents
// ============================================================================

#[tokio::test]
async fn test_register_returns_first_generation() {
    let app = TestAppBuilder::with_mocks().build();

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/constituents",
        Some(json!({
            "email": "Pat@Example.com",
            "address": AddressFactory::new().in_state("virginia").build(),
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["constituent"]["email"], "pat@example.com");
    assert_eq!(body["address"]["generation"], 1);
    assert_eq!(body["address"]["state"], "VA");
}

#[tokio::test]
async fn test_register_rejects_invalid_zip() {
    let app = TestAppBuilder::with_mocks().build();

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/constituents",
        Some(json!({
            "email": "pat@example.com",
            "address": AddressFactory::new().with_zip5("2220").build(),
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_ADDRESS");
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = TestAppBuilder::with_mocks().build();
    let request = json!({
        "email": "pat@example.com",
        "address": AddressFactory::new().build(),
    });

    let (first, _) = call(&app.router, "POST", "/api/v1/constituents", Some(request.clone())).await;
    let (second, body) = call(&app.router, "POST", "/api/v1/constituents", Some(request)).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "DUPLICATE_EMAIL");
}

#[tokio::test]
async fn test_change_address_appends_generation() {
    let app = TestAppBuilder::with_mocks().build();
    let id = resolved_sender(&app).await;

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/constituents/{id}/address"),
        Some(json!(AddressFactory::new().with_zip5("22209").build())),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["generation"], 2);
    assert_eq!(body["zip5"], "22209");
    assert!(body["district"].is_null());
}

#[tokio::test]
async fn test_resolve_district_records_result() {
    let app = TestAppBuilder::with_mocks().build();
    let id = resolved_sender(&app).await;

    let address = app
        .service
        .repo()
        .current_address(id.parse().expect("uuid"))
        .await
        .expect("address");

    let district = address.district.expect("district recorded");
    assert_eq!(district.state, "VA");
    assert_eq!(district.number, Some(8));
}

#[tokio::test]
async fn test_resolve_district_ambiguous_without_street_is_unprocessable() {
    let app = TestAppBuilder::with_mocks().build();
    let (_, body) = call(
        &app.router,
        "POST",
        "/api/v1/constituents",
        Some(json!({
            "email": "pat@example.com",
            "address": AddressFactory::new().without_street().build(),
        })),
    )
    .await;
    let id = body["constituent"]["id"].as_str().expect("id").to_string();
    app.congress.set_zip_result(Ok(vec![
        DistrictCandidate {
            state: "VA".to_string(),
            district: Some(8),
        },
        DistrictCandidate {
            state: "VA".to_string(),
            district: Some(11),
        },
    ]));

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/constituents/{id}/district"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "UNDETERMINED");
    assert!(app.geocoder.geocode_calls().is_empty());
}

#[tokio::test]
async fn test_resolve_district_unknown_constituent() {
    let app = TestAppBuilder::with_mocks().build();

    let (status, _) = call(
        &app.router,
        "POST",
        &format!("/api/v1/constituents/{}/district", uuid::Uuid::new_v4()),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Messages
// ============================================================================

#[tokio::test]
async fn test_catch_all_message_is_queued_for_every_member() {
    let mut app = TestAppBuilder::with_mocks().build();
    seat_virginia(&app);
    let sender = resolved_sender(&app).await;

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/messages",
        Some(json!({
            "sender_id": sender,
            "to": ["MyReps@emailcongress.us"],
            "subject": "Bridge funding",
            "body": "Please fund the bridge.",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["outcome"]["disposition"], "queued");
    assert_eq!(body["message"]["status"], "queued");
    assert_eq!(body["outcome"]["rate_limit"], "free");
    let contactable = body["outcome"]["buckets"]["contactable"]
        .as_array()
        .expect("contactable");
    assert_eq!(contactable.len(), 3);

    let message_id = body["message"]["id"].as_str().expect("id").to_string();
    assert_eq!(
        app.queued.try_recv().expect("enqueued").to_string(),
        message_id
    );

    let (status, body) = call(
        &app.router,
        "GET",
        &format!("/api/v1/messages/{message_id}/deliveries"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let deliveries = body["deliveries"].as_array().expect("deliveries");
    assert_eq!(deliveries.len(), 3);
    assert!(deliveries.iter().all(|d| d["status"] == "unsent"));
    assert_eq!(body["delivery_attempts"], 0);
}

#[tokio::test]
async fn test_message_to_other_district_is_undeliverable() {
    let mut app = TestAppBuilder::with_mocks().build();
    seat_virginia(&app);
    let sender = resolved_sender(&app).await;

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/messages",
        Some(json!({
            "sender_id": sender,
            "to": ["c000011@emailcongress.us", "nobody@emailcongress.us"],
            "subject": "Hello",
            "body": "Hi.",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"]["disposition"], "undeliverable");
    let buckets = &body["outcome"]["buckets"];
    assert_eq!(buckets["does_not_represent"].as_array().map(Vec::len), Some(1));
    assert_eq!(buckets["non_existent"][0], "nobody@emailcongress.us");
    assert!(app.queued.try_recv().is_err());
    assert_eq!(app.notifier.kinds(), vec!["undeliverable"]);
}

#[tokio::test]
async fn test_message_from_unknown_sender_is_not_found() {
    let app = TestAppBuilder::with_mocks().build();

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/messages",
        Some(json!({
            "sender_id": uuid::Uuid::new_v4(),
            "to": ["myreps@emailcongress.us"],
            "subject": "Hello",
            "body": "Hi.",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}

#[tokio::test]
async fn test_message_without_recipients_is_bad_request() {
    let app = TestAppBuilder::with_mocks().build();
    let sender = resolved_sender(&app).await;

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/messages",
        Some(json!({
            "sender_id": sender,
            "to": ["  "],
            "subject": "Hello",
            "body": "Hi.",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "NO_RECIPIENTS");
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = TestAppBuilder::with_mocks().build();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/messages")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from("{"))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resend_of_queued_message_conflicts() {
    let app = TestAppBuilder::with_mocks().build();
    seat_virginia(&app);
    let sender = resolved_sender(&app).await;
    let (_, body) = call(
        &app.router,
        "POST",
        "/api/v1/messages",
        Some(json!({
            "sender_id": sender,
            "to": ["myreps@emailcongress.us"],
            "subject": "Hello",
            "body": "Hi.",
        })),
    )
    .await;
    let message_id = body["message"]["id"].as_str().expect("id").to_string();

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/messages/{message_id}/resend"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "NOT_BLOCKED");
}

#[tokio::test]
async fn test_sixth_message_in_window_is_rate_limited() {
    let app = TestAppBuilder::with_mocks().build();
    seat_virginia(&app);
    let sender = resolved_sender(&app).await;
    let send = json!({
        "sender_id": sender,
        "to": ["myreps@emailcongress.us"],
        "subject": "Hello",
        "body": "Hi.",
    });

    for _ in 0..5 {
        let (_, body) = call(&app.router, "POST", "/api/v1/messages", Some(send.clone())).await;
        assert_eq!(body["outcome"]["disposition"], "queued");
    }
    let (status, body) = call(&app.router, "POST", "/api/v1/messages", Some(send)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"]["disposition"], "rate_limited");
    assert_eq!(body["message"]["status"], "blocked");

    let message_id = body["message"]["id"].as_str().expect("id").to_string();
    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/messages/{message_id}/resend"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "blocked");
}

#[tokio::test]
async fn test_deliveries_of_unknown_message() {
    let app = TestAppBuilder::with_mocks().build();

    let (status, body) = call(
        &app.router,
        "GET",
        &format!("/api/v1/messages/{}/deliveries", uuid::Uuid::new_v4()),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["title"], "Not Found");
}
