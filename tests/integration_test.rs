use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use choice_awards::abuse::{AbuseConfig, RateLimiter};
use choice_awards::api::router;
use choice_awards::auth::AuthConfig;
use choice_awards::identity::IdentityConfig;
use choice_awards::state::AppState;
use choice_awards::store::MemoryStore;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// "admin:secret"
const ADMIN_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

fn app_with(abuse: AbuseConfig, auth: AuthConfig) -> Router {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        IdentityConfig::default(),
        abuse,
        auth,
    );
    router(state, "static")
}

fn app() -> Router {
    app_with(AbuseConfig::disabled(), AuthConfig::disabled())
}

/// Send a request as if relayed by a local proxy for `client`
async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    client: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", client)
        .header(header::AUTHORIZATION, ADMIN_AUTH);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let mut request = builder.body(body).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn create_category(app: &Router, name: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/categories",
        "10.0.0.1",
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn create_nominee(app: &Router, category_id: &str, name: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/nominees",
        "10.0.0.1",
        Some(json!({ "category_id": category_id, "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn vote(app: &Router, client: &str, category_id: &str, nominee_id: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/vote",
        client,
        Some(json!({ "category_id": category_id, "nominee_id": nominee_id })),
    )
    .await
}

async fn lock(app: &Router, category_id: &str) {
    let (status, body) = send(
        app,
        Method::PUT,
        &format!("/api/categories/{}", category_id),
        "10.0.0.1",
        Some(json!({ "voting_locked": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["voting_locked"], true);
}

/// End-to-end flow: set up a category, vote, change the vote, lock, read results
#[tokio::test]
async fn test_full_voting_flow() {
    let app = app();
    let category = create_category(&app, "Best Song").await;
    let a = create_nominee(&app, &category, "A").await;
    let b = create_nominee(&app, &category, "B").await;

    // No vote yet
    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/vote/{}", category),
        "203.0.113.1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "none" }));

    // First cast creates
    let (status, body) = vote(&app, "203.0.113.1", &category, &a).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["action"], "created");
    assert_eq!(body["nominee_id"], a.as_str());
    let vote_id = body["id"].clone();

    // Switching updates the same vote
    let (status, body) = vote(&app, "203.0.113.1", &category, &b).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "updated");
    assert_eq!(body["id"], vote_id);

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/vote/{}", category),
        "203.0.113.1",
        None,
    )
    .await;
    assert_eq!(body["status"], "voted");
    assert_eq!(body["vote"]["nominee_id"], b.as_str());

    // Another voter is tracked separately
    let (status, _) = vote(&app, "203.0.113.2", &category, &b).await;
    assert_eq!(status, StatusCode::CREATED);

    lock(&app, &category).await;

    let (status, body) = vote(&app, "203.0.113.3", &category, &a).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "CATEGORY_LOCKED");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/results/{}", category),
        "203.0.113.1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_votes"], 2);
    assert_eq!(body["winners"], json!([b]));
    assert_eq!(body["tie"], false);
    assert_eq!(body["results"][0]["nominee"]["name"], "B");
}

#[tokio::test]
async fn test_tie_reported_in_results() {
    let app = app();
    let category = create_category(&app, "Best Album").await;
    let a = create_nominee(&app, &category, "A").await;
    let b = create_nominee(&app, &category, "B").await;
    let c = create_nominee(&app, &category, "C").await;

    for (nominee, voters) in [(&a, 3), (&b, 3), (&c, 1)] {
        for i in 0..voters {
            let client = format!("198.51.100.{}", i + 1);
            let (status, _) = vote(&app, &client, &category, nominee).await;
            assert!(status.is_success());
        }
    }

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/results/{}", category),
        "10.0.0.1",
        None,
    )
    .await;

    // Re-casts replace earlier votes: client 1 ends on C, clients 2 and 3 on B
    assert_eq!(body["total_votes"], 3);
    assert_eq!(body["max_votes"], 2);
    assert_eq!(body["winners"], json!([b]));

    // Distinct voters per nominee produce a real tie
    let category = create_category(&app, "Best Video").await;
    let a = create_nominee(&app, &category, "A").await;
    let b = create_nominee(&app, &category, "B").await;
    let c = create_nominee(&app, &category, "C").await;
    let ballots = [
        ("192.0.2.1", &a),
        ("192.0.2.2", &a),
        ("192.0.2.3", &a),
        ("192.0.2.4", &b),
        ("192.0.2.5", &b),
        ("192.0.2.6", &b),
        ("192.0.2.7", &c),
    ];
    for (client, nominee) in ballots {
        vote(&app, client, &category, nominee).await;
    }

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/results/{}", category),
        "10.0.0.1",
        None,
    )
    .await;
    assert_eq!(body["max_votes"], 3);
    assert_eq!(body["tie"], true);
    assert_eq!(body["winners"], json!([a, b]));
    assert_eq!(body["results"][2]["is_winner"], false);
}

#[tokio::test]
async fn test_public_results_only_list_locked_categories() {
    let app = app();
    let open = create_category(&app, "Open").await;
    let locked = create_category(&app, "Locked").await;
    let n = create_nominee(&app, &open, "N").await;
    vote(&app, "192.0.2.10", &open, &n).await;
    lock(&app, &locked).await;

    let (status, body) = send(&app, Method::GET, "/api/results", "10.0.0.1", None).await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["category_id"], locked.as_str());
}

#[tokio::test]
async fn test_vote_errors() {
    let app = app();
    let x = create_category(&app, "X").await;
    let y = create_category(&app, "Y").await;
    let in_y = create_nominee(&app, &y, "In Y").await;

    let (status, body) = vote(&app, "192.0.2.1", &x, &in_y).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_NOMINEE_FOR_CATEGORY");

    let (status, body) = vote(&app, "192.0.2.1", "missing", &in_y).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CATEGORY_NOT_FOUND");

    let (status, body) = vote(&app, "192.0.2.1", &x, "missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOMINEE_NOT_FOUND");

    let (status, body) = send(&app, Method::GET, "/api/results/missing", "10.0.0.1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CATEGORY_NOT_FOUND");
}

#[tokio::test]
async fn test_deleting_category_cascades() {
    let app = app();
    let category = create_category(&app, "Doomed").await;
    let nominee = create_nominee(&app, &category, "N").await;
    vote(&app, "192.0.2.1", &category, &nominee).await;

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/api/categories/{}", category),
        "10.0.0.1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_nominees"], 1);
    assert_eq!(body["deleted_votes"], 1);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/nominees/{}", nominee),
        "10.0.0.1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_routes_require_credentials() {
    let auth = AuthConfig {
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
    };
    let app = app_with(AbuseConfig::disabled(), auth);

    // Valid credentials pass
    let category = create_category(&app, "Guarded").await;

    // Missing credentials are rejected
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/categories")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "name": "Sneaky" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    // Public reads stay open
    let request = Request::builder()
        .uri("/api/categories")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let list: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(list[0]["id"], category.as_str());
}

#[tokio::test]
async fn test_vote_rate_limit() {
    let abuse = AbuseConfig {
        vote_limiter: Some(RateLimiter::new(2, Duration::from_secs(60))),
        lookup_limiter: None,
    };
    let app = app_with(abuse, AuthConfig::disabled());
    let category = create_category(&app, "Busy").await;
    let nominee = create_nominee(&app, &category, "N").await;

    assert!(vote(&app, "192.0.2.1", &category, &nominee).await.0.is_success());
    assert!(vote(&app, "192.0.2.1", &category, &nominee).await.0.is_success());

    let (status, body) = vote(&app, "192.0.2.1", &category, &nominee).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");

    // Other voters are unaffected
    assert!(vote(&app, "192.0.2.2", &category, &nominee).await.0.is_success());
}

#[tokio::test]
async fn test_vote_without_client_address_is_rejected() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/vote")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "category_id": "c", "nominee_id": "n" }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_export_import_roundtrip_over_http() {
    let app = app();
    let category = create_category(&app, "Kept").await;
    let nominee = create_nominee(&app, &category, "N").await;
    vote(&app, "192.0.2.1", &category, &nominee).await;

    let (status, snapshot) = send(
        &app,
        Method::GET,
        "/api/admin/state/export",
        "10.0.0.1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["votes"].as_array().unwrap().len(), 1);

    let fresh = self::app();
    let (status, body) = send(
        &fresh,
        Method::POST,
        "/api/admin/state/import",
        "10.0.0.1",
        Some(snapshot),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "categories": 1, "nominees": 1, "votes": 1 }));

    // The imported vote still belongs to the same voter
    let (_, body) = send(
        &fresh,
        Method::GET,
        &format!("/api/vote/{}", category),
        "192.0.2.1",
        None,
    )
    .await;
    assert_eq!(body["status"], "voted");

    let (status, body) = send(
        &fresh,
        Method::POST,
        "/api/admin/state/import",
        "10.0.0.1",
        Some(json!({
            "schema_version": 99,
            "exported_at": "2026-01-01T00:00:00Z",
            "categories": [],
            "nominees": []
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_SNAPSHOT");
}

#[tokio::test]
async fn test_forged_forwarded_hops_count_as_one_voter() {
    // Default limits: 10 casts per minute
    let app = app_with(AbuseConfig::default(), AuthConfig::disabled());
    let category = create_category(&app, "Stuffed").await;
    let nominee = create_nominee(&app, &category, "N").await;

    let mut accepted = 0;
    let mut limited = 0;
    for i in 0..25 {
        // The client prepends a fake hop; the proxy appends the real address
        let chain = format!("1.1.0.{}, 203.0.113.9", i);
        let (status, body) = vote(&app, &chain, &category, &nominee).await;
        if status == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        } else {
            let expected = if i == 0 { "created" } else { "updated" };
            assert!(status.is_success(), "unexpected status {}", status);
            assert_eq!(body["action"], expected);
            accepted += 1;
        }
    }
    assert_eq!(accepted, 10);
    assert_eq!(limited, 15);

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/results/{}", category),
        "10.0.0.1",
        None,
    )
    .await;
    assert_eq!(body["total_votes"], 1);
}

#[tokio::test]
async fn test_malformed_vote_body_is_invalid_request() {
    let app = app();
    let category = create_category(&app, "Strict").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/vote",
        "192.0.2.1",
        Some(json!({ "category_id": category })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["msg"].as_str().unwrap().contains("nominee_id"));

    // Admin bodies share the same error shape
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/categories",
        "10.0.0.1",
        Some(json!({ "description": "no name" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_vote_lookup_rate_limit() {
    let abuse = AbuseConfig {
        vote_limiter: None,
        lookup_limiter: Some(RateLimiter::new(2, Duration::from_secs(60))),
    };
    let app = app_with(abuse, AuthConfig::disabled());
    let category = create_category(&app, "Watched").await;
    let uri = format!("/api/vote/{}", category);

    for _ in 0..2 {
        let (status, _) = send(&app, Method::GET, &uri, "192.0.2.1", None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&app, Method::GET, &uri, "192.0.2.1", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");

    // Results are not limited
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/results/{}", category),
        "192.0.2.1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_nominee_image_can_be_cleared() {
    let app = app();
    let category = create_category(&app, "Pictured").await;
    let (_, nominee) = send(
        &app,
        Method::POST,
        "/api/nominees",
        "10.0.0.1",
        Some(json!({
            "category_id": category,
            "name": "N",
            "image_url": "/uploads/n.png",
            "youtube_url": "https://youtu.be/n"
        })),
    )
    .await;
    let id = nominee["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/api/nominees/{}/image", id),
        "10.0.0.1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["image_url"], Value::Null);
    assert_eq!(body["youtube_url"], "https://youtu.be/n");

    // An explicit null clears a link through the regular update
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/nominees/{}", id),
        "10.0.0.1",
        Some(json!({ "youtube_url": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nominee"]["youtube_url"], Value::Null);
    assert_eq!(body["nominee"]["name"], "N");
}
