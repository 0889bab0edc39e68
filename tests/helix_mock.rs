// tests/helix_mock.rs
//
// HelixTelemetry + ClientCredentials against an in-process mock of the Twitch
// token endpoint and the Helix `streams`/`users` routes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use raid_scout::config::TwitchCredentials;
use raid_scout::telemetry::{ClientCredentials, HelixTelemetry, StaticToken, TelemetrySource};
use raid_scout::ScoutError;

#[derive(Default)]
struct Mock {
    token_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

fn params(raw: Option<String>, key: &str) -> Vec<String> {
    raw.unwrap_or_default()
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .filter(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .collect()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer good-token")
        && headers.get("client-id").and_then(|v| v.to_str().ok()) == Some("cid")
}

async fn token(State(m): State<Arc<Mock>>, body: String) -> impl IntoResponse {
    m.token_calls.fetch_add(1, Ordering::SeqCst);
    if body.contains("client_secret=wrong") {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "invalid client secret"})));
    }
    (
        StatusCode::OK,
        Json(json!({"access_token": "good-token", "expires_in": 3600, "token_type": "bearer"})),
    )
}

async fn streams(
    State(m): State<Arc<Mock>>,
    headers: HeaderMap,
    RawQuery(q): RawQuery,
) -> impl IntoResponse {
    m.stream_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad token"})));
    }
    let live: HashMap<&str, serde_json::Value> = HashMap::from([
        (
            "alice",
            json!({"user_login": "alice", "user_name": "Alice", "game_name": "Chess",
                   "title": "rated\nblitz", "viewer_count": 42, "started_at": "2025-06-01T16:00:00Z"}),
        ),
        (
            "bob",
            json!({"user_login": "bob", "user_name": "Bob", "game_name": "Art",
                   "title": "drawing", "viewer_count": 7, "started_at": "not-a-date"}),
        ),
    ]);
    if params(q.clone(), "first") != ["100"] {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "expected first=100"})));
    }
    let data: Vec<_> = params(q, "user_login")
        .iter()
        .filter_map(|l| live.get(l.as_str()).cloned())
        .collect();
    (StatusCode::OK, Json(json!({ "data": data, "pagination": {} })))
}

async fn users(headers: HeaderMap, RawQuery(q): RawQuery) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    if !params(q.clone(), "first").is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "unknown parameter first"})));
    }
    let data: Vec<_> = params(q, "login")
        .into_iter()
        .map(|l| json!({"login": l, "display_name": l, "profile_image_url": format!("https://img/{l}.png")}))
        .collect();
    (StatusCode::OK, Json(json!({ "data": data })))
}

async fn spawn_mock() -> (String, Arc<Mock>) {
    let mock = Arc::new(Mock::default());
    let app = Router::new()
        .route("/oauth2/token", post(token))
        .route("/helix/streams", get(streams))
        .route("/helix/users", get(users))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), mock)
}

fn creds(secret: &str) -> TwitchCredentials {
    TwitchCredentials {
        client_id: "cid".into(),
        client_secret: secret.into(),
    }
}

#[tokio::test]
async fn fetches_live_channels_with_avatars_and_caches_token() {
    let (base, mock) = spawn_mock().await;
    let provider = Arc::new(
        ClientCredentials::with_token_url(&creds("s3cret"), format!("{base}/oauth2/token"))
            .unwrap(),
    );
    let helix = HelixTelemetry::new("cid", provider)
        .unwrap()
        .with_base_url(format!("{base}/helix"));

    let wanted = vec!["Alice".to_string(), "bob".to_string(), "carol".to_string()];
    let live = helix.fetch_live(&wanted).await.unwrap();

    // carol is offline (absent); bob's record has no usable start time.
    assert_eq!(live.len(), 1);
    let a = &live[0];
    assert_eq!(a.login, "alice");
    assert_eq!(a.display_name, "Alice");
    assert_eq!(a.title, "rated blitz");
    assert_eq!(a.viewer_count, 42);
    assert_eq!(a.started_at.to_rfc3339(), "2025-06-01T16:00:00+00:00");
    assert_eq!(a.avatar_url.as_deref(), Some("https://img/alice.png"));

    helix.fetch_live(&wanted).await.unwrap();
    assert_eq!(mock.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.stream_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalid_credentials_surface_as_auth_error() {
    let (base, mock) = spawn_mock().await;
    let provider = Arc::new(
        ClientCredentials::with_token_url(&creds("wrong"), format!("{base}/oauth2/token"))
            .unwrap(),
    );
    let helix = HelixTelemetry::new("cid", provider)
        .unwrap()
        .with_base_url(format!("{base}/helix"));

    let err = helix.fetch_live(&["alice".to_string()]).await.unwrap_err();
    assert!(matches!(err, ScoutError::Auth(_)));
    assert_eq!(mock.stream_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_token_is_an_auth_error() {
    let (base, _mock) = spawn_mock().await;
    let helix = HelixTelemetry::new("cid", Arc::new(StaticToken("expired".into())))
        .unwrap()
        .with_base_url(format!("{base}/helix"));
    let err = helix.fetch_live(&["alice".to_string()]).await.unwrap_err();
    assert!(matches!(err, ScoutError::Auth(_)));
}

#[tokio::test]
async fn unreachable_helix_is_a_telemetry_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let helix = HelixTelemetry::new("cid", Arc::new(StaticToken("good-token".into())))
        .unwrap()
        .with_base_url(format!("http://{addr}/helix"));
    let err = helix.fetch_live(&["alice".to_string()]).await.unwrap_err();
    assert!(matches!(err, ScoutError::Telemetry(_)));
}
