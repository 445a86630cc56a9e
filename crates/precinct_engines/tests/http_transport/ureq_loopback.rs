#![forbid(unsafe_code)]

use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use precinct_contracts::api::ApiEndpoint;
use precinct_contracts::auth::{LoginRequest, MeResponse};
use precinct_engines::{ApiRequest, ApiTransport, TransportConfig, UreqTransport};
use serde_json::{json, Value};

const SESSION_COOKIE: &str = "connect.sid=s%3Aloopback";

async fn login(Json(body): Json<Value>) -> (StatusCode, [(header::HeaderName, &'static str); 1], Json<Value>) {
    if body["password"] == "correct horse" {
        (
            StatusCode::OK,
            [(header::SET_COOKIE, "connect.sid=s%3Aloopback; Path=/; HttpOnly")],
            Json(json!({"user": user()})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(header::CACHE_CONTROL, "no-store")],
            Json(json!({"message": "Invalid credentials"})),
        )
    }
}

async fn me(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let authed = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains(SESSION_COOKIE))
        .unwrap_or(false);
    if authed {
        (StatusCode::OK, Json(user()))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Not authenticated"})),
        )
    }
}

fn user() -> Value {
    json!({
        "id": 12,
        "username": "jdoe",
        "isAdmin": false,
        "badgeNumber": "1021",
        "rank": "Sergeant",
        "discordId": "80351110224678912"
    })
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_ureq_loopback_01_session_cookie_is_captured_and_replayed() {
    let base = spawn_server().await;
    let transport = UreqTransport::new(&TransportConfig::for_base_url(base)).unwrap();

    let anonymous = transport
        .send(ApiRequest::endpoint(ApiEndpoint::AuthMe))
        .await
        .unwrap();
    assert_eq!(anonymous.status, 401);

    let login_req = ApiRequest::endpoint(ApiEndpoint::AuthLogin)
        .with_json(&LoginRequest {
            username: "jdoe".to_string(),
            password: "correct horse".to_string(),
        })
        .unwrap();
    let logged_in = transport.send(login_req).await.unwrap();
    assert_eq!(logged_in.status, 200);
    assert_eq!(transport.cookie_header().as_deref(), Some(SESSION_COOKIE));

    let me = transport
        .send(ApiRequest::endpoint(ApiEndpoint::AuthMe))
        .await
        .unwrap();
    assert!(me.is_success());
    let user = serde_json::from_str::<MeResponse>(&me.body)
        .unwrap()
        .into_user();
    assert_eq!(user.badge_number, "1021");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_ureq_loopback_02_non_2xx_is_a_response_not_a_transport_error() {
    let base = spawn_server().await;
    let transport = UreqTransport::new(&TransportConfig::for_base_url(base)).unwrap();
    let req = ApiRequest::endpoint(ApiEndpoint::AuthLogin)
        .with_json(&json!({"username": "jdoe", "password": "nope"}))
        .unwrap();
    let resp = transport.send(req).await.unwrap();
    assert_eq!(resp.status, 401);
    assert!(resp.body.contains("Invalid credentials"));
    assert_eq!(transport.cookie_header(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_ureq_loopback_03_refused_connection_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let transport =
        UreqTransport::new(&TransportConfig::for_base_url(format!("http://{addr}"))).unwrap();
    let err = transport
        .send(ApiRequest::endpoint(ApiEndpoint::AuthMe))
        .await
        .unwrap_err();
    assert_eq!(err.name, "connection");
    assert!(!err.detail.is_empty());
}
