use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use kindred_api::auth::AppStateInner;
use kindred_db::Database;

struct TestApp {
    router: Router,
}

struct TestUser {
    id: String,
    token: String,
}

impl TestApp {
    fn new(require_connection: bool) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let state = Arc::new(AppStateInner {
            db,
            jwt_secret: "test-secret".into(),
            token_ttl_days: 1,
            require_connection,
        });
        Self {
            router: kindred_api::router(state),
        }
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn register(&self, username: &str) -> TestUser {
        let (status, body) = self
            .call(
                "POST",
                "/auth/register",
                None,
                Some(json!({ "username": username, "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        TestUser {
            id: body["userId"].as_str().unwrap().to_string(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }
}

#[tokio::test]
async fn register_and_login() {
    let app = TestApp::new(false);
    let ada = app.register("ada").await;

    let (status, body) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "ada", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], ada.id.as_str());
    assert_eq!(body["username"], "ada");

    let (status, body) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "ada", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app
        .call(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "ada", "password": "another one" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = TestApp::new(false);
    let (status, body) = app.call("GET", "/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app.call("GET", "/connections", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn request_lifecycle_over_http() {
    let app = TestApp::new(false);
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;

    let (status, body) = app
        .call("POST", &format!("/requests/send/interested/{}", bob.id), Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "interested");

    // reverse direction hits the same pair
    let (status, body) = app
        .call("POST", &format!("/requests/send/interested/{}", ada.id), Some(&bob.token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(body["existing"]["status"], "interested");

    let (_, pending) = app.call("GET", "/requests/received", Some(&bob.token), None).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (status, body) = app
        .call("POST", &format!("/requests/review/accepted/{}", ada.id), Some(&bob.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");

    for user in [&ada, &bob] {
        let (_, connections) = app.call("GET", "/connections", Some(&user.token), None).await;
        assert_eq!(connections.as_array().unwrap().len(), 1);
    }

    // accepted requests are final
    let (status, body) = app
        .call("DELETE", &format!("/requests/{}", bob.id), Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn bad_path_values_are_client_errors() {
    let app = TestApp::new(false);
    let ada = app.register("ada").await;

    let (status, body) = app
        .call("POST", "/requests/send/interested/not-a-user-id", Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_IDENTIFIER");

    let (status, _) = app
        .call("POST", &format!("/requests/send/accepted/{}", ada.id), Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call("POST", &format!("/requests/send/interested/{}", ada.id), Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SELF_REFERENCE");
}

#[tokio::test]
async fn chat_history_and_seen_state() {
    let app = TestApp::new(false);
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;

    let (status, opened) = app
        .call("GET", &format!("/chats/with/{}", bob.id), Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let chat_id = opened["chat"]["id"].as_str().unwrap().to_string();
    assert!(opened["messages"].as_array().unwrap().is_empty());

    // opening from the other side returns the same chat
    let (_, again) = app
        .call("GET", &format!("/chats/with/{}", ada.id), Some(&bob.token), None)
        .await;
    assert_eq!(again["chat"]["id"], chat_id.as_str());

    let (_, list) = app.call("GET", "/chats", Some(&bob.token), None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["peer"]["username"], "ada");
    assert_eq!(list[0]["lastMessage"], Value::Null);
    assert_eq!(list[0]["unreadCount"], 0);

    let (status, body) = app
        .call("POST", &format!("/chats/{}/seen", chat_id), Some(&bob.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 0);

    let (status, _) = app
        .call("GET", &format!("/chats/{}/messages", chat_id), Some(&bob.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn outsiders_cannot_read_a_chat() {
    let app = TestApp::new(false);
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;
    let eve = app.register("eve").await;

    let (_, opened) = app
        .call("GET", &format!("/chats/with/{}", bob.id), Some(&ada.token), None)
        .await;
    let chat_id = opened["chat"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call("GET", &format!("/chats/{}/messages", chat_id), Some(&eve.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app
        .call(
            "POST",
            &format!("/chats/{}/seen", chat_id),
            Some(&eve.token),
            Some(json!({ "messageIds": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn connection_policy_applies_to_opening_chats() {
    let app = TestApp::new(true);
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;

    let (status, _) = app
        .call("GET", &format!("/chats/with/{}", bob.id), Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.call("POST", &format!("/requests/send/interested/{}", bob.id), Some(&ada.token), None)
        .await;
    app.call("POST", &format!("/requests/review/accepted/{}", ada.id), Some(&bob.token), None)
        .await;

    let (status, _) = app
        .call("GET", &format!("/chats/with/{}", bob.id), Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}
