//! Integration tests for the HTTP gateway.
//!
//! Tests cover:
//! - Authentication on every route except health
//! - Sending to an offline peer, then reading history
//! - Empty content rejection leaving no record
//! - Malformed request bodies answered in the JSON error format
//! - Unknown peers
//! - Deleting own messages (403 / 404 / 200)
//! - Peer listing, own profile, avatar updates with upload fallback

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;

use chatline::identity::provision_user;
use chatline::server::config::Config;
use chatline::server::{app, build_state};
use chatline::storage::{Db, Storage};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_config(asset_dir: Option<PathBuf>) -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        data_dir: PathBuf::from("."),
        store_timeout: Duration::from_secs(5),
        asset_dir,
        asset_base_url: "/assets".to_string(),
        log_filter: "warn".to_string(),
    }
}

async fn start_server(config: Config) -> (String, Db, oneshot::Sender<()>) {
    let db = Db::new(Storage::open_in_memory().expect("open db"));
    let router = app(build_state(db.clone(), &config));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });
    (format!("http://{addr}"), db, shutdown_tx)
}

fn add_user(db: &Db, name: &str) -> (String, String) {
    let (id, token) = provision_user(db, name, None, None, None).expect("provision user");
    (id.0, token)
}

fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::Null)
}

fn request_blocking(method: &str, url: &str, token: Option<&str>, body: Option<Value>) -> (u16, Value) {
    let mut req = ureq::request(method, url);
    if let Some(token) = token {
        req = req.set("Authorization", &format!("Bearer {token}"));
    }
    let result = match body {
        Some(body) => req
            .set("Content-Type", "application/json")
            .send_string(&body.to_string()),
        None => req.call(),
    };
    match result {
        Ok(r) => {
            let status = r.status();
            (status, parse_body(r.into_string().unwrap_or_default()))
        }
        Err(ureq::Error::Status(code, r)) => (code, parse_body(r.into_string().unwrap_or_default())),
        Err(e) => panic!("request failed: {e}"),
    }
}

async fn request(method: &'static str, url: String, token: Option<&str>, body: Option<Value>) -> (u16, Value) {
    let token = token.map(str::to_string);
    tokio::task::spawn_blocking(move || request_blocking(method, &url, token.as_deref(), body))
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_needs_no_credentials() {
    let (base, _db, _shutdown) = start_server(make_config(None)).await;

    let (status, body) = request("GET", format!("{base}/api/health"), None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["online_users"], 0);
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn missing_or_bad_tokens_are_unauthorized() {
    let (base, db, _shutdown) = start_server(make_config(None)).await;
    let (bob, _) = add_user(&db, "Bob");

    let (status, body) = request("GET", format!("{base}/api/me"), None, None).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = request("GET", format!("{base}/api/me"), Some("not-a-token"), None).await;
    assert_eq!(status, 401);

    let (status, _) = request(
        "POST",
        format!("{base}/api/conversations/{bob}/messages"),
        None,
        Some(json!({ "text": "hi" })),
    )
    .await;
    assert_eq!(status, 401);

    let (status, _) = request("GET", format!("{base}/api/conversations/peers"), None, None).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn cookie_and_query_tokens_are_accepted() {
    let (base, db, _shutdown) = start_server(make_config(None)).await;
    let (alice, token) = add_user(&db, "Alice");

    let url = format!("{base}/api/me");
    let body = tokio::task::spawn_blocking({
        let token = token.clone();
        move || {
            ureq::get(&url)
                .set("Cookie", &format!("theme=dark; jwt={token}"))
                .call()
                .expect("cookie auth")
                .into_string()
                .unwrap()
        }
    })
    .await
    .unwrap();
    assert_eq!(parse_body(body)["id"], alice);

    let (status, body) = request("GET", format!("{base}/api/me?token={token}"), None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["name"], "Alice");
}

#[tokio::test]
async fn message_to_offline_peer_is_in_history() {
    let (base, db, _shutdown) = start_server(make_config(None)).await;
    let (alice, alice_token) = add_user(&db, "Alice");
    let (bob, bob_token) = add_user(&db, "Bob");

    let (status, body) = request(
        "POST",
        format!("{base}/api/conversations/{bob}/messages"),
        Some(&alice_token),
        Some(json!({ "text": "hi" })),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(body["delivered"], false);
    let sent = &body["message"];
    assert_eq!(sent["senderId"], alice);
    assert_eq!(sent["receiverId"], bob);
    assert_eq!(sent["text"], "hi");
    assert!(sent.get("imageRef").is_none());

    let (status, history) = request(
        "GET",
        format!("{base}/api/conversations/{alice}/messages"),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, 200);
    let history = history.as_array().expect("history array");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], sent["id"]);
    assert_eq!(history[0]["createdAt"], sent["createdAt"]);
}

#[tokio::test]
async fn history_is_ordered_across_both_directions() {
    let (base, db, _shutdown) = start_server(make_config(None)).await;
    let (alice, alice_token) = add_user(&db, "Alice");
    let (bob, bob_token) = add_user(&db, "Bob");

    for (from, to, text) in [
        (&alice_token, &bob, "one"),
        (&bob_token, &alice, "two"),
        (&alice_token, &bob, "three"),
    ] {
        let (status, _) = request(
            "POST",
            format!("{base}/api/conversations/{to}/messages"),
            Some(from),
            Some(json!({ "text": text })),
        )
        .await;
        assert_eq!(status, 201);
    }

    let (_, history) = request(
        "GET",
        format!("{base}/api/conversations/{bob}/messages"),
        Some(&alice_token),
        None,
    )
    .await;
    let texts: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["one", "two", "three"]);
}

#[tokio::test]
async fn empty_content_is_rejected_without_a_record() {
    let (base, db, _shutdown) = start_server(make_config(None)).await;
    let (_, alice_token) = add_user(&db, "Alice");
    let (bob, _) = add_user(&db, "Bob");
    let url = format!("{base}/api/conversations/{bob}/messages");

    for body in [json!({}), json!({ "text": "" }), json!({ "text": "   ", "imageRef": "" })] {
        let (status, resp) = request("POST", url.clone(), Some(&alice_token), Some(body)).await;
        assert_eq!(status, 400);
        assert_eq!(resp["error"], "invalid_content");
    }

    let (status, history) = request("GET", url, Some(&alice_token), None).await;
    assert_eq!(status, 200);
    assert_eq!(history, json!([]));
}

fn post_raw_blocking(url: &str, token: &str, content_type: &str, body: &str) -> (u16, Value) {
    let result = ureq::post(url)
        .set("Authorization", &format!("Bearer {token}"))
        .set("Content-Type", content_type)
        .send_string(body);
    match result {
        Ok(r) => {
            let status = r.status();
            (status, parse_body(r.into_string().unwrap_or_default()))
        }
        Err(ureq::Error::Status(code, r)) => (code, parse_body(r.into_string().unwrap_or_default())),
        Err(e) => panic!("request failed: {e}"),
    }
}

#[tokio::test]
async fn malformed_bodies_are_invalid_content() {
    let (base, db, _shutdown) = start_server(make_config(None)).await;
    let (_, alice_token) = add_user(&db, "Alice");
    let (bob, _) = add_user(&db, "Bob");
    let url = format!("{base}/api/conversations/{bob}/messages");

    for (content_type, body) in [
        ("application/json", r#"{"text": 5}"#),
        ("application/json", "{not json"),
        ("text/plain", r#"{"text": "hi"}"#),
    ] {
        let (status, resp) = tokio::task::spawn_blocking({
            let url = url.clone();
            let token = alice_token.clone();
            move || post_raw_blocking(&url, &token, content_type, body)
        })
        .await
        .unwrap();
        assert_eq!(status, 400, "body {body:?} as {content_type}");
        assert_eq!(resp["error"], "invalid_content");
        assert!(resp["message"].as_str().is_some_and(|m| !m.is_empty()));
    }

    let (status, history) = request("GET", url, Some(&alice_token), None).await;
    assert_eq!(status, 200);
    assert_eq!(history, json!([]));

    let profile = format!("{base}/api/profile");
    let (status, resp) = tokio::task::spawn_blocking({
        let token = alice_token.clone();
        move || {
            let result = ureq::put(&profile)
                .set("Authorization", &format!("Bearer {token}"))
                .set("Content-Type", "application/json")
                .send_string(r#"{"avatar": ["x"]}"#);
            match result {
                Ok(r) => (r.status(), Value::Null),
                Err(ureq::Error::Status(code, r)) => {
                    (code, parse_body(r.into_string().unwrap_or_default()))
                }
                Err(e) => panic!("request failed: {e}"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(status, 400);
    assert_eq!(resp["error"], "invalid_content");
}

#[tokio::test]
async fn sending_to_unknown_peer_is_not_found() {
    let (base, db, _shutdown) = start_server(make_config(None)).await;
    let (_, alice_token) = add_user(&db, "Alice");

    let (status, body) = request(
        "POST",
        format!("{base}/api/conversations/nobody/messages"),
        Some(&alice_token),
        Some(json!({ "text": "hello?" })),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "unknown_peer");
}

#[tokio::test]
async fn only_the_sender_can_delete() {
    let (base, db, _shutdown) = start_server(make_config(None)).await;
    let (alice, alice_token) = add_user(&db, "Alice");
    let (bob, bob_token) = add_user(&db, "Bob");

    let (_, body) = request(
        "POST",
        format!("{base}/api/conversations/{bob}/messages"),
        Some(&alice_token),
        Some(json!({ "text": "oops" })),
    )
    .await;
    let id = body["message"]["id"].as_i64().expect("message id");

    let (status, body) =
        request("DELETE", format!("{base}/api/messages/{id}"), Some(&bob_token), None).await;
    assert_eq!(status, 403);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = request(
        "DELETE",
        format!("{base}/api/messages/{}", id + 1000),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, 404);

    let (status, _) =
        request("DELETE", format!("{base}/api/messages/abc"), Some(&alice_token), None).await;
    assert_eq!(status, 404);

    let (status, _) =
        request("DELETE", format!("{base}/api/messages/{id}"), Some(&alice_token), None).await;
    assert_eq!(status, 200);

    let (_, history) = request(
        "GET",
        format!("{base}/api/conversations/{alice}/messages"),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(history, json!([]));

    let (status, _) =
        request("DELETE", format!("{base}/api/messages/{id}"), Some(&alice_token), None).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn peers_exclude_the_requester() {
    let (base, db, _shutdown) = start_server(make_config(None)).await;
    let (_, alice_token) = add_user(&db, "Alice");
    let (carol, _) = add_user(&db, "Carol");
    let (bob, _) = add_user(&db, "Bob");

    let (status, peers) = request(
        "GET",
        format!("{base}/api/conversations/peers"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, 200);
    let ids: Vec<&str> = peers
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, [bob.as_str(), carol.as_str()]);
}

#[tokio::test]
async fn avatar_update_falls_back_to_raw_reference() {
    let assets = tempfile::tempdir().unwrap();
    let (base, db, _shutdown) =
        start_server(make_config(Some(assets.path().to_path_buf()))).await;
    let (_, token) = add_user(&db, "Alice");

    let (status, profile) = request(
        "PUT",
        format!("{base}/api/profile"),
        Some(&token),
        Some(json!({ "avatar": "data:image/png;base64,iVBORw0KGgo=" })),
    )
    .await;
    assert_eq!(status, 200);
    let url = profile["avatarUrl"].as_str().unwrap();
    assert!(url.starts_with("/assets/"), "uploaded avatar url: {url}");
    assert!(url.ends_with(".png"));

    // Not a data URL or remote URL: the upload fails and the raw value is kept.
    let (status, profile) = request(
        "PUT",
        format!("{base}/api/profile"),
        Some(&token),
        Some(json!({ "avatar": "avatar-42" })),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(profile["avatarUrl"], "avatar-42");

    let (_, me) = request("GET", format!("{base}/api/me"), Some(&token), None).await;
    assert_eq!(me["avatarUrl"], "avatar-42");

    let (status, body) = request(
        "PUT",
        format!("{base}/api/profile"),
        Some(&token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid_content");
}

#[tokio::test]
async fn inline_images_are_uploaded_before_sending() {
    let assets = tempfile::tempdir().unwrap();
    let (base, db, _shutdown) =
        start_server(make_config(Some(assets.path().to_path_buf()))).await;
    let (_, alice_token) = add_user(&db, "Alice");
    let (bob, _) = add_user(&db, "Bob");

    let (status, body) = request(
        "POST",
        format!("{base}/api/conversations/{bob}/messages"),
        Some(&alice_token),
        Some(json!({ "image": "data:image/png;base64,iVBORw0KGgo=" })),
    )
    .await;
    assert_eq!(status, 201);
    let image = body["message"]["imageRef"].as_str().unwrap();
    assert!(image.starts_with("/assets/"));
    assert!(body["message"].get("text").is_none());
    assert_eq!(std::fs::read_dir(assets.path()).unwrap().count(), 1);
}
