//! HTTP service tests against a live listener on an ephemeral port.
//!
//! The vision model is scripted, the store is in-memory; nothing leaves the
//! machine.

use async_trait::async_trait;
use edgequake_llm::ImageData;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tastecheq::server::{router, state::AppState};
use tastecheq::store::AccountStore;
use tastecheq::{ScanConfig, ScanError, ServerConfig, SqliteStore, VisionModel};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replies with `reply`, or fails when `reply` is `None`.
struct ScriptedModel {
    reply: Option<&'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn describe(&self, _prompt: &str, image: ImageData) -> Result<String, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!image.data.is_empty());
        self.reply.map(str::to_string).ok_or_else(|| ScanError::AiParsingFailed {
            detail: "upstream 503".into(),
        })
    }
}

struct Harness {
    base: String,
    client: reqwest::Client,
    store: Arc<SqliteStore>,
    model: Arc<ScriptedModel>,
}

impl Harness {
    async fn start(reply: Option<&'static str>, free_limit: u32) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let model = Arc::new(ScriptedModel {
            reply,
            calls: AtomicUsize::new(0),
        });
        let config = Arc::new(ScanConfig::builder().free_tier_limit(free_limit).build().unwrap());
        let state = AppState::new(store.clone(), model.clone(), config);
        let app = router(state, &ServerConfig::default());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            store,
            model,
        }
    }

    fn session(&self, name: &str, is_admin: bool, paid: bool) -> (String, String) {
        let account = self.store.create_account(name, is_admin).unwrap();
        if paid {
            self.store.set_subscription(&account.id, true).unwrap();
        }
        let token = self.store.create_session(&account.id).unwrap();
        (account.id, token)
    }

    fn get(&self, path: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        self.with_cookie(self.client.get(format!("{}{}", self.base, path)), token)
    }

    fn send(&self, method: reqwest::Method, path: &str, token: Option<&str>, body: Value) -> reqwest::RequestBuilder {
        self.with_cookie(self.client.request(method, format!("{}{}", self.base, path)), token)
            .json(&body)
    }

    fn with_cookie(&self, builder: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(t) => builder.header(reqwest::header::COOKIE, format!("session={t}")),
            None => builder,
        }
    }

    async fn extract(&self, token: Option<&str>) -> reqwest::Response {
        self.send(
            reqwest::Method::POST,
            "/api/gemini-menu",
            token,
            json!({ "imageBase64": "data:image/jpeg;base64,/9j/4AAQSkZJRg==" }),
        )
        .send()
        .await
        .unwrap()
    }
}

const REPLY: &str = r#"Here you go:
```json
[{"name": "Cheeseburger", "price": "$12", "description": "Beef patty"}, {"name": "Fries", "price": 4}]
```"#;

// ── Extraction and quota ─────────────────────────────────────────────────────

#[tokio::test]
async fn extraction_requires_a_session() {
    let h = Harness::start(Some(REPLY), 5).await;
    let resp = h.extract(None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn free_account_is_stopped_at_the_limit() {
    let h = Harness::start(Some(REPLY), 2).await;
    let (_, token) = h.session("free", false, false);

    for _ in 0..2 {
        let resp = h.extract(Some(&token)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let items: Value = resp.json().await.unwrap();
        assert_eq!(items[0]["name"], "Cheeseburger");
        assert_eq!(items[1]["price"], "4");
        assert!(items[1].get("description").is_none());
    }

    let resp = h.extract(Some(&token)).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["limit"], 2);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 2);

    let usage: Value = h.get("/api/usage", Some(&token)).send().await.unwrap().json().await.unwrap();
    assert_eq!(usage, json!({ "count": 2, "limit": 2, "isPaid": false }));
}

#[tokio::test]
async fn failed_extraction_is_not_charged() {
    let h = Harness::start(None, 5).await;
    let (_, token) = h.session("free", false, false);

    let resp = h.extract(Some(&token)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("AI parsing failed"));

    let usage: Value = h.get("/api/usage", Some(&token)).send().await.unwrap().json().await.unwrap();
    assert_eq!(usage["count"], 0);
}

#[tokio::test]
async fn unparsable_reply_is_a_server_error() {
    let h = Harness::start(Some("Sorry, I can't read this menu."), 5).await;
    let (_, token) = h.session("free", false, false);
    assert_eq!(h.extract(Some(&token)).await.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn invalid_payload_is_rejected() {
    let h = Harness::start(Some(REPLY), 5).await;
    let (_, token) = h.session("free", false, false);

    let resp = h
        .send(reqwest::Method::POST, "/api/gemini-menu", Some(&token), json!({ "imageBase64": "not base64!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .send(reqwest::Method::POST, "/api/gemini-menu", Some(&token), json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn paid_account_is_unmetered() {
    let h = Harness::start(Some(REPLY), 1).await;
    let (_, token) = h.session("paid", false, true);

    for _ in 0..3 {
        assert_eq!(h.extract(Some(&token)).await.status(), StatusCode::OK);
    }
    let usage: Value = h.get("/api/usage", Some(&token)).send().await.unwrap().json().await.unwrap();
    assert_eq!(usage, json!({ "count": 0, "limit": null, "isPaid": true }));
}

#[tokio::test]
async fn anonymous_usage_shows_the_free_limit() {
    let h = Harness::start(Some(REPLY), 5).await;
    let usage: Value = h.get("/api/usage", None).send().await.unwrap().json().await.unwrap();
    assert_eq!(usage, json!({ "count": 0, "limit": 5, "isPaid": false }));
}

#[tokio::test]
async fn only_admins_reset_counters() {
    let h = Harness::start(Some(REPLY), 1).await;
    let (user_id, token) = h.session("free", false, false);
    let (_, admin) = h.session("admin", true, false);

    assert_eq!(h.extract(Some(&token)).await.status(), StatusCode::OK);
    assert_eq!(h.extract(Some(&token)).await.status(), StatusCode::TOO_MANY_REQUESTS);

    let reset = |t: Option<String>| {
        h.send(
            reqwest::Method::POST,
            "/api/admin/usage/reset",
            t.as_deref(),
            json!({ "userId": user_id }),
        )
        .send()
    };

    let body: Value = reset(Some(token.clone())).await.unwrap().json().await.unwrap();
    assert_eq!(body["success"], false);
    let body: Value = reset(None).await.unwrap().json().await.unwrap();
    assert_eq!(body["success"], false);

    let body: Value = reset(Some(admin)).await.unwrap().json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(h.extract(Some(&token)).await.status(), StatusCode::OK);
}

// ── Menu items ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn menu_item_crud() {
    let h = Harness::start(Some(REPLY), 5).await;
    let (user_id, token) = h.session("editor", false, false);

    let resp = h
        .get("/api/menu-items", None)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let create = json!({ "restaurantId": "r1", "name": "Pad Thai", "price": "$13" });
    let resp = h
        .send(reqwest::Method::POST, "/api/menu-items", None, create.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = h
        .send(reqwest::Method::POST, "/api/menu-items", Some(&token), create)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let item: Value = resp.json().await.unwrap();
    let id = item["id"].as_str().unwrap().to_string();
    assert_eq!(item["createdById"], user_id.as_str());

    let resp = h
        .send(
            reqwest::Method::POST,
            "/api/menu-items",
            Some(&token),
            json!({ "restaurantId": "r1", "name": "  pad thai " }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .send(reqwest::Method::POST, "/api/menu-items", Some(&token), json!({ "restaurantId": "r1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .send(
            reqwest::Method::PUT,
            "/api/menu-items",
            Some(&token),
            json!({ "id": id, "name": "Pad Thai", "description": "rice noodles" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["description"], "rice noodles");
    assert!(updated["price"].is_null());

    let items: Value = h
        .get("/api/menu-items?restaurantId=r1", None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(items.as_array().unwrap().len(), 1);

    let resp = h
        .send(reqwest::Method::DELETE, "/api/menu-items", Some(&token), json!({ "id": id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let items: Value = h
        .get("/api/menu-items?restaurantId=r1", None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(items.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reconcile_then_batch() {
    let h = Harness::start(Some(REPLY), 5).await;
    let (_, token) = h.session("editor", false, false);

    for name in ["Fries", "Soup"] {
        let resp = h
            .send(
                reqwest::Method::POST,
                "/api/menu-items",
                Some(&token),
                json!({ "restaurantId": "r1", "name": name }),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let candidates = json!({
        "restaurantId": "r1",
        "candidates": [
            { "name": "fries", "price": "$4" },
            { "name": "SOUP" },
            { "name": "Cheeseburger", "price": "$12" }
        ]
    });

    let rec: Value = h
        .send(reqwest::Method::POST, "/api/menu-items/reconcile", None, candidates.clone())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let kinds: Vec<_> = rec["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["classification"]["kind"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["updateCandidate", "duplicate", "new"]);

    let resp = h
        .send(reqwest::Method::POST, "/api/menu-items/batch", Some(&token), candidates)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report, json!({ "added": 1, "updated": 1, "skipped": 0 }));

    let items: Value = h
        .get("/api/menu-items?restaurantId=r1", None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 3);
    let fries = items.iter().find(|i| i["name"] == "fries" || i["name"] == "Fries").unwrap();
    assert_eq!(fries["price"], "$4");
}

// ── Tastings ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tastings_and_restaurant_menu() {
    let h = Harness::start(Some(REPLY), 5).await;
    let (_, alice) = h.session("alice", false, false);
    let (_, bob) = h.session("bob", false, false);

    let item: Value = h
        .send(
            reqwest::Method::POST,
            "/api/menu-items",
            Some(&alice),
            json!({ "restaurantId": "r1", "name": "Laksa" }),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let path = format!("/api/menu-items/{}/tasting", item["id"].as_str().unwrap());

    for (token, stars) in [(&alice, 5), (&bob, 4)] {
        let resp = h
            .send(
                reqwest::Method::PUT,
                &path,
                Some(token),
                json!({ "tried": true, "rating": { "stars": stars } }),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = h
        .send(reqwest::Method::PUT, &path, Some(&bob), json!({ "rating": { "stars": 9 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let log: Value = h
        .get("/api/restaurants/r1/tastings", Some(&alice))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(log[item["id"].as_str().unwrap()]["rating"]["stars"], 5);

    let menu: Value = h.get("/api/restaurants/r1/menu", None).send().await.unwrap().json().await.unwrap();
    assert_eq!(menu[0]["name"], "Laksa");
    assert_eq!(menu[0]["avgStars"], 4.5);
    assert_eq!(menu[0]["reviewCount"], 2);

    let resp = h.get("/api/restaurants/r1/tastings", None).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_open() {
    let h = Harness::start(None, 5).await;
    let resp = h.get("/health", None).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "OK");
}
