//! End-to-end tests: the real router on an ephemeral port, driven by reqwest.

use anyhow::Result;
use legacy_extractor::config::AppConfig;
use legacy_extractor::extractor::Extractor;
use legacy_extractor::openrouter::{CompletionBackend, Message};
use legacy_extractor::store::{MemoryStore, Store, SupabaseStore};
use legacy_extractor::{app, AppState};
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

struct TestServer {
    base: String,
    client: Client,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(&[], Arc::new(MemoryStore::new()), Extractor::basic()).await
    }

    async fn start_with(
        overrides: &[(&str, &str)],
        store: Arc<dyn Store>,
        extractor: Extractor,
    ) -> Self {
        let mut env: HashMap<String, String> = HashMap::new();
        env.insert("JWT_SECRET".into(), "test-secret".into());
        for (k, v) in overrides {
            env.insert(k.to_string(), v.to_string());
        }
        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        let state = AppState::new(config, store, extractor);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            base: format!("http://{}/api", addr),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = self.client.get(self.url(path));
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    /// Register an account and return its token.
    async fn register(&self, email: &str, company: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                json!({
                    "email": email,
                    "password": "password123",
                    "companyName": company,
                    "contactName": "Pat",
                    "acceptTerms": true
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }
}

fn sample_schema() -> Value {
    json!([
        {"id": "1", "name": "userId", "description": "The unique identifier for the user"},
        {"id": "2", "name": "firstName", "description": "The user's first name"},
        {"id": "3", "name": "lastName", "description": "The user's last name"},
        {"id": "4", "name": "city", "description": "The city where the user lives"},
        {"id": "5", "name": "country", "description": "The country where the user lives"}
    ])
}

fn history_body(title: &str) -> Value {
    json!({
        "title": title,
        "timestamp": "2024-05-01T10:00:00.000Z",
        "legacyData": "001-a-b-c-In",
        "schema": sample_schema(),
        "extractedData": [{"userId": "001"}]
    })
}

#[tokio::test]
async fn test_health_reports_database() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "db": "connected"}));
}

#[tokio::test]
async fn test_register_login_and_me() {
    let server = TestServer::start().await;
    let token = server.register("Ops@Acme.io", "Acme").await;

    let (status, body) = server.get("/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ops@acme.io");

    let (status, body) = server
        .post("/auth/login", None, json!({"email": "OPS@acme.io", "password": "password123"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ops@acme.io");
    assert!(body["token"].as_str().is_some());

    let (status, body) = server
        .post("/auth/login", None, json!({"email": "ops@acme.io", "password": "wrong-pass"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");

    let (status, _) = server
        .post("/auth/login", None, json!({"email": "nobody@acme.io", "password": "password123"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server.post("/auth/login", None, json!({"email": "ops@acme.io"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email and password are required");
}

#[tokio::test]
async fn test_register_validation() {
    let server = TestServer::start().await;
    let base = json!({
        "email": "a@acme.io",
        "password": "password123",
        "companyName": "Acme",
        "contactName": "Pat",
        "acceptTerms": true
    });
    let with = |key: &str, value: Value| {
        let mut body = base.clone();
        body[key] = value;
        body
    };

    let cases = [
        (with("companyName", json!("")), "Company name, contact, email and password are required"),
        (with("email", json!("not-an-email")), "Invalid email format"),
        (with("password", json!("short")), "Password must be at least 8 characters long"),
        (with("acceptTerms", json!(false)), "You must accept the terms to register"),
    ];
    for (body, expected) in cases {
        let (status, resp) = server.post("/auth/register", None, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], expected);
    }

    server.register("a@acme.io", "Acme").await;
    let (status, resp) = server.post("/auth/register", None, base.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(resp["error"], "An account with this email already exists");
}

#[tokio::test]
async fn test_bearer_token_required() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/history", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing Authorization header");

    let (status, body) = server.get("/history", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn test_profile_read_and_update() {
    let server = TestServer::start().await;
    let token = server.register("a@acme.io", "Acme").await;

    let (status, profile) = server.get("/users/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["companyName"], "Acme");
    assert_eq!(profile["contactName"], "Pat");
    assert!(profile.get("passwordHash").is_none());
    assert!(profile["acceptedTermsAt"].is_string());

    let (status, profile) = server
        .put("/users/me", &token, json!({"companyDomain": "acme.io"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["companyDomain"], "acme.io");
    assert_eq!(profile["companyName"], "Acme");

    let (status, _) = server.put("/users/me", &token, json!({"contactName": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_crud_is_company_scoped() {
    let server = TestServer::start().await;
    let alice = server.register("alice@acme.io", "Acme").await;
    let bob = server.register("bob@acme.io", "Acme").await;
    let eve = server.register("eve@evil.io", "Evil").await;

    let (status, body) = server.post("/history", Some(&alice), json!({"title": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");

    let (status, first) = server.post("/history", Some(&alice), history_body("first")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, second) = server.post("/history", Some(&bob), history_body("second")).await;
    let first_id = first["_id"].as_str().unwrap().to_string();

    // Colleagues share history, newest first.
    let (_, listed) = server.get("/history", Some(&alice)).await;
    let titles: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["second", "first"]);
    assert_eq!(second["companyName"], "Acme");

    // Another company sees nothing and cannot touch the rows.
    let (_, listed) = server.get("/history", Some(&eve)).await;
    assert_eq!(listed, json!([]));
    let (status, body) = server
        .put(&format!("/history/{}", first_id), &eve, json!({"title": "mine"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "History item not found");
    let (status, _) = server.delete(&format!("/history/{}", first_id), &eve).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, updated) = server
        .put(&format!("/history/{}", first_id), &bob, json!({"title": "renamed"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "renamed");
    assert_eq!(updated["legacyData"], "001-a-b-c-In");

    let (status, _) = server
        .put(&format!("/history/{}", first_id), &bob, json!({"title": ""}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server.delete(&format!("/history/{}", first_id), &alice).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    let (status, _) = server.delete("/history/not-a-uuid", &alice).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_documents_crud() {
    let server = TestServer::start().await;
    let alice = server.register("alice@acme.io", "Acme").await;
    let eve = server.register("eve@evil.io", "Evil").await;

    let (status, body) = server
        .post("/docs", Some(&alice), json!({"title": "Report", "content": ""}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Title and content are required");

    let (status, doc) = server
        .post(
            "/docs",
            Some(&alice),
            json!({
                "title": "Report",
                "content": [{"userId": "001"}],
                "keyPoints": ["userId"],
                "fileName": "report.csv"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(doc["notes"], "");
    assert_eq!(doc["tags"], json!([]));
    let id = doc["_id"].as_str().unwrap().to_string();

    let (status, updated) = server
        .put(&format!("/docs/{}", id), &alice, json!({"notes": "reviewed"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["notes"], "reviewed");
    assert_eq!(updated["fileName"], "report.csv");

    let (_, listed) = server.get("/docs", Some(&eve)).await;
    assert_eq!(listed, json!([]));
    let (status, body) = server.delete(&format!("/docs/{}", id), &eve).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Document not found");

    let (status, _) = server.delete(&format!("/docs/{}", id), &alice).await;
    assert_eq!(status, StatusCode::OK);
    let (_, listed) = server.get("/docs", Some(&alice)).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn test_extract_save_and_export() {
    let server = TestServer::start().await;
    let token = server.register("alice@acme.io", "Acme").await;

    let (status, body) = server
        .post("/extract", Some(&token), json!({"legacyData": "  ", "schema": sample_schema()}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Please provide legacy data and a complete schema with field names."
    );

    let legacy = "001-pratima-k-NEW delhi-In\n002-A-B-C-In\n003-P-J-E-IN";
    let (status, body) = server
        .post(
            "/extract",
            Some(&token),
            json!({"legacyData": legacy, "schema": sample_schema(), "save": true}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "basic");
    assert_eq!(body["records"].as_array().unwrap().len(), 3);
    assert_eq!(
        body["records"][1],
        json!({"userId": "002", "firstName": "A", "lastName": "B", "city": "C", "country": "In"})
    );

    let item = &body["historyItem"];
    assert_eq!(item["title"], "001-pratima-k-NEW delhi-In...");
    let id = item["_id"].as_str().unwrap();

    let resp = server
        .client
        .get(server.url(&format!("/history/{}/export", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"001-pratima-k-new-delhi-in-.csv\""
    );
    let csv = resp.text().await.unwrap();
    let lines: Vec<&str> = csv.trim_start_matches('\u{FEFF}').split('\n').collect();
    assert_eq!(lines[0], "userId,firstName,lastName,city,country");
    assert_eq!(lines[1], "001,pratima,k,NEW,delhi");
    assert_eq!(lines.len(), 4);

    let resp = server
        .client
        .get(server.url(&format!("/history/{}/export?format=json", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    let records: Value = resp.json().await.unwrap();
    assert_eq!(records[2]["country"], "IN");
}

struct FixedReply(&'static str);

#[async_trait::async_trait]
impl CompletionBackend for FixedReply {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _messages: Vec<Message>) -> Result<String> {
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn test_extract_prefers_ai_backend() {
    let extractor = Extractor::with_backend(Arc::new(FixedReply(
        "```json\n[{\"userId\": 1, \"city\": \"New Delhi\"}]\n```",
    )));
    let server = TestServer::start_with(&[], Arc::new(MemoryStore::new()), extractor).await;
    let token = server.register("alice@acme.io", "Acme").await;

    let (status, body) = server
        .post(
            "/extract",
            Some(&token),
            json!({"legacyData": "001-pratima-k-NEW delhi-In", "schema": sample_schema()}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "ai");
    assert_eq!(body["records"], json!([{"userId": 1, "city": "New Delhi"}]));
    assert!(body.get("historyItem").is_none());
}

#[tokio::test]
async fn test_rate_limit() {
    let server = TestServer::start_with(
        &[("RATE_LIMIT_MAX", "2")],
        Arc::new(MemoryStore::new()),
        Extractor::basic(),
    )
    .await;

    assert_eq!(server.get("/health", None).await.0, StatusCode::OK);
    assert_eq!(server.get("/health", None).await.0, StatusCode::OK);

    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_unready_store_short_circuits() {
    let store = SupabaseStore::new("http://127.0.0.1:9", "key").unwrap();
    let server = TestServer::start_with(&[], Arc::new(store), Extractor::basic()).await;

    let (status, body) = server.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["db"], "disconnected");

    let (status, body) = server
        .post("/auth/login", None, json!({"email": "a@b.co", "password": "password123"}))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Database not connected");
}

#[tokio::test]
async fn test_security_and_cors_headers() {
    let server = TestServer::start().await;

    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["x-frame-options"], "SAMEORIGIN");

    let preflight = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/history"))
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(
        preflight.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
    assert_eq!(
        preflight.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
        "true"
    );
}

#[tokio::test]
async fn test_body_rejections_keep_their_status() {
    let server = TestServer::start_with(
        &[("BODY_LIMIT_BYTES", "1024")],
        Arc::new(MemoryStore::new()),
        Extractor::basic(),
    )
    .await;
    let token = server.register("alice@acme.io", "Acme").await;

    let (status, body) = server
        .post(
            "/docs",
            Some(&token),
            json!({"title": "Big", "content": "x".repeat(4096)}),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap().contains("length limit"));

    let resp = server
        .client
        .post(server.url("/docs"))
        .bearer_auth(&token)
        .body(r#"{"title": "t", "content": "c"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    let resp = server
        .client
        .post(server.url("/docs"))
        .bearer_auth(&token)
        .header(header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_token_for_unknown_user_is_unauthorized() {
    // Both servers sign with the same secret but keep separate stores.
    let issuer = TestServer::start().await;
    let other = TestServer::start().await;
    let token = issuer.register("alice@acme.io", "Acme").await;

    let (status, body) = other.get("/history", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Unauthorized"}));

    let (status, _) = issuer.get("/history", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_extract_incomplete_schema_field() {
    let server = TestServer::start().await;
    let token = server.register("alice@acme.io", "Acme").await;

    let (status, body) = server
        .post(
            "/extract",
            Some(&token),
            json!({"legacyData": "1-a", "schema": [{"id": "1"}]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Please provide legacy data and a complete schema with field names."
    );

    // Ids are only needed when the run is saved.
    let (status, body) = server
        .post(
            "/extract",
            Some(&token),
            json!({"legacyData": "1-a", "schema": [{"name": "n"}, {"name": "c"}]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"], json!([{"n": "1", "c": "a"}]));

    let (status, body) = server
        .post(
            "/extract",
            Some(&token),
            json!({"legacyData": "1-a", "schema": [{"name": "n"}], "save": true}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "schema.0.id is required");
}
