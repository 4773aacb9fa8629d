mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use common::*;
use governance_rules::server;
use governance_rules_core::embedding::Embedder;

struct TestServer {
    base: String,
    client: reqwest::Client,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start(embedder: Arc<dyn Embedder>) -> Self {
        let store = Arc::new(memory_store(embedder).await);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let _ = server::serve(listener, store).await;
        });
        Self {
            base: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn load_five(&self) {
        for draft in five_rules() {
            let (status, body) = self.post("/rules", serde_json::to_value(&draft).unwrap()).await;
            assert_eq!(status, 200, "load failed: {}", body);
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn test_health_reports_version() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_load_then_list() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;

    let (status, body) = server
        .post(
            "/rules",
            json!({
                "title": "Privacy Rule",
                "rule_text": "Do not expose personal data",
                "category": "privacy",
                "priority": 8,
                "tags": ["pii"]
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Rule loaded successfully");
    let id = body["rule_id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 12);

    let (status, body) = server.get("/rules").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 1);
    let rule = &body["rules"][0];
    assert_eq!(rule["rule_id"], id);
    assert_eq!(rule["title"], "Privacy Rule");
    assert_eq!(rule["category"], "privacy");
    assert_eq!(rule["priority"], 8);
    assert_eq!(rule["tags"], json!(["pii"]));
    assert!(rule.get("embedding").is_none());
    assert!(rule["created_at"].is_string());
}

#[tokio::test]
async fn test_list_limit_and_order() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;
    server.load_five().await;

    let (status, body) = server.get("/rules?limit=2").await;
    assert_eq!(status, 200);
    let priorities: Vec<i64> = body["rules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["priority"].as_i64().unwrap())
        .collect();
    assert_eq!(priorities, vec![9, 7]);
    assert_eq!(body["total"], 5);
}

#[tokio::test]
async fn test_invalid_list_limit_is_rejected() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;
    for path in ["/rules?limit=abc", "/rules?limit=0", "/rules?limit=-3"] {
        let (status, body) = server.get(path).await;
        assert_eq!(status, 400, "{}", path);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("limit"));
    }
}

#[tokio::test]
async fn test_query_with_category_filter() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;
    server.load_five().await;

    let (status, body) = server
        .post(
            "/rules/query",
            json!({ "query": "personal data privacy", "category": "privacy", "limit": 10 }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    let rules = body["rules"].as_array().unwrap();
    assert!(!rules.is_empty() && rules.len() <= 2);
    for rule in rules {
        assert_eq!(rule["category"], "privacy");
        assert!(rule["score"].as_f64().unwrap() > 0.0);
    }
}

#[tokio::test]
async fn test_query_limit_bounds_results() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;
    server.load_five().await;

    let (status, body) = server
        .post("/rules/query", json!({ "query": "data", "limit": 2 }))
        .await;
    assert_eq!(status, 200);
    assert!(body["rules"].as_array().unwrap().len() <= 2);
}

#[tokio::test]
async fn test_validation_errors_are_400() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;

    let (status, body) = server
        .post("/rules", json!({ "rule_text": "text without a title" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("title"));

    let (status, body) = server.post("/rules/query", json!({ "query": "" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);

    let (status, _) = server
        .post("/rules/query", json!({ "query": "data", "limit": 0 }))
        .await;
    assert_eq!(status, 400);

    let (status, body) = server
        .post(
            "/rules",
            json!({ "title": "t", "rule_text": "big priority", "priority": 3_000_000_000i64 }),
        )
        .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("priority"));
}

#[tokio::test]
async fn test_empty_body_is_a_validation_error() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;
    let resp = server.client.post(server.url("/rules")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("title"));
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;
    let resp = server
        .client
        .post(server.url("/rules"))
        .header("content-type", "application/json")
        .body("{\"title\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("invalid JSON body"));
}

#[tokio::test]
async fn test_unsupported_method_and_path() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;

    let resp = server.client.put(server.url("/rules")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Unsupported method/path: PUT /rules");

    let (status, body) = server.get("/nowhere").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Unsupported method/path: GET /nowhere");

    let (status, body) = server.get("/rules/query").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Unsupported method/path: GET /rules/query");
}

#[tokio::test]
async fn test_query_embedding_failure_is_400() {
    let server = TestServer::start(Arc::new(FailingEmbedder)).await;

    // Writes still go through with a zero vector.
    let (status, _) = server
        .post("/rules", json!({ "title": "t", "rule_text": "some rule" }))
        .await;
    assert_eq!(status, 200);

    let (status, body) = server.post("/rules/query", json!({ "query": "rule" })).await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("embed"));
}

#[tokio::test]
async fn test_panic_becomes_internal_server_error() {
    let server = TestServer::start(Arc::new(PanickingEmbedder)).await;
    let (status, body) = server.post("/rules/query", json!({ "query": "anything" })).await;
    assert_eq!(status, 500);
    assert_eq!(body, json!({ "success": false, "error": "Internal server error" }));

    // The server keeps serving afterwards.
    let (status, _) = server.get("/health").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let server = TestServer::start(Arc::new(KeywordEmbedder)).await;

    let resp = server
        .client
        .get(server.url("/rules"))
        .header("origin", "https://dashboard.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );

    let preflight = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/rules/query"))
        .header("origin", "https://dashboard.example.com")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    let methods = preflight
        .headers()
        .get("access-control-allow-methods")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(methods.contains("POST"));
}
