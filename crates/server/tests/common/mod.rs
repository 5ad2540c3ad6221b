//! Common test utilities for driving the HTTP surface in-process.
//!
//! The fixture wires the real router, stores and pipeline against mock
//! vendor clients, so tests cover everything except the network.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use taskforge_core::audit::{create_audit_system, AuditStore, SqliteAuditStore};
use taskforge_core::cache::{CacheManager, MemoryCache};
use taskforge_core::delivery::DeliveryService;
use taskforge_core::extractor::{ExtractionEngine, PromptTemplate};
use taskforge_core::resilience::{BreakerConfig, BreakerRegistry, KeyPool, KeyPoolConfig, RetryPolicy};
use taskforge_core::store::{SqliteStore, TaskStore, TranscriptStore};
use taskforge_core::testing::{MockLlmClient, MockTranscriptSource, MockWorkItemSink};
use taskforge_core::{load_config_from_str, HealthMonitor, PipelineRunner};

use taskforge_server::api::create_router;
use taskforge_server::state::AppState;

/// Re-export fixtures for test convenience
pub use taskforge_core::testing::fixtures;

const TEST_CONFIG: &str = r#"
[fireflies]
api_keys = ["ff-test-key"]

[gemini]
api_keys = ["gm-test-key"]

[monday]
api_token = "mn-test-token"
board_id = 4242
"#;

/// In-process server with mock vendor clients.
pub struct TestFixture {
    pub router: Router,
    pub source: Arc<MockTranscriptSource>,
    pub llm: Arc<MockLlmClient>,
    pub sink: Arc<MockWorkItemSink>,
    pub store: Arc<SqliteStore>,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Fixture seeded with one "Weekly Sync" transcript and a canned
    /// single-task extraction.
    pub async fn new() -> Self {
        let source = MockTranscriptSource::with_transcripts(vec![fixtures::transcript(
            "t-weekly",
            "Weekly Sync",
            1750057200000,
        )]);
        let llm = MockLlmClient::with_response(&fixtures::extraction_output(
            "Draft the proposal for the client covering scope and pricing",
        ));
        Self::with_mocks(source, llm).await
    }

    pub async fn with_mocks(source: MockTranscriptSource, llm: MockLlmClient) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = load_config_from_str(TEST_CONFIG).expect("Failed to parse test config");

        let store = Arc::new(SqliteStore::new(&db_path).expect("Failed to create store"));
        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let cache = Arc::new(CacheManager::new(
            Arc::new(MemoryCache::new()),
            Duration::from_secs(1800),
        ));

        let source = Arc::new(source);
        let llm = Arc::new(llm);
        let sink = Arc::new(MockWorkItemSink::new());

        let engine = Arc::new(ExtractionEngine::new(
            Arc::clone(&llm) as _,
            PromptTemplate::standard(),
            Arc::clone(&cache),
            Duration::from_secs(1800),
        ));

        let delivery = Arc::new(
            DeliveryService::new(
                Arc::clone(&sink) as _,
                Arc::clone(&store) as Arc<dyn TaskStore>,
                Duration::ZERO,
            )
            .with_retry_policy(RetryPolicy::immediate()),
        );

        let runner = Arc::new(PipelineRunner::new(
            Arc::clone(&source) as _,
            engine,
            Arc::clone(&store) as Arc<dyn TranscriptStore>,
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Arc::clone(&delivery),
            Some(audit_handle.clone()),
            config.pipeline.max_items_per_run,
            config.pipeline.auto_deliver,
        ));

        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
        let fireflies_keys = Arc::new(KeyPool::new(
            "fireflies",
            config.fireflies.api_keys.clone(),
            KeyPoolConfig::default(),
        ));
        let health = Arc::new(
            HealthMonitor::new(breakers, Arc::clone(&cache))
                .with_key_pool("fireflies", fireflies_keys),
        );

        let state = Arc::new(AppState::new(
            config,
            runner,
            delivery,
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Arc::clone(&store) as Arc<dyn TranscriptStore>,
            audit_handle,
            audit_store,
            health,
        ));

        Self {
            router: create_router(state),
            source,
            llm,
            sink,
            store,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or(Value::String(String::from_utf8_lossy(&body_bytes).into()))
        };

        TestResponse { status, body }
    }

    /// Run the pipeline once and return the task ids now pending review.
    pub async fn run_and_collect_pending(&self) -> Vec<String> {
        let response = self.post_empty("/api/pipeline/run").await;
        assert_eq!(response.status, StatusCode::OK);

        let tasks = self.get("/api/tasks?approval=pending").await;
        tasks.body["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_str().unwrap().to_string())
            .collect()
    }

    /// Give the background audit writer a beat to drain.
    pub async fn drain_audit(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
