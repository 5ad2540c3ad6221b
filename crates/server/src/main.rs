use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskforge_core::audit::{create_audit_system, AuditEvent, AuditStore, SqliteAuditStore};
use taskforge_core::cache::{CacheManager, MemoryCache};
use taskforge_core::delivery::{DeliveryService, MondayClient};
use taskforge_core::extractor::{ExtractionEngine, GeminiClient, PromptTemplate};
use taskforge_core::resilience::{BreakerConfig, BreakerRegistry, KeyPool, KeyPoolConfig};
use taskforge_core::source::FirefliesClient;
use taskforge_core::store::{SqliteStore, TaskStore, TranscriptStore};
use taskforge_core::{load_config, validate_config, Config, HealthMonitor, PipelineRunner};

use taskforge_server::api::create_router;
use taskforge_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("TASKFORGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        config_hash = %&config_hash[..16],
        database = ?config.database.path,
        board = config.monday.board_id,
        "Configuration loaded"
    );

    // Create SQLite stores
    let store = Arc::new(
        SqliteStore::new(&config.database.path).context("Failed to create task store")?,
    );
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Stores initialized");

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    // Emit ServiceStarted event
    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
        })
        .await;

    // Shared resilience primitives
    let breakers = Arc::new(BreakerRegistry::new(breaker_config(&config)));
    let key_pool_config = key_pool_config(&config);
    let fireflies_keys = Arc::new(KeyPool::new(
        "fireflies",
        config.fireflies.api_keys.clone(),
        key_pool_config.clone(),
    ));
    let gemini_keys = Arc::new(KeyPool::new(
        "gemini",
        config.gemini.api_keys.clone(),
        key_pool_config,
    ));

    // Shared cache, defaulting to the transcript TTL
    let cache = Arc::new(CacheManager::new(
        Arc::new(MemoryCache::new()),
        Duration::from_secs(config.fireflies.cache_ttl_secs),
    ));

    // Transcript source
    let source = Arc::new(
        FirefliesClient::new(
            &config.fireflies,
            Arc::clone(&fireflies_keys),
            breakers.get_or_create("fireflies"),
            Arc::clone(&cache),
            Arc::clone(&store) as Arc<dyn TranscriptStore>,
        )
        .context("Failed to create transcript source")?,
    );

    // Extraction engine
    let llm = Arc::new(
        GeminiClient::new(
            &config.gemini,
            Arc::clone(&gemini_keys),
            breakers.get_or_create("gemini"),
        )
        .context("Failed to create LLM client")?,
    );
    let engine = Arc::new(ExtractionEngine::new(
        llm,
        PromptTemplate::standard(),
        Arc::clone(&cache),
        Duration::from_secs(config.gemini.prompt_cache_ttl_secs),
    ));

    // Work item sink and delivery service
    let sink = Arc::new(
        MondayClient::new(&config.monday, breakers.get_or_create("monday"))
            .context("Failed to create work item sink")?,
    );
    let delivery = Arc::new(DeliveryService::new(
        sink,
        Arc::clone(&store) as Arc<dyn TaskStore>,
        Duration::from_millis(config.monday.delivery_delay_ms),
    ));

    // Pipeline runner
    let runner = Arc::new(PipelineRunner::new(
        source,
        engine,
        Arc::clone(&store) as Arc<dyn TranscriptStore>,
        Arc::clone(&store) as Arc<dyn TaskStore>,
        Arc::clone(&delivery),
        Some(audit_handle.clone()),
        config.pipeline.max_items_per_run,
        config.pipeline.auto_deliver,
    ));
    info!("Pipeline runner initialized");

    // Health monitor over the shared primitives
    let health = Arc::new(
        HealthMonitor::new(Arc::clone(&breakers), Arc::clone(&cache))
            .with_key_pool("fireflies", fireflies_keys)
            .with_key_pool("gemini", gemini_keys),
    );

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        runner,
        delivery,
        Arc::clone(&store) as Arc<dyn TaskStore>,
        Arc::clone(&store) as Arc<dyn TranscriptStore>,
        audit_handle.clone(),
        audit_store,
        health,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Emit ServiceStopped event
    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // Drop the last AuditHandle so the writer's channel closes. AppState
    // was dropped with the server; the final event goes out first.
    drop(audit_handle);

    // Wait for writer to finish processing remaining events
    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

fn breaker_config(config: &Config) -> BreakerConfig {
    BreakerConfig {
        failure_threshold: config.resilience.breaker_failure_threshold,
        timeout: Duration::from_secs(config.resilience.breaker_timeout_secs),
        success_threshold: config.resilience.breaker_success_threshold,
    }
}

fn key_pool_config(config: &Config) -> KeyPoolConfig {
    KeyPoolConfig {
        min_request_interval: Duration::from_secs(config.resilience.key_min_interval_secs),
        default_cooldown: Duration::from_secs(config.resilience.key_cooldown_secs),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
