use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{response::Html, routing::get, Extension, Router};
use mongodb::{options::ClientOptions, Client as MongoClient};
use tracing_subscriber::{fmt, EnvFilter};

use import_service::cache::TtlCache;
use import_service::config::Config;
use import_service::dedupe::DuplicateGuard;
use import_service::files::HttpFileStore;
use import_service::import::ImportEngine;
use import_service::schema::{build_schema, AppState, ImportSchema};
use import_service::storage::{ImportStore, MongoImportStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load this crate's .env regardless of current working directory, and override any pre-set envs
    let _ = dotenvy::from_filename_override(concat!(env!("CARGO_MANIFEST_DIR"), "/.env"));
    // Initialize logging
    let filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    fmt()
        .with_env_filter(filter)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(true)
        .init();

    let cfg = Config::from_env();
    tracing::info!(
        database = %cfg.database_name,
        chunk_size = cfg.chunk_size,
        batch_size = cfg.batch_size,
        "Loaded configuration"
    );

    // Some MongoDB deployments require retryWrites=false explicitly in the URI. If configured off,
    // ensure the connection string includes retryWrites=false (override any existing setting).
    let mut effective_uri = cfg.mongodb_uri.clone();
    if !cfg.mongodb_retry_writes {
        if effective_uri.contains("retryWrites=") {
            effective_uri = effective_uri
                .replace("retryWrites=true", "retryWrites=false")
                .replace("retryWrites=1", "retryWrites=false");
        } else if effective_uri.contains('?') {
            effective_uri.push_str("&retryWrites=false");
        } else {
            effective_uri.push_str("?retryWrites=false");
        }
    }
    let mut client_options = ClientOptions::parse(&effective_uri).await?;
    client_options.retry_writes = Some(cfg.mongodb_retry_writes);
    let mongo_client = MongoClient::with_options(client_options)?;
    let db = mongo_client.database(&cfg.database_name);

    let mongo_store = MongoImportStore::new(db, cfg.retry_policy());
    if let Err(e) = mongo_store.ensure_indexes().await {
        tracing::warn!(error = %e, "Failed to ensure indexes on startup");
    }
    let store: Arc<dyn ImportStore> = Arc::new(mongo_store);

    let files = Arc::new(HttpFileStore::new(
        cfg.file_storage_url.clone(),
        cfg.http_timeout_ms,
        cfg.retry_policy(),
    ));

    let engine = Arc::new(ImportEngine::new(
        store.clone(),
        files,
        cfg.import_settings(),
    ));

    let state = AppState {
        engine,
        store: store.clone(),
        duplicate_guard: DuplicateGuard::new(store),
        history_cache: TtlCache::new(Duration::from_millis(cfg.cache_ttl_ms)),
    };
    let graphql_schema = build_schema(state);

    let app = Router::new()
        .route("/graphql", get(graphql_playground).post(graphql_handler))
        .route("/health", get(health_check))
        .layer(Extension(graphql_schema));

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.port).parse()?;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!(port = cfg.port, "Port is already in use. Another import-service might be running. Try changing PORT env var or stop the other process.");
            }
            return Err(e.into());
        }
    };
    tracing::info!(port = cfg.port, "Import service listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn graphql_playground() -> Html<String> {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

async fn graphql_handler(
    Extension(schema): Extension<ImportSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn health_check() -> &'static str {
    "OK"
}
