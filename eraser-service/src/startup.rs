//! Application wiring: backend selection, router assembly, and the server
//! lifecycle.

use crate::config::{AppConfig, DatabaseBackend, RemovalProvider, StorageBackend};
use crate::handlers;
use crate::processing::Processor;
use crate::services::database::MongoDb;
use crate::services::fetcher::{HttpFetcher, StaticFetcher, UrlFetcher};
use crate::services::inference::{BackgroundRemover, MockRemover, RemovalClient};
use crate::services::ledger::CreditLedger;
use crate::services::memory::MemoryStore;
use crate::services::paddle::PaddleClient;
use crate::services::storage::{LocalStorage, ObjectStore, S3Storage};
use crate::services::usage::UsageLog;
use crate::services::users::UserStore;
use crate::services::BillingLedger;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use service_core::error::AppError;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Ten 10 MB images plus multipart overhead.
const MAX_BODY_BYTES: usize = 110 * 1024 * 1024;

/// A 1x1 transparent PNG; what the static fetcher serves when the mock
/// inference provider is active.
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x62, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub credits: Arc<dyn CreditLedger>,
    pub usage: Arc<dyn UsageLog>,
    pub billing: Arc<dyn BillingLedger>,
    pub storage: Arc<dyn ObjectStore>,
    pub remover: Arc<dyn BackgroundRemover>,
    pub fetcher: Arc<dyn UrlFetcher>,
    pub paddle: PaddleClient,
    /// Present only with the MongoDB backend; drives the readiness probe.
    pub mongo: Option<MongoDb>,
}

impl AppState {
    pub fn processor(&self) -> Processor {
        Processor::new(
            Arc::clone(&self.credits),
            Arc::clone(&self.usage),
            Arc::clone(&self.storage),
            Arc::clone(&self.remover),
            Arc::clone(&self.fetcher),
        )
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .route("/api/models/bg-remover", post(handlers::bg_remover::process))
        .route("/api/models/bg-remover/logs", get(handlers::bg_remover::logs))
        .route("/api/credits", get(handlers::credits::get_credits))
        .route("/api/payment", post(handlers::payment::create_payment))
        .route("/api/transactions", get(handlers::transactions::list_transactions))
        .route(
            "/api/transactions/:transaction_id",
            get(handlers::transactions::get_transaction),
        )
        .route("/api/webhook/paddle", post(handlers::webhook::paddle_webhook))
        .route("/api/cleanup", get(handlers::cleanup::cleanup))
        .route("/api/s3/signed-url", post(handlers::storage::signed_url))
        .route("/api/upload-urls", post(handlers::storage::upload_urls))
        .route("/api/download-zip", post(handlers::zip::download_zip))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct Application {
    port: u16,
    listener: tokio::net::TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: AppConfig) -> Result<Self, AppError> {
        let state = build_state(config).await?;
        let address = format!(
            "{}:{}",
            state.config.common.host, state.config.common.port
        );
        let listener = tokio::net::TcpListener::bind(&address).await?;
        let port = listener.local_addr()?.port();
        info!(address = %address, port = port, "Server listening");

        Ok(Self {
            port,
            listener,
            router: router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to install shutdown handler");
    }
    info!("Shutdown signal received");
}

async fn build_state(config: AppConfig) -> Result<AppState, AppError> {
    let config = Arc::new(config);

    let (users, credits, usage, billing, mongo): (
        Arc<dyn UserStore>,
        Arc<dyn CreditLedger>,
        Arc<dyn UsageLog>,
        Arc<dyn BillingLedger>,
        Option<MongoDb>,
    ) = match config.database_backend {
        DatabaseBackend::Mongo => {
            let db = MongoDb::connect(&config.mongo.uri, &config.mongo.database).await?;
            db.init_indexes().await?;
            (
                Arc::new(db.clone()),
                Arc::new(db.clone()),
                Arc::new(db.clone()),
                Arc::new(db.clone()),
                Some(db),
            )
        }
        DatabaseBackend::Memory => {
            info!("Using the in-memory database backend");
            let store = MemoryStore::new();
            (
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store),
                None,
            )
        }
    };

    let storage: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::Local => Arc::new(
            LocalStorage::new(
                &config.storage.local_path,
                config.storage.public_base_url.clone(),
                config.storage.signing_secret.clone(),
            )
            .await?,
        ),
        StorageBackend::S3 => {
            let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(config.storage.s3_region.clone()))
                .load()
                .await;
            let client = aws_sdk_s3::Client::new(&sdk_config);
            Arc::new(S3Storage::new(client, config.storage.s3_bucket.clone()))
        }
    };

    let (remover, fetcher): (Arc<dyn BackgroundRemover>, Arc<dyn UrlFetcher>) =
        match config.inference.provider {
            RemovalProvider::Api => (
                Arc::new(RemovalClient::new(
                    config.inference.api_url.clone(),
                    config.inference.api_key.clone(),
                )),
                Arc::new(HttpFetcher::new()),
            ),
            RemovalProvider::Mock => {
                info!("Using the mock inference provider");
                (
                    Arc::new(MockRemover),
                    Arc::new(StaticFetcher::new(PLACEHOLDER_PNG.to_vec())),
                )
            }
        };

    let paddle = PaddleClient::new(config.paddle.clone());

    Ok(AppState {
        config,
        users,
        credits,
        usage,
        billing,
        storage,
        remover,
        fetcher,
        paddle,
        mongo,
    })
}
