//! Shared test harness: an app wired to in-memory backends, driven through
//! the router without a network listener.

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use eraser_service::config::{
    AppConfig, AuthConfig, DatabaseBackend, InferenceConfig, MongoConfig, PaddleConfig,
    PaddleEnvironment, RemovalProvider, StorageBackend, StorageConfig,
};
use eraser_service::models::User;
use eraser_service::services::fetcher::{StaticFetcher, UrlFetcher};
use eraser_service::services::inference::MockRemover;
use eraser_service::services::memory::MemoryStore;
use eraser_service::services::paddle::PaddleClient;
use eraser_service::services::storage::LocalStorage;
use eraser_service::services::users::UserStore;
use eraser_service::startup::{router, AppState};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use secrecy::Secret;
use serde::Serialize;
use serde_json::Value;
use service_core::config::{Config as CoreConfig, Environment};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const CRON_SECRET: &str = "test-cron-secret";
pub const PROCESSED_BYTES: &[u8] = b"processed-image-bytes";

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub storage: Arc<LocalStorage>,
    storage_dir: String,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.storage_dir);
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: Environment::Dev,
            log_level: "warn".to_string(),
        },
        database_backend: DatabaseBackend::Memory,
        mongo: MongoConfig {
            uri: String::new(),
            database: String::new(),
        },
        storage: StorageConfig {
            backend: StorageBackend::Local,
            local_path: String::new(),
            public_base_url: "http://localhost:8080".to_string(),
            signing_secret: Secret::new("test-storage-secret".to_string()),
            s3_bucket: String::new(),
            s3_region: "us-east-1".to_string(),
        },
        inference: InferenceConfig {
            provider: RemovalProvider::Mock,
            api_url: String::new(),
            api_key: Secret::new(String::new()),
        },
        auth: AuthConfig {
            jwt_secret: Secret::new(JWT_SECRET.to_string()),
        },
        paddle: PaddleConfig {
            api_key: Secret::new(String::new()),
            environment: PaddleEnvironment::Sandbox,
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            platform_tag: "bg-eraser".to_string(),
            price_id_starter: "pri_starter".to_string(),
            price_id_pro: "pri_pro".to_string(),
            price_id_studio: "pri_studio".to_string(),
        },
        cron_secret: Secret::new(CRON_SECRET.to_string()),
        retention_hours: 24,
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_fetcher(Arc::new(StaticFetcher::new(PROCESSED_BYTES.to_vec()))).await
    }

    pub async fn spawn_with_fetcher(fetcher: Arc<dyn UrlFetcher>) -> Self {
        let config = Arc::new(test_config());
        let store = MemoryStore::new();
        let storage_dir = format!("target/test-app-{}", Uuid::new_v4());
        let storage = Arc::new(
            LocalStorage::new(
                &storage_dir,
                config.storage.public_base_url.clone(),
                config.storage.signing_secret.clone(),
            )
            .await
            .expect("local storage"),
        );

        let state = AppState {
            config: Arc::clone(&config),
            users: Arc::new(store.clone()),
            credits: Arc::new(store.clone()),
            usage: Arc::new(store.clone()),
            billing: Arc::new(store.clone()),
            storage: storage.clone(),
            remover: Arc::new(MockRemover),
            fetcher,
            paddle: PaddleClient::new(config.paddle.clone()),
            mongo: None,
        };

        Self {
            router: router(state),
            store,
            storage,
            storage_dir,
        }
    }

    pub async fn seed_user(&self, user_id: &str, credits: i64) {
        let mut user = User::new(
            user_id.to_string(),
            format!("{}@example.com", user_id),
            "Test User".to_string(),
        );
        user.credits = credits;
        UserStore::create(&self.store, user).await.expect("seed user");
    }

    pub async fn seed_customer(&self, user_id: &str, credits: i64, customer_id: &str) {
        self.seed_user(user_id, credits).await;
        self.store
            .set_customer_id(user_id, customer_id)
            .await
            .expect("seed customer");
    }

    pub fn token(&self, user_id: &str) -> String {
        #[derive(Serialize)]
        struct Claims {
            sub: String,
            email: String,
            exp: i64,
        }
        encode(
            &Header::default(),
            &Claims {
                sub: user_id.to_string(),
                email: format!("{}@example.com", user_id),
                exp: Utc::now().timestamp() + 3600,
            },
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("token")
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("request")
    }

    pub async fn get_json(&self, uri: &str, user_id: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user_id)))
            .body(Body::empty())
            .expect("request");
        let response = self.request(request).await;
        let status = response.status();
        (status, read_json(response).await)
    }

    pub async fn post_json(&self, uri: &str, user_id: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user_id)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = self.request(request).await;
        let status = response.status();
        (status, read_json(response).await)
    }
}

pub async fn read_body(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec()
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = read_body(response).await;
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json body")
}

/// Build a `multipart/form-data` body with one `image` field per entry.
pub fn multipart_body(images: &[(&str, &str, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "test-boundary-7MA4YWxkTrZu0gW";
    let mut body = Vec::new();
    for (filename, content_type, bytes) in images {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    (
        format!("multipart/form-data; boundary={}", boundary),
        body,
    )
}

/// A base64 data URI for an in-memory image.
pub fn data_uri(content_type: &str, bytes: &[u8]) -> String {
    use base64::Engine;
    format!(
        "data:{};base64,{}",
        content_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Sign a webhook body the way Paddle does.
pub fn paddle_signature(body: &str, ts: i64) -> String {
    let h1 = service_core::utils::signature::sign_payload(
        WEBHOOK_SECRET,
        &format!("{}:{}", ts, body),
    )
    .expect("signature");
    format!("ts={};h1={}", ts, h1)
}
