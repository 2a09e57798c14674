//! Service configuration, validated eagerly at startup.

use secrecy::Secret;
use service_core::config::{get_env, Config as CoreConfig};
use service_core::error::AppError;

/// Paid credit packs. Pack ids are the public API surface; price ids come
/// from the billing provider's catalog.
pub const PACK_STARTER: &str = "starter";
pub const PACK_PRO: &str = "pro";
pub const PACK_STUDIO: &str = "studio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalProvider {
    Api,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddleEnvironment {
    Sandbox,
    Production,
}

#[derive(Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: String,
    pub public_base_url: String,
    pub signing_secret: Secret<String>,
    pub s3_bucket: String,
    pub s3_region: String,
}

#[derive(Clone)]
pub struct InferenceConfig {
    pub provider: RemovalProvider,
    pub api_url: String,
    pub api_key: Secret<String>,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
}

#[derive(Clone)]
pub struct PaddleConfig {
    pub api_key: Secret<String>,
    pub environment: PaddleEnvironment,
    pub webhook_secret: Secret<String>,
    /// Custom-data tag distinguishing this product's events on a shared
    /// webhook endpoint.
    pub platform_tag: String,
    pub price_id_starter: String,
    pub price_id_pro: String,
    pub price_id_studio: String,
}

impl PaddleConfig {
    /// Resolve a public pack id to its catalog price id.
    pub fn price_for_pack(&self, pack_id: &str) -> Option<&str> {
        match pack_id {
            PACK_STARTER => Some(self.price_id_starter.as_str()),
            PACK_PRO => Some(self.price_id_pro.as_str()),
            PACK_STUDIO => Some(self.price_id_studio.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub common: CoreConfig,
    pub database_backend: DatabaseBackend,
    pub mongo: MongoConfig,
    pub storage: StorageConfig,
    pub inference: InferenceConfig,
    pub auth: AuthConfig,
    pub paddle: PaddleConfig,
    pub cron_secret: Secret<String>,
    pub retention_hours: i64,
}

impl AppConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = CoreConfig::load()?;
        let is_prod = common.environment.is_prod();

        let database_backend = match get_env("DATABASE_BACKEND", Some("mongo"), false)?
            .to_lowercase()
            .as_str()
        {
            "memory" => DatabaseBackend::Memory,
            "mongo" | "mongodb" => DatabaseBackend::Mongo,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown DATABASE_BACKEND: {}",
                    other
                )))
            }
        };

        let storage_backend = match get_env("STORAGE_BACKEND", Some("local"), false)?
            .to_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3,
            "local" => StorageBackend::Local,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown STORAGE_BACKEND: {}",
                    other
                )))
            }
        };

        let removal_provider = match get_env("REMOVAL_PROVIDER", Some("api"), false)?
            .to_lowercase()
            .as_str()
        {
            "mock" => RemovalProvider::Mock,
            "api" => RemovalProvider::Api,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown REMOVAL_PROVIDER: {}",
                    other
                )))
            }
        };

        let paddle_environment = match get_env("PADDLE_ENVIRONMENT", Some("sandbox"), false)?
            .to_lowercase()
            .as_str()
        {
            "production" => PaddleEnvironment::Production,
            _ => PaddleEnvironment::Sandbox,
        };

        let retention_hours: i64 = get_env("RETENTION_HOURS", Some("24"), false)?
            .parse()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid RETENTION_HOURS: {}", e))
            })?;
        if retention_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RETENTION_HOURS must be positive"
            )));
        }

        Ok(AppConfig {
            database_backend,
            mongo: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("bg_eraser"), is_prod)?,
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_path: get_env("STORAGE_LOCAL_PATH", Some("./storage"), false)?,
                public_base_url: get_env(
                    "PUBLIC_SITE_URL",
                    Some("http://localhost:8080"),
                    is_prod,
                )?,
                signing_secret: Secret::new(get_env(
                    "STORAGE_SIGNING_SECRET",
                    Some("dev-storage-secret"),
                    is_prod,
                )?),
                s3_bucket: get_env(
                    "STORAGE_S3_BUCKET",
                    Some(""),
                    is_prod && storage_backend == StorageBackend::S3,
                )?,
                s3_region: get_env("STORAGE_S3_REGION", Some("us-east-1"), false)?,
            },
            inference: InferenceConfig {
                provider: removal_provider,
                api_url: get_env(
                    "REMOVAL_API_URL",
                    Some(""),
                    is_prod && removal_provider == RemovalProvider::Api,
                )?,
                api_key: Secret::new(get_env(
                    "REMOVAL_API_KEY",
                    Some(""),
                    is_prod && removal_provider == RemovalProvider::Api,
                )?),
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(get_env(
                    "AUTH_JWT_SECRET",
                    Some("dev-jwt-secret"),
                    is_prod,
                )?),
            },
            paddle: PaddleConfig {
                api_key: Secret::new(get_env("PADDLE_API_KEY", Some(""), is_prod)?),
                environment: paddle_environment,
                webhook_secret: Secret::new(get_env(
                    "PADDLE_WEBHOOK_SECRET",
                    Some(""),
                    is_prod,
                )?),
                platform_tag: get_env("PADDLE_PLATFORM_TAG", Some("bg-eraser"), false)?,
                price_id_starter: get_env("PADDLE_PRICE_ID_STARTER", Some(""), is_prod)?,
                price_id_pro: get_env("PADDLE_PRICE_ID_PRO", Some(""), is_prod)?,
                price_id_studio: get_env("PADDLE_PRICE_ID_STUDIO", Some(""), is_prod)?,
            },
            cron_secret: Secret::new(get_env("CRON_SECRET", Some("dev-cron-secret"), is_prod)?),
            retention_hours,
            common,
        })
    }
}
