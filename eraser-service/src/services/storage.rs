use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::utils::signature::sign_payload;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use uuid::Uuid;

/// Default lifetime of a read capability URL.
pub const DEFAULT_READ_EXPIRY_SECS: u64 = 3600;
/// Default lifetime of a direct-client upload capability URL.
pub const DEFAULT_UPLOAD_EXPIRY_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRole {
    Original,
    Processed,
}

impl ObjectRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectRole::Original => "original",
            ObjectRole::Processed => "processed",
        }
    }
}

/// Generate a storage key: `{folder}/{uuid}-{original|processed}.{ext}`.
pub fn object_key(folder: &str, role: ObjectRole, extension: &str) -> String {
    format!("{}/{}-{}.{}", folder, Uuid::new_v4(), role.as_str(), extension)
}

/// Keys that are already absolute URLs pass through signing unchanged.
pub fn is_absolute_url(key: &str) -> bool {
    key.starts_with("http://") || key.starts_with("https://")
}

/// Durable object storage plus time-limited capability URLs.
///
/// Single attempt everywhere; transport failures propagate to the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, AppError>;

    async fn delete(&self, key: &str) -> Result<(), AppError>;

    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    /// Mint a signed read URL for `key`.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, AppError>;

    /// Mint a signed upload URL for `key`.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, AppError>;
}

/// Filesystem-backed store for local development and tests. Capability URLs
/// are HMAC-signed against the configured secret rather than delegated to a
/// cloud provider.
pub struct LocalStorage {
    base_path: PathBuf,
    public_base_url: String,
    signing_secret: Secret<String>,
}

impl LocalStorage {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: String,
        signing_secret: Secret<String>,
    ) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signing_secret,
        })
    }

    fn signed_url(&self, verb: &str, key: &str, expires_in: Duration) -> Result<String, AppError> {
        let expires = Utc::now().timestamp() + expires_in.as_secs() as i64;
        let payload = format!("{}|{}|{}", verb, key, expires);
        let signature = sign_payload(self.signing_secret.expose_secret(), &payload)
            .map_err(AppError::InternalError)?;
        Ok(format!(
            "{}/storage/{}?expires={}&signature={}",
            self.public_base_url, key, expires, signature
        ))
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<(), AppError> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.base_path.join(key);
        let data = fs::read(path).await?;
        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.base_path.join(key);
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.base_path.join(key).exists())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, AppError> {
        self.signed_url("GET", key, expires_in)
    }

    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        expires_in: Duration,
    ) -> Result<String, AppError> {
        self.signed_url("PUT", key, expires_in)
    }
}

/// S3-backed store; capability URLs are SDK-presigned requests.
pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    fn presigning_config(expires_in: Duration) -> Result<PresigningConfig, AppError> {
        PresigningConfig::expires_in(expires_in)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid presign expiry: {}", e)))
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 upload failed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 download failed: {}", e)))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("S3 body collection failed: {}", e))
            })?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 delete failed: {}", e)))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::InternalError(anyhow::anyhow!(
                        "S3 head failed: {}",
                        service_err
                    )))
                }
            }
        }
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, AppError> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning_config(expires_in)?)
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 presign failed: {}", e)))?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, AppError> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(Self::presigning_config(expires_in)?)
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 presign failed: {}", e)))?;
        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_carry_folder_role_and_extension() {
        let key = object_key("uploads", ObjectRole::Original, "png");
        assert!(key.starts_with("uploads/"));
        assert!(key.ends_with("-original.png"));

        let key = object_key("uploads", ObjectRole::Processed, "webp");
        assert!(key.ends_with("-processed.webp"));
    }

    #[test]
    fn absolute_urls_are_detected() {
        assert!(is_absolute_url("https://cdn.example.com/a.png"));
        assert!(is_absolute_url("http://cdn.example.com/a.png"));
        assert!(!is_absolute_url("uploads/a.png"));
        assert!(!is_absolute_url("httpuploads/a.png"));
    }

    #[tokio::test]
    async fn local_storage_round_trip_preserves_bytes() {
        let dir = format!("target/test-storage-{}", Uuid::new_v4());
        let storage = LocalStorage::new(
            &dir,
            "http://localhost:8080".to_string(),
            Secret::new("test-secret".to_string()),
        )
        .await
        .unwrap();

        let bytes: Vec<u8> = (0..=255).collect();
        let key = object_key("uploads", ObjectRole::Original, "png");
        storage.put(&key, bytes.clone(), "image/png").await.unwrap();

        assert!(storage.exists(&key).await.unwrap());
        assert_eq!(storage.get(&key).await.unwrap(), bytes);

        storage.delete(&key).await.unwrap();
        assert!(!storage.exists(&key).await.unwrap());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn local_presigned_urls_embed_expiry_and_signature() {
        let dir = format!("target/test-storage-{}", Uuid::new_v4());
        let storage = LocalStorage::new(
            &dir,
            "http://localhost:8080/".to_string(),
            Secret::new("test-secret".to_string()),
        )
        .await
        .unwrap();

        let url = storage
            .presign_get("uploads/a.png", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:8080/storage/uploads/a.png?expires="));
        assert!(url.contains("&signature="));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
