use async_trait::async_trait;
use log::{error, info, warn};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AppConfig, S3Config};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not_found")]
    NotFound,
    #[error("invalid path")]
    InvalidPath,
    #[error("other: {0}")]
    Other(String),
}

pub const AVATAR_SIZE_LIMIT: usize = 5 * 1024 * 1024; // 5 MB

pub const ALLOWED_AVATAR_MIME: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Profile image blobs, addressed by a relative path such as `avatars/{user}-{millis}.png`.
#[async_trait]
pub trait AvatarStore: Send + Sync {
    async fn upload(&self, path: &str, mime: &str, bytes: &[u8]) -> Result<(), StorageError>;
    async fn load(&self, path: &str) -> Result<(Vec<u8>, String), StorageError>;
    async fn remove(&self, path: &str) -> Result<(), StorageError>;
    fn public_url(&self, path: &str) -> String;
}

pub fn avatar_path(user_id: &str, unix_millis: i64, ext: &str) -> String {
    format!("avatars/{user_id}-{unix_millis}.{ext}")
}

/// Storage path of a previously issued public URL: `avatars/` + last segment.
pub fn path_from_url(url: &str) -> Option<String> {
    let file = url.split(['?', '#']).next()?.rsplit('/').next()?;
    if file.is_empty() || file == ".." || file == "." {
        return None;
    }
    Some(format!("avatars/{file}"))
}

fn sniff(bytes: &[u8]) -> String {
    infer::get(bytes).map(|t| t.mime_type().to_string()).unwrap_or_else(|| "application/octet-stream".into())
}

/// Relative, no `..`, no root.
fn checked(path: &str) -> Result<&Path, StorageError> {
    let p = Path::new(path);
    if path.is_empty() || !p.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(StorageError::InvalidPath);
    }
    Ok(p)
}

// ---------------- Filesystem implementation (default) ----------------
pub struct FsAvatarStore {
    root: PathBuf,
    base_url: String,
}

impl FsAvatarStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self { root: root.into(), base_url: base_url.into().trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl AvatarStore for FsAvatarStore {
    async fn upload(&self, path: &str, _mime: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let full = self.root.join(checked(path)?);
        if let Some(dir) = full.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| StorageError::Other(e.to_string()))?;
        }
        tokio::fs::write(&full, bytes).await.map_err(|e| {
            error!("avatar write failed path={} err={e}", full.display());
            StorageError::Other(e.to_string())
        })
    }

    async fn load(&self, path: &str) -> Result<(Vec<u8>, String), StorageError> {
        let full = self.root.join(checked(path)?);
        match tokio::fs::read(&full).await {
            Ok(bytes) => {
                let mime = sniff(&bytes);
                Ok((bytes, mime))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let full = self.root.join(checked(path)?);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            // already gone
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

// ---------------- S3 Implementation (MinIO compatible) ----------------
pub struct S3AvatarStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    base_url: String,
}

impl S3AvatarStore {
    pub async fn new(cfg: &S3Config, base_url: &str) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(cfg.region.clone()))
            .endpoint_url(&cfg.endpoint);
        if !cfg.access_key.is_empty() && !cfg.secret_key.is_empty() {
            let creds = Credentials::new(&cfg.access_key, &cfg.secret_key, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Force path-style addressing (required for most MinIO/local endpoints without wildcard DNS)
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf).force_path_style(true).build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3/MinIO client (path-style addressing enabled)");

        let bucket = cfg.bucket.clone();
        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let max_attempts = 8u32;
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) if attempt >= max_attempts => {
                        error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                        return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                    }
                    Err(e2) => {
                        let backoff_ms = 200 * attempt.pow(2);
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                    }
                }
            }
        }

        Ok(Self { bucket, client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl AvatarStore for S3AvatarStore {
    async fn upload(&self, path: &str, mime: &str, bytes: &[u8]) -> Result<(), StorageError> {
        use aws_sdk_s3::primitives::ByteStream;
        checked(path)?;
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(mime);
        if let Err(e) = put.send().await {
            error!("put_object failed key={path} bucket={} err={e:?}", self.bucket);
            let hint = if e.to_string().contains("AccessDenied") {
                " (check S3_ACCESS_KEY/S3_SECRET_KEY permissions)"
            } else {
                ""
            };
            return Err(StorageError::Other(format!("{e}{hint}")));
        }
        Ok(())
    }

    async fn load(&self, path: &str) -> Result<(Vec<u8>, String), StorageError> {
        checked(path)?;
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|_| StorageError::NotFound)?;
        let data = obj.body.collect().await.map_err(|e| StorageError::Other(e.to_string()))?;
        let bytes = data.into_bytes().to_vec();
        let mime = sniff(&bytes);
        Ok((bytes, mime))
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        checked(path)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

/// S3 when configured, otherwise files under `DATA_DIR/media`.
pub async fn build_avatar_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn AvatarStore>> {
    match &cfg.s3 {
        Some(s3) => Ok(Arc::new(S3AvatarStore::new(s3, &cfg.media_base_url).await?)),
        None => {
            let root = cfg.data_dir.join("media");
            info!("Using filesystem avatar store at {}", root.display());
            Ok(Arc::new(FsAvatarStore::new(root, cfg.media_base_url.clone())))
        }
    }
}

/// Sniffed MIME type and file extension, if the bytes are an accepted avatar image.
pub fn accepted_avatar(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    let kind = infer::get(bytes)?;
    ALLOWED_AVATAR_MIME.contains(&kind.mime_type()).then(|| (kind.mime_type(), kind.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn generated_paths_and_url_round_trip() {
        let path = avatar_path("u-1", 1_700_000_000_000, "png");
        assert_eq!(path, "avatars/u-1-1700000000000.png");
        let url = format!("/media/{path}");
        assert_eq!(path_from_url(&url).as_deref(), Some(path.as_str()));
        assert_eq!(path_from_url("https://cdn.example/x/avatars/a.png?v=2").as_deref(), Some("avatars/a.png"));
        assert_eq!(path_from_url("https://cdn.example/"), None);
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(checked("avatars/a.png").is_ok());
        assert!(matches!(checked("../etc/passwd"), Err(StorageError::InvalidPath)));
        assert!(matches!(checked("/etc/passwd"), Err(StorageError::InvalidPath)));
        assert!(matches!(checked(""), Err(StorageError::InvalidPath)));
    }

    #[test]
    fn only_images_are_accepted() {
        assert_eq!(accepted_avatar(PNG), Some(("image/png", "png")));
        assert_eq!(accepted_avatar(b"%PDF-1.4 hello"), None);
        assert_eq!(accepted_avatar(b"plain text"), None);
    }

    #[tokio::test]
    async fn fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAvatarStore::new(dir.path(), "/media/");
        store.upload("avatars/u-1.png", "image/png", PNG).await.unwrap();
        let (bytes, mime) = store.load("avatars/u-1.png").await.unwrap();
        assert_eq!(bytes, PNG);
        assert_eq!(mime, "image/png");
        assert_eq!(store.public_url("avatars/u-1.png"), "/media/avatars/u-1.png");
        store.remove("avatars/u-1.png").await.unwrap();
        assert!(matches!(store.load("avatars/u-1.png").await, Err(StorageError::NotFound)));
        store.remove("avatars/u-1.png").await.unwrap();
    }
}
