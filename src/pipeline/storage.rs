//! Object storage collaborator: bytes + file name → durable public URL.
//!
//! Every object gets a collision-resistant key `{8 hex chars}-{file name}`,
//! so two documents both containing `page_1_img_0.png` never overwrite each
//! other. Key and URL are assigned by [`ObjectStore::locate`] *before* any
//! I/O, which lets the orchestrator hand out the URL of a detached upload
//! immediately.
//!
//! Two backends:
//!
//! * [`S3Store`]: Amazon S3 or an S3-compatible service. Objects are stored
//!   with a guessed MIME type and an `inline` content disposition so browsers
//!   display rather than download them.
//! * [`LocalStore`]: a directory on disk (default `uploads/`), optionally
//!   served under a public base URL.

use crate::config::StorageSettings;
use crate::error::{BlueprintError, StorageError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{config::Region, primitives::ByteStream, Client};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Where an object will live once uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    /// Original (sanitised) file name.
    pub file_name: String,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Assign a unique key and public URL for `file_name`. No I/O.
    fn locate(&self, file_name: &str) -> StoredObject;

    /// Write `bytes` under `object.key`.
    async fn put(&self, object: &StoredObject, bytes: Vec<u8>) -> Result<(), StorageError>;
}

/// Upload and return the object's URL once the write is confirmed.
pub async fn upload(store: &dyn ObjectStore, file_name: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
    let object = store.locate(file_name);
    store.put(&object, bytes).await?;
    debug!("uploaded {} ({})", object.key, object.content_type);
    Ok(object.url)
}

/// `{8 hex chars}-{file name}`, with any directory part of the name dropped.
pub fn unique_key(file_name: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", &id[..8], sanitize_file_name(file_name))
}

fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name).trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload.bin".to_string()
    } else {
        base.to_string()
    }
}

fn guess_content_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn object_for(file_name: &str, url_of: impl FnOnce(&str) -> String) -> StoredObject {
    let key = unique_key(file_name);
    StoredObject {
        url: url_of(&key),
        file_name: sanitize_file_name(file_name),
        content_type: guess_content_type(file_name),
        key,
    }
}

/// Build the store selected by `settings`.
pub async fn from_settings(settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, BlueprintError> {
    match settings {
        StorageSettings::Local { dir, public_base_url } => {
            Ok(Arc::new(LocalStore::new(dir.clone(), public_base_url.clone())))
        }
        StorageSettings::S3 {
            bucket,
            region,
            endpoint,
        } => Ok(Arc::new(
            S3Store::new(bucket, region.as_deref(), endpoint.as_deref()).await?,
        )),
    }
}

// ── S3 ──────────────────────────────────────────────────────────────────

/// S3-compatible storage. Credentials come from the standard AWS chain
/// (`AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY`, profile, instance role).
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    endpoint: Option<String>,
}

impl S3Store {
    pub async fn new(bucket: &str, region: Option<&str>, endpoint: Option<&str>) -> Result<Self, BlueprintError> {
        if bucket.trim().is_empty() {
            return Err(BlueprintError::StorageNotConfigured("S3 bucket name is empty".into()));
        }

        let region = region
            .map(str::to_string)
            .or_else(|| std::env::var("AWS_REGION").ok())
            .unwrap_or_else(|| "us-east-1".to_string());
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        if sdk_config.credentials_provider().is_none() {
            return Err(BlueprintError::StorageNotConfigured(
                "no AWS credentials found (set AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY)".into(),
            ));
        }

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint {
            // Required for MinIO and other S3-compatible services.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        info!("S3 storage: bucket {} in {}", bucket, region);

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    fn public_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, key),
            None => format!("https://{}.s3.amazonaws.com/{}", self.bucket, key),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn locate(&self, file_name: &str) -> StoredObject {
        object_for(file_name, |key| self.public_url(key))
    }

    async fn put(&self, object: &StoredObject, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object.key)
            .body(ByteStream::from(bytes))
            .content_type(&object.content_type)
            .content_disposition(format!("inline; filename=\"{}\"", object.file_name))
            .send()
            .await
            .map_err(|e| StorageError::Sdk(format!("Failed to put object {}: {}", object.key, e)))?;
        Ok(())
    }
}

// ── Local directory ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
    public_base_url: Option<String>,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn locate(&self, file_name: &str) -> StoredObject {
        object_for(file_name, |key| match &self.public_base_url {
            Some(base) => format!("{}/{}", base, key),
            None => self.dir.join(key).display().to_string(),
        })
    }

    async fn put(&self, object: &StoredObject, bytes: Vec<u8>) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&object.key), bytes).await?;
        Ok(())
    }
}
