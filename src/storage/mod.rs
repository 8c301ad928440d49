//! Storage backend abstraction for uploaded images.
//!
//! Objects are content addressed: the key is the blake3 hex digest of the
//! bytes followed by an extension derived from the content type, so storing
//! the same image twice is a no-op.

pub mod local;

use actix_web::web::Bytes;
use async_trait::async_trait;
use futures::Stream;
use once_cell::sync::OnceCell;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed stream of bytes for streaming file content.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Content types accepted for avatars and listing photos, with their extensions.
pub const ALLOWED_IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
];

/// Represents a retrieved storage object with metadata.
pub struct StorageObject {
    /// Streaming body content
    pub body: ByteStream,
    /// Content length in bytes
    pub content_length: Option<i64>,
    /// MIME content type
    pub content_type: Option<String>,
    /// Entity tag for caching
    pub e_tag: Option<String>,
    /// Content range for partial responses
    pub content_range: Option<String>,
    /// Accept ranges header value
    pub accept_ranges: Option<String>,
    /// Last modified timestamp
    pub last_modified: Option<String>,
}

/// Storage operation errors.
#[derive(Debug)]
pub enum StorageError {
    /// File not found
    NotFound(String),
    /// I/O error
    Io(std::io::Error),
    /// Key is not a content hash with a known extension
    InvalidKey(String),
    /// Invalid range request
    InvalidRange(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::InvalidKey(key) => write!(f, "Invalid storage key: {}", key),
            StorageError::InvalidRange(msg) => write!(f, "Invalid range: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Trait for storage backends.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store an object under `key`.
    async fn put_object(&self, data: Vec<u8>, key: &str) -> Result<(), StorageError>;

    /// Retrieve an object.
    ///
    /// Optional `range` is a raw HTTP Range header value.
    async fn get_object(
        &self,
        key: &str,
        range: Option<String>,
    ) -> Result<StorageObject, StorageError>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

static STORAGE: OnceCell<Arc<dyn StorageBackend>> = OnceCell::new();

/// Install the local backend rooted at `storage.local_path`.
pub fn init_storage() -> Result<(), StorageError> {
    let path = crate::app_config::storage().local_path;
    let backend = local::LocalStorage::new(path.into())?;

    if STORAGE.set(Arc::new(backend)).is_err() {
        log::debug!("Storage backend already initialized.");
    }
    Ok(())
}

/// Install an arbitrary backend. Used by tests.
pub fn set_storage(backend: Arc<dyn StorageBackend>) {
    if STORAGE.set(backend).is_err() {
        log::debug!("Storage backend already initialized.");
    }
}

/// The installed backend, if any.
pub fn get_storage() -> Option<Arc<dyn StorageBackend>> {
    STORAGE.get().cloned()
}

/// Extension for an accepted image content type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    ALLOWED_IMAGE_TYPES
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
}

/// Content type for a key's extension.
pub fn content_type_for_key(key: &str) -> Option<&'static str> {
    let ext = key.rsplit_once('.')?.1;
    ALLOWED_IMAGE_TYPES
        .iter()
        .find(|(_, known)| known.eq_ignore_ascii_case(ext))
        .map(|(mime, _)| *mime)
}

/// Content-addressed key for `data`.
pub fn content_key(data: &[u8], extension: &str) -> String {
    format!("{}.{}", blake3::hash(data).to_hex(), extension)
}

/// A key is 64 lowercase hex characters, a dot, and a known extension.
pub fn is_valid_key(key: &str) -> bool {
    match key.split_once('.') {
        Some((hash, _)) => {
            hash.len() == 64
                && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
                && content_type_for_key(key).is_some()
        }
        None => false,
    }
}

/// Hash and store an uploaded image. Returns its key.
pub async fn store_image(data: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
    let extension = extension_for(content_type)
        .ok_or_else(|| StorageError::InvalidKey(content_type.to_owned()))?;
    let key = content_key(&data, extension);
    let backend = get_storage()
        .ok_or_else(|| StorageError::Io(std::io::Error::other("storage not initialized")))?;

    if !backend.exists(&key).await? {
        backend.put_object(data, &key).await?;
    }

    Ok(key)
}
