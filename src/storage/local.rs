//! Local filesystem storage backend.

use super::{ByteStream, StorageBackend, StorageError, StorageObject};
use actix_web::web::{self, Bytes};
use async_trait::async_trait;
use futures::stream;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Local filesystem storage backend.
pub struct LocalStorage {
    /// Base path for file storage
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend.
    ///
    /// The `base_path` directory will be created if it doesn't exist.
    pub fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)?;
        log::info!("LocalStorage initialized at {:?}", base_path);
        Ok(Self { base_path })
    }

    /// Objects are sharded by the first four hex characters: `ab/cd/abcd....png`.
    fn get_file_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if !super::is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.base_path.join(&key[0..2]).join(&key[2..4]).join(key))
    }

    /// Parse an HTTP Range header of the form `bytes=0-499`, `bytes=500-` or `bytes=-500`.
    fn parse_range(range: &str, file_size: u64) -> Result<(u64, u64), StorageError> {
        let range = range
            .strip_prefix("bytes=")
            .ok_or_else(|| StorageError::InvalidRange("Invalid range format".into()))?;

        let (first, last) = range
            .split_once('-')
            .ok_or_else(|| StorageError::InvalidRange("Invalid range format".into()))?;

        if file_size == 0 {
            return Err(StorageError::InvalidRange("Range not satisfiable".into()));
        }

        let parse = |s: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|_| StorageError::InvalidRange("Invalid range number".into()))
        };

        let start = if first.is_empty() {
            file_size.saturating_sub(parse(last)?)
        } else {
            parse(first)?
        };

        let end = if first.is_empty() || last.is_empty() {
            file_size - 1
        } else {
            parse(last)?
        };

        if start > end || start >= file_size {
            return Err(StorageError::InvalidRange("Range not satisfiable".into()));
        }

        Ok((start, end.min(file_size - 1)))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn put_object(&self, data: Vec<u8>, key: &str) -> Result<(), StorageError> {
        let path = self.get_file_path(key)?;
        log::debug!("LocalStorage: put_object: {:?}", path);

        web::block(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, data)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        Ok(())
    }

    async fn get_object(
        &self,
        key: &str,
        range: Option<String>,
    ) -> Result<StorageObject, StorageError> {
        let path = self.get_file_path(key)?;
        log::debug!("LocalStorage: get_object: {:?}", path);

        let (buffer, metadata, content_range) = web::block(
            move || -> Result<(Vec<u8>, fs::Metadata, Option<String>), StorageError> {
                let metadata = fs::metadata(&path)?;
                let file_size = metadata.len();

                let (start, len, content_range) = match range {
                    Some(ref header) => {
                        let (start, end) = LocalStorage::parse_range(header, file_size)?;
                        (
                            start,
                            end - start + 1,
                            Some(format!("bytes {}-{}/{}", start, end, file_size)),
                        )
                    }
                    None => (0, file_size, None),
                };

                let mut file = fs::File::open(&path)?;
                if start > 0 {
                    file.seek(SeekFrom::Start(start))?;
                }

                let mut buffer = vec![0u8; len as usize];
                file.read_exact(&mut buffer)?;

                Ok((buffer, metadata, content_range))
            },
        )
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        let content_length = buffer.len() as i64;

        let modified = metadata.modified().ok();
        let e_tag = Some(format!("\"{}\"", &key[..16]));
        let last_modified = modified.map(|t: std::time::SystemTime| {
            let datetime: chrono::DateTime<chrono::Utc> = t.into();
            datetime.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
        });

        let body: ByteStream = Box::pin(stream::once(async move { Ok(Bytes::from(buffer)) }));

        Ok(StorageObject {
            body,
            content_length: Some(content_length),
            content_type: super::content_type_for_key(key).map(str::to_owned),
            e_tag,
            content_range,
            accept_ranges: Some("bytes".to_string()),
            last_modified,
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get_file_path(key)?.exists())
    }
}
