pub mod local_service;
pub mod s3_service;

use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

pub use local_service::LocalStorage;
pub use s3_service::S3Service;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Invalid file format")]
    InvalidFormat,
    #[error("File too large")]
    FileTooLarge,
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Durable storage for uploaded images.
pub trait BlobStore: Send + Sync {
    /// Stores `data` under `key` and returns the key it can be read back with.
    fn save<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        mime_type: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>>;

    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>>;

    /// Absolute URL a client can fetch the object from.
    fn public_url(&self, key: &str) -> String;
}

pub fn calculate_image_hash(image_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_data);
    hex::encode(hasher.finalize())
}

pub fn generate_object_key(user_id: Uuid, image_hash: &str, file_extension: &str) -> String {
    format!("detection/{}/{}.{}", user_id, image_hash, file_extension)
}

pub fn extract_file_extension(mime_type: &str) -> Result<&'static str, StorageError> {
    match mime_type {
        "image/jpeg" => Ok("jpg"),
        "image/png" => Ok("png"),
        _ => Err(StorageError::InvalidFormat),
    }
}

pub fn validate_image_size(image_data: &[u8], max_size: usize) -> Result<(), StorageError> {
    if image_data.len() > max_size {
        return Err(StorageError::FileTooLarge);
    }
    Ok(())
}

/// Rejects keys that could escape the storage root.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Joins a percent-encoded object key onto a base URL.
pub fn build_public_url(base: &Url, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    match base.join(&encoded.join("/")) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}{}", base, encoded.join("/")),
    }
}
