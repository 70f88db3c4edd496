use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::PathBuf;
use url::Url;

use super::{BlobStore, StorageError, build_public_url, validate_key};

/// Stores uploads on the local filesystem under a media root that the HTTP
/// server exposes at `/media/`.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base: Url,
}

impl LocalStorage {
    pub fn new(root: PathBuf, public_base: Url) -> Self {
        Self { root, public_base }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl BlobStore for LocalStorage {
    fn save<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        _mime_type: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        async move {
            let path = self.path_for(key)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, data).await?;
            log::debug!("Stored {} bytes at {}", data.len(), path.display());
            Ok(key.to_string())
        }
        .boxed()
    }

    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        async move {
            let path = self.path_for(key)?;
            Ok(tokio::fs::read(&path).await?)
        }
        .boxed()
    }

    fn public_url(&self, key: &str) -> String {
        build_public_url(&self.public_base, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &tempfile::TempDir) -> LocalStorage {
        LocalStorage::new(
            dir.path().to_path_buf(),
            Url::parse("http://localhost:8081/media/").unwrap(),
        )
    }

    #[actix_web::test]
    async fn saved_bytes_can_be_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);

        let key = storage
            .save("detection/user/abc.png", b"png-bytes", "image/png")
            .await
            .unwrap();
        assert_eq!(key, "detection/user/abc.png");
        assert!(dir.path().join("detection/user/abc.png").exists());
        assert_eq!(storage.read(&key).await.unwrap(), b"png-bytes");
        assert_eq!(
            storage.public_url(&key),
            "http://localhost:8081/media/detection/user/abc.png"
        );
    }

    #[actix_web::test]
    async fn escaping_keys_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        let result = storage.save("../outside.png", b"x", "image/png").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[actix_web::test]
    async fn missing_object_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        assert!(matches!(
            storage.read("detection/none.png").await,
            Err(StorageError::Io(_))
        ));
    }
}
