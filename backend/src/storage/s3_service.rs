use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use futures::FutureExt;
use futures::future::BoxFuture;
use url::Url;

use super::{BlobStore, StorageError, build_public_url, validate_key};

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
    public_base: Url,
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String, public_base: Url) -> Self {
        Self {
            client,
            bucket_name,
            public_base,
        }
    }

    pub async fn upload_image(
        &self,
        image_data: &[u8],
        s3_key: &str,
        mime_type: &str,
    ) -> Result<(), StorageError> {
        validate_key(s3_key)?;
        let body = ByteStream::from(image_data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .body(body)
            .content_type(mime_type)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        log::debug!("Uploaded {} to bucket {}", s3_key, self.bucket_name);
        Ok(())
    }

    pub async fn get_image(&self, s3_key: &str) -> Result<Vec<u8>, StorageError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }
}

impl BlobStore for S3Service {
    fn save<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        mime_type: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        async move {
            self.upload_image(data, key, mime_type).await?;
            Ok(key.to_string())
        }
        .boxed()
    }

    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        self.get_image(key).boxed()
    }

    fn public_url(&self, key: &str) -> String {
        build_public_url(&self.public_base, key)
    }
}
