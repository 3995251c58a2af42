use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use serde::Serialize;
use std::future::Future;

/// Capability interface over the object store: uniform get/put of named blobs
/// within one bucket. Implementations perform no internal retries; retry
/// policy, where wanted, belongs at the call site.
pub trait ObjectStore: Send + Sync {
    /// Download a blob. Fails with `ObjectNotFound` when the backend reports 404.
    fn get(&self, key: &str) -> impl Future<Output = Result<Vec<u8>, StorageError>> + Send;

    /// Upload a blob with an explicit content type.
    fn put(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Upload raw bytes with the default binary content type.
    fn put_bytes(
        &self,
        key: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        self.put(key, data, "application/octet-stream")
    }

    /// Serialize a structured payload to JSON and upload it as `application/json`.
    fn put_json<T: Serialize + Sync + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> impl Future<Output = Result<(), StorageError>> + Send
    where
        Self: Sized,
    {
        async move {
            let data = serde_json::to_vec(value)?;
            self.put(key, &data, "application/json").await
        }
    }
}

/// Client for Huawei OBS object storage (S3-compatible).
pub struct ObsClient {
    bucket: Box<Bucket>,
}

impl ObsClient {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }
}

impl ObjectStore for ObsClient {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        match self.bucket.get_object(key).await {
            Ok(response) => match response.status_code() {
                200..=299 => Ok(response.to_vec()),
                404 => Err(StorageError::ObjectNotFound(key.to_string())),
                code => Err(StorageError::Status {
                    key: key.to_string(),
                    code,
                }),
            },
            Err(S3Error::HttpFailWithBody(404, _)) => {
                Err(StorageError::ObjectNotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Transport(e)),
        }
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::Transport)?;

        match response.status_code() {
            200..=299 => Ok(()),
            code => Err(StorageError::Status {
                key: key.to_string(),
                code,
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("object store returned status {code} for {key}")]
    Status { key: String, code: u16 },

    #[error("object store transport error: {0}")]
    Transport(#[from] S3Error),

    #[error("storage configuration error: {0}")]
    Config(String),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}
