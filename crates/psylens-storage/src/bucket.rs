use aws_sdk_s3::Client;
use aws_sdk_s3::types::ServerSideEncryption;
use aws_smithy_types::byte_stream::ByteStream;
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::error::StorageError;

const JSON_CONTENT_TYPE: &str = "application/json";

/// JSON documents in one bucket, written with SSE-S3 encryption.
#[derive(Debug, Clone)]
pub struct JsonBucket {
    client: Client,
    bucket: String,
}

impl JsonBucket {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.bucket
    }

    /// Fetch and decode `key`. A missing key is `Ok(None)`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let err = e.into_service_error();
                if err.is_no_such_key() {
                    return Ok(None);
                }
                return Err(StorageError::Get {
                    key: key.to_string(),
                    message: err.to_string(),
                });
            }
        };

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Get {
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes();

        decode(key, &body).map(Some)
    }

    /// Encode `value` and write it to `key`, replacing any existing object.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let body = encode(key, value)?;
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(JSON_CONTENT_TYPE)
            .server_side_encryption(ServerSideEncryption::Aes256)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Put {
                key: key.to_string(),
                message: e.into_service_error().to_string(),
            })?;

        debug!(key, size, "stored document");
        Ok(())
    }

    /// Remove `key`. Deleting a missing key succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_string(),
                message: e.into_service_error().to_string(),
            })?;

        debug!(key, "deleted document");
        Ok(())
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec_pretty(value).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(key: &str, body: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(body).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })
}
