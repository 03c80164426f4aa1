use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not encode or decode {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("S3 GetObject failed for {key}: {message}")]
    Get { key: String, message: String },

    #[error("S3 PutObject failed for {key}: {message}")]
    Put { key: String, message: String },

    #[error("S3 DeleteObject failed for {key}: {message}")]
    Delete { key: String, message: String },
}
