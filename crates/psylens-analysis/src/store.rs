//! Result persistence.
//!
//! Results are write-once: a result is stored after its analysis succeeds
//! and never changes afterwards. `delete` exists only to withdraw results
//! whose task or composite did not finish successfully.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use psylens_core::models::result::AnalysisResult;
use psylens_core::s3_keys;
use psylens_storage::bucket::JsonBucket;

use crate::error::AnalysisError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where completed results live.
pub trait ResultStore: Send + Sync {
    fn put<'a>(&'a self, result: &'a AnalysisResult) -> BoxFuture<'a, Result<(), AnalysisError>>;

    fn get<'a>(&'a self, result_id: Uuid)
    -> BoxFuture<'a, Result<Option<AnalysisResult>, AnalysisError>>;

    /// Remove a result. Removing an unknown id succeeds.
    fn delete<'a>(&'a self, result_id: Uuid) -> BoxFuture<'a, Result<(), AnalysisError>>;
}

/// Process-local store, used when no bucket is configured and in tests.
#[derive(Default)]
pub struct InMemoryResultStore {
    results: RwLock<HashMap<Uuid, AnalysisResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }
}

impl ResultStore for InMemoryResultStore {
    fn put<'a>(&'a self, result: &'a AnalysisResult) -> BoxFuture<'a, Result<(), AnalysisError>> {
        Box::pin(async move {
            self.results
                .write()
                .await
                .insert(result.request_id, result.clone());
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        result_id: Uuid,
    ) -> BoxFuture<'a, Result<Option<AnalysisResult>, AnalysisError>> {
        Box::pin(async move { Ok(self.results.read().await.get(&result_id).cloned()) })
    }

    fn delete<'a>(&'a self, result_id: Uuid) -> BoxFuture<'a, Result<(), AnalysisError>> {
        Box::pin(async move {
            self.results.write().await.remove(&result_id);
            Ok(())
        })
    }
}

/// Results as SSE-encrypted JSON objects under `analysis/results/`.
pub struct S3ResultStore {
    bucket: JsonBucket,
}

impl S3ResultStore {
    pub fn new(bucket: JsonBucket) -> Self {
        Self { bucket }
    }
}

impl ResultStore for S3ResultStore {
    fn put<'a>(&'a self, result: &'a AnalysisResult) -> BoxFuture<'a, Result<(), AnalysisError>> {
        Box::pin(async move {
            let key = s3_keys::analysis_result(result.request_id);
            self.bucket.put(&key, result).await?;
            info!(result_id = %result.request_id, "stored analysis result");
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        result_id: Uuid,
    ) -> BoxFuture<'a, Result<Option<AnalysisResult>, AnalysisError>> {
        Box::pin(async move {
            let key = s3_keys::analysis_result(result_id);
            Ok(self.bucket.get(&key).await?)
        })
    }

    fn delete<'a>(&'a self, result_id: Uuid) -> BoxFuture<'a, Result<(), AnalysisError>> {
        Box::pin(async move {
            let key = s3_keys::analysis_result(result_id);
            self.bucket.delete(&key).await?;
            info!(%result_id, "withdrew analysis result");
            Ok(())
        })
    }
}
