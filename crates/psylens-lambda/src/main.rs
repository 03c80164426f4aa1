use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use psylens_analysis::orchestrator::{Orchestrator, OrchestratorConfig};
use psylens_analysis::pipeline::AnalysisPipeline;
use psylens_analysis::registry::AnalysisRegistry;
use psylens_analysis::store::{InMemoryResultStore, ResultStore, S3ResultStore};
use psylens_bedrock::adapter::InferenceAdapter;
use psylens_bedrock::model::BedrockTextModel;
use psylens_core::models::phi::DetectorId;
use psylens_phi::comprehend::ComprehendMedicalDetector;
use psylens_phi::detector::{DetectionPolicy, PhiDetector};
use psylens_phi::patterns::PatternDetector;
use psylens_phi::scrubber::PhiScrubber;
use psylens_storage::bucket::JsonBucket;

mod config;
mod error;
mod middleware;
mod routes;
mod state;

use config::{AppConfig, NerMode};
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Structured JSON logging for CloudWatch
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let config = AppConfig::from_env()?;
    let sdk_config = load_aws_config(&config).await;
    let orchestrator = build_orchestrator(&config, &sdk_config)?;
    // Lambda freezes the process between invocations, so queued work would
    // stall there; async submissions are refused instead.
    let workers = if config.lambda_runtime {
        Vec::new()
    } else {
        orchestrator.start()
    };

    let state = AppState {
        orchestrator: orchestrator.clone(),
        config: Arc::new(config.clone()),
    };
    let app = routes::router(state);

    if config.lambda_runtime {
        lambda_http::run(app).await.map_err(|e| eyre::eyre!(e))?;
    } else {
        let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
        info!(addr = %config.bind_addr, "listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    orchestrator.shutdown();
    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}

async fn load_aws_config(config: &AppConfig) -> aws_config::SdkConfig {
    let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &config.region {
        builder = builder.region(aws_config::Region::new(region.clone()));
    }
    builder.load().await
}

fn build_orchestrator(
    config: &AppConfig,
    sdk_config: &aws_config::SdkConfig,
) -> eyre::Result<Orchestrator> {
    let mut detectors: Vec<Arc<dyn PhiDetector>> = vec![Arc::new(PatternDetector::new()?)];
    let mut policy = DetectionPolicy::default();
    let ner = || {
        Arc::new(
            ComprehendMedicalDetector::new(sdk_config, config.detector_timeout)
                .with_min_score(config.ner_min_score),
        )
    };
    match config.ner_mode {
        NerMode::Off => warn!("clinical NER disabled; PHI detection uses patterns only"),
        NerMode::Optional => detectors.push(ner()),
        NerMode::Required => {
            detectors.push(ner());
            policy = DetectionPolicy::requiring(DetectorId::ClinicalNer);
        }
    }
    let policy = policy.with_timeout(config.detector_timeout);
    let scrubber = PhiScrubber::new(detectors)
        .with_policy(policy)
        .with_mode(config.mask_mode);

    let model = Arc::new(BedrockTextModel::new(sdk_config, &config.model_id));
    let adapter = InferenceAdapter::new(model)
        .with_timeout(config.inference_timeout)
        .with_max_concurrency(config.max_concurrency);

    let registry = Arc::new(AnalysisRegistry::standard()?);
    let pipeline = AnalysisPipeline::new(scrubber, registry, adapter);

    let results: Arc<dyn ResultStore> = match &config.bucket {
        Some(bucket) => {
            info!(bucket = %bucket, "storing results in S3");
            Arc::new(S3ResultStore::new(JsonBucket::new(
                aws_sdk_s3::Client::new(sdk_config),
                bucket,
            )))
        }
        None => {
            warn!("PSYLENS_BUCKET not set; results are kept in memory only");
            Arc::new(InMemoryResultStore::new())
        }
    };

    let orchestrator_config = OrchestratorConfig {
        workers: config.max_concurrency,
        queue_capacity: config.queue_capacity,
        expected_task_duration: config.expected_task_duration,
        task_retention: config.task_retention,
        background: !config.lambda_runtime,
        ..OrchestratorConfig::default()
    };

    info!(
        model_id = %config.model_id,
        ner_mode = ?config.ner_mode,
        workers = config.max_concurrency,
        lambda_runtime = config.lambda_runtime,
        "analysis pipeline ready"
    );
    Ok(Orchestrator::new(pipeline, results, orchestrator_config))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
