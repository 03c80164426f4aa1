use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use eyre::{WrapErr, eyre};

use psylens_core::models::phi::MaskMode;

const DEFAULT_MODEL_ID: &str = "us.anthropic.claude-sonnet-4-20250514-v1:0";

/// How the clinical NER detector participates in PHI detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NerMode {
    /// Regex patterns only.
    Off,
    /// NER runs alongside patterns; its failure degrades to patterns only.
    Optional,
    /// NER must succeed or the analysis fails closed.
    Required,
}

impl FromStr for NerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "optional" => Ok(Self::Optional),
            "required" => Ok(Self::Required),
            other => Err(format!("expected off, optional or required, got '{other}'")),
        }
    }
}

/// Process configuration, read once at startup from `PSYLENS_*` variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model_id: String,
    /// Results go to this bucket when set, otherwise they stay in memory.
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub bind_addr: SocketAddr,
    pub inference_timeout: Duration,
    pub max_concurrency: usize,
    pub queue_capacity: usize,
    pub expected_task_duration: Duration,
    /// Longest a status poll with `?wait=true` blocks.
    pub wait_timeout: Duration,
    pub task_retention: Duration,
    pub mask_mode: MaskMode,
    pub ner_mode: NerMode,
    /// Clinical NER entities scored below this are ignored.
    pub ner_min_score: f32,
    /// A PHI detector slower than this counts as failed for that pass.
    pub detector_timeout: Duration,
    /// Running inside the Lambda runtime, where nothing runs between
    /// invocations and memory is not shared across instances.
    pub lambda_runtime: bool,
}

impl AppConfig {
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mask_mode = match get("PSYLENS_MASK_MODE").as_deref() {
            None | Some("token") => MaskMode::Token,
            Some("redaction") => MaskMode::Redaction,
            Some(other) => {
                return Err(eyre!(
                    "PSYLENS_MASK_MODE: expected token or redaction, got '{other}'"
                ));
            }
        };

        let config = Self {
            model_id: get("PSYLENS_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            bucket: get("PSYLENS_BUCKET"),
            region: get("PSYLENS_REGION").or_else(|| get("AWS_REGION")),
            bind_addr: parse_or(&get, "PSYLENS_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            inference_timeout: secs_or(&get, "PSYLENS_INFERENCE_TIMEOUT_SECS", 60)?,
            max_concurrency: parse_or(&get, "PSYLENS_MAX_CONCURRENCY", 4)?,
            queue_capacity: parse_or(&get, "PSYLENS_QUEUE_CAPACITY", 256)?,
            expected_task_duration: secs_or(&get, "PSYLENS_EXPECTED_TASK_SECS", 30)?,
            wait_timeout: secs_or(&get, "PSYLENS_WAIT_TIMEOUT_SECS", 20)?,
            task_retention: secs_or(&get, "PSYLENS_TASK_RETENTION_SECS", 3600)?,
            mask_mode,
            ner_mode: parse_or(&get, "PSYLENS_NER_MODE", NerMode::Optional)?,
            ner_min_score: parse_or(&get, "PSYLENS_NER_MIN_SCORE", 0.5)?,
            detector_timeout: secs_or(&get, "PSYLENS_DETECTOR_TIMEOUT_SECS", 10)?,
            lambda_runtime: get("AWS_LAMBDA_RUNTIME_API").is_some(),
        };

        if config.max_concurrency == 0 {
            return Err(eyre!("PSYLENS_MAX_CONCURRENCY must be at least 1"));
        }
        if config.queue_capacity == 0 {
            return Err(eyre!("PSYLENS_QUEUE_CAPACITY must be at least 1"));
        }
        if config.detector_timeout.is_zero() {
            return Err(eyre!("PSYLENS_DETECTOR_TIMEOUT_SECS must be at least 1"));
        }
        if !(0.0..=1.0).contains(&config.ner_min_score) {
            return Err(eyre!("PSYLENS_NER_MIN_SCORE must be between 0 and 1"));
        }
        Ok(config)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> eyre::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| eyre!("{e}"))
            .wrap_err_with(|| format!("invalid {key}")),
    }
}

fn secs_or(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> eyre::Result<Duration> {
    parse_or(get, key, default).map(Duration::from_secs)
}
