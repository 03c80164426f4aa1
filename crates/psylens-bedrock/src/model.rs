//! The language-model capability behind the inference adapter.
//!
//! The model handle is created once by the process entry point and shared
//! by reference; there is no ambient global model.

use std::future::Future;
use std::pin::Pin;

use aws_sdk_bedrockruntime::Client;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message, SystemContentBlock,
};

use psylens_core::models::analysis::GenerationParams;

use crate::error::ModelInferenceError;
use crate::tokens::{self, TokenCount};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const SYSTEM_PROMPT: &str = "\
You assist licensed mental-health clinicians by analysing de-identified clinical text. \
Bracketed placeholders such as [NAME] or [REDACTED] stand for removed identifiers; \
never guess what they contained. Answer only in the exact output format requested.";

/// Raw output of one generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenCount>,
}

/// Text-in/text-out model capability.
///
/// Methods return boxed futures for dyn compatibility.
pub trait TextModel: Send + Sync {
    /// Identifier recorded on every result (e.g. the Bedrock model ID).
    fn model_version(&self) -> &str;

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: &'a GenerationParams,
    ) -> BoxFuture<'a, Result<Generation, ModelInferenceError>>;
}

/// Bedrock Converse-backed model.
pub struct BedrockTextModel {
    client: Client,
    model_id: String,
}

impl BedrockTextModel {
    /// The caller chooses the model (e.g. a Claude inference profile ID).
    pub fn new(config: &aws_config::SdkConfig, model_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(config),
            model_id: model_id.into(),
        }
    }

    async fn converse(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, ModelInferenceError> {
        let inference = InferenceConfiguration::builder()
            .max_tokens(params.max_tokens as i32)
            .temperature(params.temperature)
            .top_p(params.top_p)
            .build();

        let message = Message::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Text(prompt.to_string()))
            .build()
            .map_err(|e| ModelInferenceError::Backend(e.to_string()))?;

        let response = self
            .client
            .converse()
            .model_id(&self.model_id)
            .system(SystemContentBlock::Text(SYSTEM_PROMPT.to_string()))
            .messages(message)
            .inference_config(inference)
            .send()
            .await
            .map_err(|e| ModelInferenceError::Backend(e.into_service_error().to_string()))?;

        let output_message = response
            .output()
            .and_then(|o| o.as_message().ok())
            .ok_or_else(|| {
                ModelInferenceError::MalformedResponse("no message in response".to_string())
            })?;

        let text = output_message
            .content()
            .iter()
            .filter_map(|block| {
                if let ContentBlock::Text(text) = block {
                    Some(text.as_str())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");

        let usage = response.usage().map(tokens::extract_token_usage);

        Ok(Generation { text, usage })
    }
}

impl TextModel for BedrockTextModel {
    fn model_version(&self) -> &str {
        &self.model_id
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: &'a GenerationParams,
    ) -> BoxFuture<'a, Result<Generation, ModelInferenceError>> {
        Box::pin(self.converse(prompt, params))
    }
}
