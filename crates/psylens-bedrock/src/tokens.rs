/// Input/output token counts for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCount {
    pub input: u64,
    pub output: u64,
}

impl TokenCount {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Extract token counts from a Bedrock Converse response.
pub fn extract_token_usage(usage: &aws_sdk_bedrockruntime::types::TokenUsage) -> TokenCount {
    TokenCount {
        input: usage.input_tokens.max(0) as u64,
        output: usage.output_tokens.max(0) as u64,
    }
}
