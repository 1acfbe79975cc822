//! LLM drivers.
//!
//! Both of our clients (OCR and structuring) make exactly one "generate
//! content" call each. The [`Driver`] trait is the seam between those clients
//! and the network, which lets us run the whole pipeline against a scripted
//! driver in tests.

use std::{ops::AddAssign, pin::Pin, time::Duration};

use async_trait::async_trait;
use clap::Args;
use futures::{FutureExt as _, TryFutureExt as _};
use schemars::JsonSchema;
use tokio::time;

use crate::{error::ChalanError, llm_client::ApiKey, prelude::*};

pub mod gemini;
#[cfg(test)]
pub mod scripted;

/// The temperature we use unless told otherwise. Low, because we want faithful
/// transcription, not creativity.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Our LLM-related options.
#[derive(Args, Clone, Debug)]
pub struct LlmOpts {
    /// The temperature to use for sampling, between 0.0 and 2.0. Lower values
    /// make the output more deterministic.
    #[clap(long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// A timeout, in seconds, for each LLM call. By default, we wait as long
    /// as the API takes. Timed out requests are not retried.
    #[clap(long)]
    pub timeout: Option<u64>,
}

impl Default for LlmOpts {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            timeout: None,
        }
    }
}

impl LlmOpts {
    /// Apply our timeout (if any) to a future.
    ///
    /// `'fut` is the lifetime of any data borrowed by `future`. We box the
    /// output because the two branches produce different future types.
    pub fn apply_timeout<'fut, T>(
        &self,
        future: impl Future<Output = Result<T, ChalanError>> + Send + 'fut,
    ) -> Pin<Box<dyn Future<Output = Result<T, ChalanError>> + Send + 'fut>>
    where
        T: Send + 'static,
    {
        if let Some(timeout) = self.timeout {
            time::timeout(Duration::from_secs(timeout), future)
                .map_err(|_elapsed| ChalanError::Timeout)
                // `Result<Result<T, E>, E>` to `Result<T, E>`.
                .map(|result| result.and_then(|inner| inner))
                .boxed()
        } else {
            future.boxed()
        }
    }
}

/// One part of a user turn.
#[derive(Clone, Debug, PartialEq)]
pub enum Part {
    /// Plain text.
    Text(String),

    /// Inline binary data, already Base64-encoded.
    InlineData {
        /// The MIME type of the data.
        mime_type: String,
        /// Base64-encoded bytes.
        data: String,
    },
}

/// A single-turn "generate content" request.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateRequest {
    /// The model to call.
    pub model: String,

    /// The system instruction.
    pub system_instruction: String,

    /// The parts of our single user turn, in order.
    pub parts: Vec<Part>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Ask the model to reply with this MIME type (usually
    /// `application/json`).
    pub response_mime_type: Option<String>,
}

/// The reply to a [`GenerateRequest`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerateResponse {
    /// All the text in the first candidate, concatenated. `None` if the model
    /// returned no text at all.
    pub text: Option<String>,

    /// Token usage, if reported.
    pub token_usage: Option<TokenUsage>,
}

/// Token usage.
#[derive(Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    /// How many tokens were used in the prompt (including images and PDFs)?
    pub prompt_tokens: u64,

    /// How many tokens were generated, including any "thinking" tokens?
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Was our token usage zero?
    pub fn is_zero(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0
    }

    /// Total tokens used.
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Interface trait for LLM drivers.
#[async_trait]
pub trait Driver: std::fmt::Debug + Send + Sync + 'static {
    /// Run a single "generate content" request.
    ///
    /// Drivers make exactly one network call and never retry.
    async fn generate_content(
        &self,
        api_key: &ApiKey,
        request: &GenerateRequest,
        llm_opts: &LlmOpts,
    ) -> Result<GenerateResponse, ChalanError>;
}
