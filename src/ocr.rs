//! Raw OCR of an image or PDF.

use std::sync::Arc;

use schemars::JsonSchema;

use crate::{
    drivers::{Driver, GenerateRequest, LlmOpts, Part, TokenUsage},
    error::ChalanError,
    llm_client::GeminiConfig,
    prelude::*,
    prompt::Prompt,
    source::SourceFile,
};

/// The result of OCRing a document.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct OcrResult {
    /// The transcribed text, with the original layout.
    pub text: String,

    /// Token usage, if the API reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,

    /// The model we used.
    pub model_used: String,
}

/// Transcribes documents using an LLM.
#[derive(Clone, Debug)]
pub struct OcrClient {
    driver: Arc<dyn Driver>,
    config: GeminiConfig,
    prompt: Prompt,
    llm_opts: LlmOpts,
}

impl OcrClient {
    /// Create a new OCR client.
    pub fn new(
        driver: Arc<dyn Driver>,
        config: GeminiConfig,
        prompt: Prompt,
        llm_opts: LlmOpts,
    ) -> Self {
        Self {
            driver,
            config,
            prompt,
            llm_opts,
        }
    }

    /// OCR a document. This makes exactly one API call, or none at all if we
    /// have no API key.
    #[instrument(level = "debug", skip_all, fields(source = %source.name(), model = %model))]
    pub async fn perform_ocr(
        &self,
        source: &SourceFile,
        model: &str,
    ) -> Result<OcrResult, ChalanError> {
        let api_key = self.config.require_api_key()?;

        let mut parts = vec![source.to_part()];
        if let Some(user) = &self.prompt.user {
            parts.push(Part::Text(user.clone()));
        }
        let request = GenerateRequest {
            model: model.to_owned(),
            system_instruction: self.prompt.system.clone(),
            parts,
            temperature: self.llm_opts.temperature,
            response_mime_type: None,
        };

        let response = self
            .driver
            .generate_content(api_key, &request, &self.llm_opts)
            .await
            .inspect_err(|err| error!("OCR error: {}", err))?;

        let text = response
            .text
            .filter(|text| !text.trim().is_empty())
            .ok_or(ChalanError::NoText)
            .inspect_err(|err| error!("OCR error: {}", err))?;
        debug!(chars = text.chars().count(), usage = ?response.token_usage, "OCR complete");

        Ok(OcrResult {
            text,
            token_usage: response.token_usage,
            model_used: model.to_owned(),
        })
    }
}
