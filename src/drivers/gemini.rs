//! Gemini REST driver.
//!
//! We talk to the `generateContent` endpoint directly with [`reqwest`]. The
//! request and response types below cover only the fields we use.

use async_trait::async_trait;

use crate::{
    error::ChalanError,
    llm_client::{ApiKey, GeminiConfig},
    prelude::*,
};

use super::{Driver, GenerateRequest, GenerateResponse, LlmOpts, Part, TokenUsage};

/// Our Gemini driver.
#[derive(Debug)]
pub struct GeminiDriver {
    /// Our HTTP client.
    client: reqwest::Client,

    /// The base URL of the API.
    api_base: String,
}

impl GeminiDriver {
    /// Create a new Gemini driver.
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
        }
    }

    /// The URL for calling `model`.
    fn generate_content_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }
}

#[async_trait]
impl Driver for GeminiDriver {
    #[instrument(level = "debug", skip_all, fields(model = %request.model))]
    async fn generate_content(
        &self,
        api_key: &ApiKey,
        request: &GenerateRequest,
        llm_opts: &LlmOpts,
    ) -> Result<GenerateResponse, ChalanError> {
        let body = WireRequest::from(request);
        trace!(?body, "Gemini request");

        let future = async {
            let response = self
                .client
                .post(self.generate_content_url(&request.model))
                .header("x-goog-api-key", api_key.expose())
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ChalanError::Upstream {
                    status: status.as_u16(),
                    message: upstream_error_message(&text),
                });
            }
            Ok::<_, ChalanError>(response.json::<WireResponse>().await?)
        };
        let response = llm_opts.apply_timeout(future).await?;
        trace!(?response, "Gemini response");

        Ok(response.into())
    }
}

/// Pull the human-readable message out of a Gemini error body, falling back to
/// the raw body.
fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<WireErrorResponse>(body)
        .map(|err| err.error.message)
        .unwrap_or_else(|_| body.trim().to_owned())
}

/// The request body for `generateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    system_instruction: WireContent,
    contents: Vec<WireContent>,
    generation_config: WireGenerationConfig,
}

impl From<&GenerateRequest> for WireRequest {
    fn from(request: &GenerateRequest) -> Self {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => WirePart {
                    text: Some(text.clone()),
                    inline_data: None,
                },
                Part::InlineData { mime_type, data } => WirePart {
                    text: None,
                    inline_data: Some(WireBlob {
                        mime_type: mime_type.clone(),
                        data: data.clone(),
                    }),
                },
            })
            .collect();
        Self {
            system_instruction: WireContent {
                role: None,
                parts: vec![WirePart {
                    text: Some(request.system_instruction.clone()),
                    inline_data: None,
                }],
            },
            contents: vec![WireContent {
                role: Some("user".to_owned()),
                parts,
            }],
            generation_config: WireGenerationConfig {
                temperature: request.temperature,
                response_mime_type: request.response_mime_type.clone(),
            },
        }
    }
}

/// A turn of content.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

/// Part of a turn. Gemini uses a "one of these fields is set" encoding.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<WireBlob>,
}

/// Inline binary data.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

/// The response body from `generateContent`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    usage_metadata: Option<WireUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    thoughts_token_count: u64,
}

impl From<WireResponse> for GenerateResponse {
    fn from(response: WireResponse) -> Self {
        // Like the official SDKs, we concatenate all the text parts of the
        // first candidate.
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .filter(|text| !text.is_empty());
        let token_usage = response.usage_metadata.map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count + usage.thoughts_token_count,
        });
        Self { text, token_usage }
    }
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
}
