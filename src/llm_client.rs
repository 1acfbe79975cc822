//! Configuration for talking to the Gemini API.

use std::{env, fmt};

use crate::{error::ChalanError, prelude::*};

/// The default Gemini REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// An API key. We keep it out of `Debug` output, because options and clients
/// get logged.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key. Blank keys are treated as missing.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    /// The raw key, for use in request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(<redacted>)")
    }
}

/// Gemini client configuration. This is read once, at startup, and then passed
/// explicitly to anything that needs it.
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// The API key, if one was configured.
    pub api_key: Option<ApiKey>,

    /// The base URL of the API, without a trailing slash.
    pub api_base: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_owned(),
        }
    }
}

impl GeminiConfig {
    /// Build a configuration from the environment.
    ///
    /// We look for `GEMINI_API_KEY` first, then `API_KEY`. `GEMINI_API_BASE`
    /// overrides the server URL.
    pub fn from_env() -> Self {
        let api_key = env::var("GEMINI_API_KEY")
            .ok()
            .and_then(ApiKey::new)
            .or_else(|| env::var("API_KEY").ok().and_then(ApiKey::new));
        let api_base = env::var("GEMINI_API_BASE")
            .ok()
            .filter(|base| !base.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_owned());
        Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_owned(),
        }
    }

    /// Get our API key, or fail with [`ChalanError::MissingApiKey`].
    pub fn require_api_key(&self) -> Result<&ApiKey, ChalanError> {
        self.api_key.as_ref().ok_or(ChalanError::MissingApiKey)
    }
}
