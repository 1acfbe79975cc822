//! Our prompt data type.

use schemars::JsonSchema;

use crate::{io::read_json_or_toml, prelude::*};

/// The default OCR prompt.
const DEFAULT_OCR_PROMPT: &str = include_str!("prompts/ocr.toml");

/// The default structuring prompt.
const DEFAULT_STRUCTURE_PROMPT: &str = include_str!("prompts/structure.toml");

/// A single-turn prompt.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Prompt {
    /// The system instruction.
    pub system: String,

    /// Text to send after the input, if any.
    #[serde(default)]
    pub user: Option<String>,
}

impl Prompt {
    /// Get our default OCR prompt.
    pub fn default_ocr() -> Self {
        toml::from_str(DEFAULT_OCR_PROMPT).expect("failed to parse built-in OCR prompt")
    }

    /// Get our default structuring prompt.
    pub fn default_structure() -> Self {
        toml::from_str(DEFAULT_STRUCTURE_PROMPT)
            .expect("failed to parse built-in structuring prompt")
    }

    /// Load a prompt from a TOML or JSON file, or use `default`.
    pub async fn load_or(path: Option<&Path>, default: fn() -> Self) -> Result<Self> {
        match path {
            Some(path) => read_json_or_toml(path).await,
            None => Ok(default()),
        }
    }
}
