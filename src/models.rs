//! The Gemini models we know about.

use crate::prelude::*;

/// The model we use unless told otherwise.
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// A known model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModelInfo {
    /// The identifier sent to the API.
    pub id: &'static str,

    /// A short display name.
    pub name: &'static str,

    /// What this model is good at.
    pub description: &'static str,

    /// USD per million input tokens. Estimated.
    pub input_price: f64,

    /// USD per million output tokens. Estimated.
    pub output_price: f64,
}

/// Every model we know about, best first.
pub static MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gemini-3-pro-preview",
        name: "3.0 Pro",
        description: "Highest reasoning and layout preservation",
        input_price: 1.25,
        output_price: 5.00,
    },
    ModelInfo {
        id: DEFAULT_MODEL,
        name: "3.0 Flash",
        description: "Fastest, optimized for high volume",
        input_price: 0.10,
        output_price: 0.40,
    },
    ModelInfo {
        id: "gemini-2.5-flash-latest",
        name: "2.5 Flash",
        description: "Balanced performance",
        input_price: 0.10,
        output_price: 0.40,
    },
];

impl ModelInfo {
    /// Look up a model by ID.
    pub fn find(id: &str) -> Option<&'static ModelInfo> {
        MODELS.iter().find(|model| model.id == id)
    }

    /// Look up a model by ID, falling back to our default model's entry.
    pub fn find_or_default(id: &str) -> &'static ModelInfo {
        Self::find(id).unwrap_or_else(Self::default_model)
    }

    /// The entry for [`DEFAULT_MODEL`].
    pub fn default_model() -> &'static ModelInfo {
        MODELS
            .iter()
            .find(|model| model.id == DEFAULT_MODEL)
            .expect("default model missing from catalog")
    }
}

/// Warn if we don't recognize a model. We still let people use it, since new
/// models appear all the time.
pub fn warn_if_unknown(id: &str) {
    if ModelInfo::find(id).is_none() {
        warn!(
            model = id,
            "Unknown model; cost estimates will use {} prices", DEFAULT_MODEL
        );
    }
}
