//! Errors reported by the OCR and structuring pipeline.
//!
//! The CLI layer uses [`anyhow`] like everything else, but the clients and the
//! pipeline need to keep error categories apart, because each one is handled
//! (and reported) differently.

use thiserror::Error;

/// Something went wrong while OCRing or structuring a document.
#[derive(Debug, Error)]
pub enum ChalanError {
    /// No API key was configured. We never attempt a request in this case.
    #[error(
        "API key is missing. Please set GEMINI_API_KEY (or API_KEY) in the environment or a .env file."
    )]
    MissingApiKey,

    /// The input file is neither an image nor a PDF.
    #[error("Please upload a valid image or PDF document (found {mime_type}).")]
    UnsupportedMediaType {
        /// The media type we detected.
        mime_type: String,
    },

    /// The API returned an error status.
    #[error("Gemini API error (status {status}): {message}")]
    Upstream {
        /// The HTTP status code.
        status: u16,
        /// The message reported by the API, or the raw body.
        message: String,
    },

    /// We couldn't talk to the API at all, or couldn't decode its reply.
    #[error("Error calling Gemini API: {0}")]
    Http(#[from] reqwest::Error),

    /// The request took longer than the configured timeout.
    #[error("LLM request timed out")]
    Timeout,

    /// The OCR call succeeded, but returned no text.
    #[error("No text extraction returned from the model.")]
    NoText,

    /// The structuring call returned something we couldn't parse.
    #[error("Failed to structure document data. {0}")]
    Structuring(String),
}
