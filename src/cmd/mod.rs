//! Command-line entry points.

use std::sync::Arc;

use clap::Args;

use crate::{
    drivers::{Driver, LlmOpts, gemini::GeminiDriver},
    llm_client::GeminiConfig,
    models::{DEFAULT_MODEL, warn_if_unknown},
    ocr::OcrClient,
    prelude::*,
    prompt::Prompt,
    structure::StructuringClient,
};

pub mod cost;
pub mod edit;
pub mod extract;
pub mod models;
pub mod ocr;
pub mod schema;
pub mod structure;

/// Options for subcommands that call the model.
#[derive(Debug, Clone, Args)]
pub struct ModelOpts {
    /// The model to use. See `chalan-scanner models`.
    #[clap(short = 'm', long, default_value = DEFAULT_MODEL)]
    pub model: String,

    #[clap(flatten)]
    pub llm_opts: LlmOpts,
}

impl ModelOpts {
    /// Read our configuration and build a driver.
    fn connect(&self) -> (GeminiConfig, Arc<dyn Driver>) {
        warn_if_unknown(&self.model);
        let config = GeminiConfig::from_env();
        debug!(api_base = %config.api_base, "Using Gemini API");
        let driver: Arc<dyn Driver> = Arc::new(GeminiDriver::new(&config));
        (config, driver)
    }

    /// Build an OCR client.
    pub async fn ocr_client(&self, prompt_path: Option<&Path>) -> Result<OcrClient> {
        let prompt = Prompt::load_or(prompt_path, Prompt::default_ocr).await?;
        let (config, driver) = self.connect();
        Ok(OcrClient::new(driver, config, prompt, self.llm_opts.clone()))
    }

    /// Build a structuring client.
    pub async fn structuring_client(
        &self,
        prompt_path: Option<&Path>,
    ) -> Result<StructuringClient> {
        let prompt = Prompt::load_or(prompt_path, Prompt::default_structure).await?;
        let (config, driver) = self.connect();
        Ok(StructuringClient::new(
            driver,
            config,
            prompt,
            self.llm_opts.clone(),
        ))
    }
}
