//! The `structure` subcommand.

use clap::Args;

use crate::{
    cmd::{ModelOpts, extract::log_review_warnings},
    cost::estimate_usage_cost,
    io::write_pretty_json,
    prelude::*,
    ui::{ProgressConfig, Ui},
};

/// Structure command line arguments.
#[derive(Debug, Args)]
pub struct StructureOpts {
    /// A text file containing OCR output, as written by `ocr`.
    pub input_path: PathBuf,

    #[clap(flatten)]
    pub model_opts: ModelOpts,

    /// A TOML or JSON file with a custom structuring prompt.
    #[clap(long = "structure-prompt")]
    pub prompt_path: Option<PathBuf>,

    /// The output path to write the document to. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `structure` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_structure(ui: Ui, opts: &StructureOpts) -> Result<()> {
    let raw_text = tokio::fs::read_to_string(&opts.input_path)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", opts.input_path))?;
    if raw_text.trim().is_empty() {
        return Err(anyhow!("{:?} contains no text", opts.input_path));
    }
    let client = opts
        .model_opts
        .structuring_client(opts.prompt_path.as_deref())
        .await?;

    let sp = ui.new_spinner(&ProgressConfig {
        emoji: "🧩",
        msg: "Structuring chalan",
        done_msg: "Structured chalan",
    });
    let result = client
        .structure_delivery_chalan(&raw_text, &opts.model_opts.model)
        .await;
    sp.finish_using_style();
    let result = result?;

    if let Some(usage) = &result.token_usage {
        info!(
            "Estimated cost: {}",
            estimate_usage_cost(&opts.model_opts.model, usage)
        );
    }
    log_review_warnings(&result.document);
    write_pretty_json(opts.output_path.as_deref(), &result.document).await
}
