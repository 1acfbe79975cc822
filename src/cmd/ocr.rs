//! The `ocr` subcommand.

use clap::Args;

use crate::{
    cmd::ModelOpts,
    cost::estimate_usage_cost,
    io::{write_pretty_json, write_text},
    prelude::*,
    source::SourceFile,
    ui::{ProgressConfig, Ui},
};

/// OCR command line arguments.
#[derive(Debug, Args)]
pub struct OcrOpts {
    /// The image or PDF to transcribe.
    pub input_path: PathBuf,

    #[clap(flatten)]
    pub model_opts: ModelOpts,

    /// A TOML or JSON file with a custom prompt, containing `system` and
    /// (optionally) `user` strings.
    #[clap(long = "ocr-prompt")]
    pub prompt_path: Option<PathBuf>,

    /// Write a JSON object with the text, token usage and model, instead of
    /// just the text.
    #[clap(long)]
    pub json: bool,

    /// The output path to write the text to. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_ocr(ui: Ui, opts: &OcrOpts) -> Result<()> {
    let source = SourceFile::from_path(&opts.input_path).await?;
    let client = opts
        .model_opts
        .ocr_client(opts.prompt_path.as_deref())
        .await?;

    let sp = ui.new_spinner(&ProgressConfig {
        emoji: "📄",
        msg: "Reading document",
        done_msg: "Read document",
    });
    let result = client
        .perform_ocr(&source, &opts.model_opts.model)
        .await;
    sp.finish_using_style();
    let result = result?;

    if let Some(usage) = &result.token_usage {
        let cost = estimate_usage_cost(&result.model_used, usage);
        info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Estimated cost: {}",
            cost
        );
    }

    if opts.json {
        write_pretty_json(opts.output_path.as_deref(), &result).await
    } else {
        write_text(opts.output_path.as_deref(), &result.text).await
    }
}
