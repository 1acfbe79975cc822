//! The `extract` subcommand: OCR, structure and export a delivery chalan.

use clap::Args;

use crate::{
    cmd::ModelOpts,
    cost::estimate_usage_cost,
    document::{ConfidenceLevel, DeliveryChalanDocument, DocumentUpdate},
    io::{read_json_or_toml, write_text},
    pipeline::{Outcome, Pipeline},
    prelude::*,
    source::SourceFile,
    ui::Ui,
};

/// Extract command line arguments.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    /// The image or PDF of a delivery chalan.
    pub input_path: PathBuf,

    #[clap(flatten)]
    pub model_opts: ModelOpts,

    /// A TOML or JSON file with a custom OCR prompt.
    #[clap(long = "ocr-prompt")]
    pub ocr_prompt_path: Option<PathBuf>,

    /// A TOML or JSON file with a custom structuring prompt.
    #[clap(long = "structure-prompt")]
    pub structure_prompt_path: Option<PathBuf>,

    /// Apply corrections from a TOML or JSON patch file before exporting. May
    /// be repeated.
    #[clap(long = "patch", value_name = "FILE")]
    pub patch_paths: Vec<PathBuf>,

    /// The output path to write the document to. Defaults to
    /// `chalan_<number>.json` in the current directory.
    #[clap(short = 'o', long = "out", conflicts_with = "stdout")]
    pub output_path: Option<PathBuf>,

    /// Write the document to standard output.
    #[clap(long)]
    pub stdout: bool,
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_extract(ui: Ui, opts: &ExtractOpts) -> Result<()> {
    // Check the file before anything else, so bad input never needs an API key.
    let source = SourceFile::from_path(&opts.input_path).await?;
    let mut patches = vec![];
    for path in &opts.patch_paths {
        patches.push((path, read_json_or_toml::<DocumentUpdate>(path).await?));
    }

    let ocr = opts
        .model_opts
        .ocr_client(opts.ocr_prompt_path.as_deref())
        .await?;
    let structurer = opts
        .model_opts
        .structuring_client(opts.structure_prompt_path.as_deref())
        .await?;
    let pipeline = Pipeline::new(ocr, structurer);
    pipeline.select_source(source);

    let spinners = ui.follow_pipeline(pipeline.subscribe());
    let outcome = pipeline.process(&opts.model_opts.model).await;
    // Dropping the pipeline closes the status channel, so the spinner task
    // always ends.
    let pipeline = match outcome {
        Outcome::Ready => pipeline,
        Outcome::Failed(err) => {
            drop(pipeline);
            spinners.await.context("spinner task failed")?;
            return Err(err.into());
        }
        other => return Err(anyhow!("pipeline did not finish: {:?}", other)),
    };

    for (path, patch) in patches {
        if !pipeline.update(patch) {
            warn!("Patch {:?} changes nothing", path);
        }
    }
    if let Some(preview_url) = pipeline.preview_url() {
        debug!(preview_bytes = preview_url.len(), "Original kept for preview");
    }
    let usage = pipeline.token_usage();
    let corrections = pipeline.corrections().unwrap_or_default();
    let document = pipeline
        .document()
        .ok_or_else(|| anyhow!("pipeline finished without a document"))?;
    drop(pipeline);
    spinners.await.context("spinner task failed")?;
    if corrections > 0 {
        info!("Applied {} corrections", corrections);
    }

    if !usage.is_zero() {
        info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens(),
            "Estimated cost: {}",
            estimate_usage_cost(&opts.model_opts.model, &usage)
        );
    }
    log_review_warnings(&document);

    let json = document.to_pretty_json()?;
    if opts.stdout {
        write_text(None, &json).await
    } else {
        let path = opts
            .output_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(document.export_file_name()));
        write_text(Some(&path), &json).await?;
        info!("Wrote {}", path.display());
        Ok(())
    }
}

/// Point out anything the model wasn't sure about.
pub fn log_review_warnings(document: &DeliveryChalanDocument) {
    for (label, confidence) in document.fields_needing_review() {
        match confidence.level() {
            ConfidenceLevel::Low => warn!(
                confidence = confidence.value(),
                "Low confidence, check carefully: {}", label
            ),
            _ => info!(confidence = confidence.value(), "Please review: {}", label),
        }
    }
}
