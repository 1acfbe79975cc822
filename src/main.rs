use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod cmd;
mod cost;
mod data_url;
mod document;
mod drivers;
mod editor;
mod error;
mod io;
mod llm_client;
mod models;
mod ocr;
mod pipeline;
mod prelude;
mod prompt;
mod source;
mod structure;
mod ui;

/// OCR delivery chalans with Gemini, and correct them as structured JSON.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - GEMINI_API_KEY: The Gemini API key to use. API_KEY is also accepted.
  - GEMINI_API_BASE (optional): Override the server URL.
  - RUST_LOG (optional): Log filter, for example "debug".

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// OCR an image or PDF, and print the raw text.
    Ocr(cmd::ocr::OcrOpts),
    /// OCR and structure a delivery chalan, and export it as JSON.
    Extract(cmd::extract::ExtractOpts),
    /// Structure previously OCRed text as a delivery chalan.
    Structure(cmd::structure::StructureOpts),
    /// Correct an exported delivery chalan.
    Edit(cmd::edit::EditOpts),
    /// Print schemas for input and output formats.
    Schema(cmd::schema::SchemaOpts),
    /// List the models we know about.
    Models(cmd::models::ModelsOpts),
    /// Estimate the cost of a call.
    Cost(cmd::cost::CostOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Ocr(opts) => opts.output_path.is_none(),
            Cmd::Extract(opts) => opts.stdout,
            Cmd::Structure(opts) => opts.output_path.is_none(),
            Cmd::Edit(opts) => opts.output_path.is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
            Cmd::Models(_) | Cmd::Cost(_) => true,
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    match &opts.subcmd {
        Cmd::Ocr(opts) => cmd::ocr::cmd_ocr(ui, opts).await,
        Cmd::Extract(opts) => cmd::extract::cmd_extract(ui, opts).await,
        Cmd::Structure(opts) => cmd::structure::cmd_structure(ui, opts).await,
        Cmd::Edit(opts) => cmd::edit::cmd_edit(opts).await,
        Cmd::Schema(opts) => cmd::schema::cmd_schema(opts).await,
        Cmd::Models(opts) => cmd::models::cmd_models(opts).await,
        Cmd::Cost(opts) => cmd::cost::cmd_cost(opts).await,
    }
}
