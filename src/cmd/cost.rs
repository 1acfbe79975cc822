//! The `cost` subcommand.

use clap::Args;

use crate::{
    cost::estimate_cost,
    io::{write_pretty_json, write_text},
    models::{DEFAULT_MODEL, warn_if_unknown},
    prelude::*,
};

/// Cost command line arguments.
#[derive(Debug, Args)]
pub struct CostOpts {
    /// Input (prompt) tokens, including images and PDFs.
    pub prompt_tokens: u64,

    /// Output (completion) tokens, including thinking tokens.
    pub completion_tokens: u64,

    /// The model to price.
    #[clap(short = 'm', long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Print the estimate as JSON.
    #[clap(long)]
    pub json: bool,
}

/// The `cost` subcommand.
pub async fn cmd_cost(opts: &CostOpts) -> Result<()> {
    warn_if_unknown(&opts.model);
    let cost = estimate_cost(&opts.model, opts.prompt_tokens, opts.completion_tokens);
    if opts.json {
        write_pretty_json(None, &cost).await
    } else {
        write_text(None, &cost.to_string()).await
    }
}
