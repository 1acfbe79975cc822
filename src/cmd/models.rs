//! The `models` subcommand.

use clap::Args;

use crate::{
    io::{write_pretty_json, write_text},
    models::{DEFAULT_MODEL, MODELS},
    prelude::*,
};

/// Models command line arguments.
#[derive(Debug, Args)]
pub struct ModelsOpts {
    /// Print the catalog as JSON.
    #[clap(long)]
    pub json: bool,
}

/// The `models` subcommand.
pub async fn cmd_models(opts: &ModelsOpts) -> Result<()> {
    if opts.json {
        return write_pretty_json(None, &MODELS).await;
    }
    let mut out = String::new();
    out.push_str(&format!(
        "{:<26} {:<10} {:>8} {:>8}  {}\n",
        "MODEL", "NAME", "IN $/M", "OUT $/M", "DESCRIPTION"
    ));
    for model in MODELS {
        let marker = if model.id == DEFAULT_MODEL { " (default)" } else { "" };
        out.push_str(&format!(
            "{:<26} {:<10} {:>8.2} {:>8.2}  {}{}\n",
            model.id, model.name, model.input_price, model.output_price, model.description, marker
        ));
    }
    write_text(None, &out).await
}
