//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;

use crate::{
    document::{DeliveryChalanDocument, DocumentUpdate},
    io::write_pretty_json,
    ocr::OcrResult,
    prelude::*,
    prompt::Prompt,
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// An exported delivery chalan.
    Document,
    /// A patch file for `edit --patch`.
    DocumentUpdate,
    /// The output of `ocr --json`.
    OcrResult,
    /// A custom prompt file.
    Prompt,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    let schema = match schema_opts.schema_type {
        SchemaType::Document => schema_for!(DeliveryChalanDocument),
        SchemaType::DocumentUpdate => schema_for!(DocumentUpdate),
        SchemaType::OcrResult => schema_for!(OcrResult),
        SchemaType::Prompt => schema_for!(Prompt),
    };
    write_pretty_json(schema_opts.output_path.as_deref(), &schema).await
}
