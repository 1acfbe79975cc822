//! The `edit` subcommand: correct an exported document.

use clap::{Args, ValueEnum as _};

use crate::{
    document::{
        CellValue, ColumnType, DeliveryChalanDocument, DocumentUpdate, FieldType, RecordId,
        SummaryType,
    },
    editor::{EditorSession, HeaderField, PartyDetail, PartyRole},
    io::{read_json_or_toml, write_pretty_json},
    prelude::*,
};

/// Edit command line arguments.
#[derive(Debug, Args)]
pub struct EditOpts {
    /// A document written by `extract` or `structure`.
    pub input_path: PathBuf,

    /// Apply a patch from a TOML or JSON file. Each top-level field in the
    /// patch replaces the same field of the document. May be repeated.
    #[clap(long = "patch", value_name = "FILE")]
    pub patch_paths: Vec<PathBuf>,

    /// Set a header field, for example `--set chalan-number=DC-42`. Fields are
    /// chalan-number, po-number, date and delivery-address.
    #[clap(long = "set", value_name = "FIELD=VALUE", value_parser = parse_header_assignment)]
    pub sets: Vec<(HeaderField, String)>,

    /// Set a party field, for example `--set-party supplier.phone=0171...`.
    /// `name`, `address` and `phone` are fixed fields. Any other key sets an
    /// extra field such as `buyer.TIN`.
    #[clap(long = "set-party", value_name = "PARTY.KEY=VALUE", value_parser = parse_party_assignment)]
    pub set_party: Vec<(PartyRole, String, String)>,

    /// Remove an extra party field, for example `--remove-party-field buyer.TIN`.
    #[clap(long = "remove-party-field", value_name = "PARTY.KEY", value_parser = parse_party_key)]
    pub remove_party_fields: Vec<(PartyRole, String)>,

    /// Add a metadata field, for example `--add-metadata "Driver=Jamal"`.
    #[clap(long = "add-metadata", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub add_metadata: Vec<(String, String)>,

    /// Change the value of a metadata field.
    #[clap(long = "set-metadata", value_name = "ID=VALUE", value_parser = parse_assignment)]
    pub set_metadata: Vec<(String, String)>,

    /// Remove a metadata field.
    #[clap(long = "remove-metadata", value_name = "ID")]
    pub remove_metadata: Vec<String>,

    /// Add a summary field, for example `--add-summary "VAT=750"`.
    #[clap(long = "add-summary", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub add_summary: Vec<(String, String)>,

    /// Change the value of a summary field.
    #[clap(long = "set-summary", value_name = "ID=VALUE", value_parser = parse_assignment)]
    pub set_summary: Vec<(String, String)>,

    /// Remove a summary field.
    #[clap(long = "remove-summary", value_name = "ID")]
    pub remove_summary: Vec<String>,

    /// Add a line item column with this label.
    #[clap(long = "add-column", value_name = "LABEL")]
    pub add_columns: Vec<String>,

    /// The type of columns added with `--add-column`.
    #[clap(long, value_enum, default_value_t = ColumnType::Text)]
    pub column_type: ColumnType,

    /// Rename a line item column, for example `--rename-column qty=Quantity`.
    #[clap(long = "rename-column", value_name = "ID=LABEL", value_parser = parse_assignment)]
    pub rename_columns: Vec<(String, String)>,

    /// Remove a line item column and its cells.
    #[clap(long = "remove-column", value_name = "ID")]
    pub remove_columns: Vec<String>,

    /// Append an empty line item row. May be repeated.
    #[clap(long = "add-row", action = clap::ArgAction::Count)]
    pub add_rows: u8,

    /// Remove a line item row.
    #[clap(long = "remove-row", value_name = "ID")]
    pub remove_rows: Vec<String>,

    /// Set a cell, for example `--set-cell 3f2c...:qty=12`.
    #[clap(long = "set-cell", value_name = "ROW:COLUMN=VALUE", value_parser = parse_cell_assignment)]
    pub set_cells: Vec<(String, String, String)>,

    /// The output path to write the document to. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `edit` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_edit(opts: &EditOpts) -> Result<()> {
    let document = read_json_or_toml::<DeliveryChalanDocument>(&opts.input_path).await?;
    let mut session = EditorSession::new(document);

    for path in &opts.patch_paths {
        let patch = read_json_or_toml::<DocumentUpdate>(path).await?;
        if !session.update(patch) {
            warn!("Patch {:?} changes nothing", path);
        }
    }
    for (field, value) in &opts.sets {
        session.set_header(*field, value);
    }

    for (role, key, value) in &opts.set_party {
        match party_detail(key) {
            Some(detail) => session.set_party_detail(*role, detail, value),
            None => session.set_party_additional(*role, key, value),
        };
    }
    for (role, key) in &opts.remove_party_fields {
        if !session.remove_party_additional(*role, key) {
            return Err(anyhow!("no extra party field {:?}", key));
        }
    }

    for (key, value) in &opts.add_metadata {
        let id = session.add_metadata(key, value, FieldType::Text);
        info!("Added metadata field {}", id);
    }
    for (id, value) in &opts.set_metadata {
        let id = RecordId::from(id.as_str());
        let key = session
            .document()
            .additional_metadata
            .iter()
            .find(|field| field.id == id)
            .map(|field| field.key.clone())
            .ok_or_else(|| anyhow!("no metadata field with ID {:?}", id.as_str()))?;
        session.update_metadata(&id, &key, value);
    }
    for id in &opts.remove_metadata {
        if !session.remove_metadata(&RecordId::from(id.as_str())) {
            return Err(anyhow!("no metadata field with ID {:?}", id));
        }
    }

    for (key, value) in &opts.add_summary {
        let id = session.add_summary(key, summary_value(value), SummaryType::Text);
        info!("Added summary field {}", id);
    }
    for (id, value) in &opts.set_summary {
        let id = RecordId::from(id.as_str());
        let key = session
            .document()
            .summary
            .iter()
            .find(|field| field.id == id)
            .map(|field| field.key.clone())
            .ok_or_else(|| anyhow!("no summary field with ID {:?}", id.as_str()))?;
        session.update_summary(&id, &key, summary_value(value));
    }
    for id in &opts.remove_summary {
        if !session.remove_summary(&RecordId::from(id.as_str())) {
            return Err(anyhow!("no summary field with ID {:?}", id));
        }
    }

    for label in &opts.add_columns {
        let id = session.add_column(label, opts.column_type);
        info!("Added column {}", id);
    }
    for (id, label) in &opts.rename_columns {
        if !session.rename_column(id, label) {
            return Err(anyhow!("no column with ID {:?}", id));
        }
    }
    for id in &opts.remove_columns {
        if !session.remove_column(id) {
            return Err(anyhow!("no column with ID {:?}", id));
        }
    }

    for _ in 0..opts.add_rows {
        let id = session.add_row();
        info!("Added row {}", id);
    }
    for id in &opts.remove_rows {
        if !session.remove_row(&RecordId::from(id.as_str())) {
            return Err(anyhow!("no row with ID {:?}", id));
        }
    }
    for (row_id, column_id, value) in &opts.set_cells {
        let row_id = RecordId::from(row_id.as_str());
        if session.document().line_items.column(column_id).is_none() {
            return Err(anyhow!("no column with ID {:?}", column_id));
        }
        let value = cell_value(session.document(), column_id, value);
        if !session.update_cell(&row_id, column_id, value) {
            return Err(anyhow!("no row with ID {:?}", row_id.as_str()));
        }
    }

    info!("Made {} corrections", session.corrections());
    write_pretty_json(opts.output_path.as_deref(), session.document()).await
}

/// Store plain numbers in number columns as numbers. Everything else is text.
fn cell_value(document: &DeliveryChalanDocument, column_id: &str, value: &str) -> CellValue {
    let is_number_column = document
        .line_items
        .column(column_id)
        .is_some_and(|column| column.column_type == ColumnType::Number);
    if is_number_column {
        if let Ok(Value::Number(n)) = serde_json::from_str::<Value>(value.trim()) {
            return CellValue::Number(n);
        }
    }
    CellValue::from(value)
}

/// Summary values are numbers when they parse as one.
fn summary_value(value: &str) -> CellValue {
    match serde_json::from_str::<Value>(value.trim()) {
        Ok(Value::Number(n)) => CellValue::Number(n),
        _ => CellValue::from(value),
    }
}

/// Is this one of a party's fixed fields?
fn party_detail(key: &str) -> Option<PartyDetail> {
    match key {
        "name" => Some(PartyDetail::Name),
        "address" => Some(PartyDetail::Address),
        "phone" => Some(PartyDetail::Phone),
        _ => None,
    }
}

/// Parse `PARTY.KEY`.
fn parse_party_key(s: &str) -> Result<(PartyRole, String)> {
    let (role, key) = s
        .split_once('.')
        .ok_or_else(|| anyhow!("expected PARTY.KEY, found {:?}", s))?;
    let role = PartyRole::from_str(role.trim(), true).map_err(|err| anyhow!("{}", err))?;
    Ok((role, key.trim().to_owned()))
}

/// Parse `PARTY.KEY=VALUE`.
fn parse_party_assignment(s: &str) -> Result<(PartyRole, String, String)> {
    let (target, value) = parse_assignment(s)?;
    let (role, key) = parse_party_key(&target)?;
    Ok((role, key, value))
}

/// Parse `KEY=VALUE`.
fn parse_assignment(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, found {:?}", s))?;
    Ok((key.trim().to_owned(), value.to_owned()))
}

/// Parse `FIELD=VALUE` for a header field.
fn parse_header_assignment(s: &str) -> Result<(HeaderField, String)> {
    let (key, value) = parse_assignment(s)?;
    let field = HeaderField::from_str(&key, true).map_err(|err| anyhow!("{}", err))?;
    Ok((field, value))
}

/// Parse `ROW:COLUMN=VALUE`.
fn parse_cell_assignment(s: &str) -> Result<(String, String, String)> {
    let (target, value) = parse_assignment(s)?;
    let (row, column) = target
        .split_once(':')
        .ok_or_else(|| anyhow!("expected ROW:COLUMN=VALUE, found {:?}", s))?;
    Ok((row.to_owned(), column.to_owned(), value))
}
