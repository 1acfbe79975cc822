//! The structured delivery chalan document.
//!
//! Documents come from a language model, so deserialization is deliberately
//! forgiving: numbers where we expect strings, `null` where we expect lists,
//! and unknown type tags are all accepted and coerced into something sensible.
//! What we serialize is always the strict shape described by the types below.

use std::{borrow::Cow, fmt, sync::LazyLock};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use schemars::JsonSchema;
use serde::{
    Deserializer,
    de::{self, Error as _},
};
use uuid::Uuid;

use crate::prelude::*;

/// A locally-unique identifier, used only to address entries in a list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh, random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = lenient_string(deserializer)?;
        if id.is_empty() {
            Ok(Self::generate())
        } else {
            Ok(Self(id))
        }
    }
}

/// A confidence score in `[0, 1]`.
///
/// Models report confidence as either a fraction or a percentage. Anything
/// above 1 is treated as a percentage.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Entered or confirmed by a human.
    pub const CERTAIN: Confidence = Confidence(1.0);

    /// Missing or unusable. Needs review.
    pub const UNKNOWN: Confidence = Confidence(0.0);

    /// Normalize a raw score.
    pub fn normalize(raw: f64) -> Self {
        if !raw.is_finite() {
            return Self::UNKNOWN;
        }
        let score = if raw > 1.0 { raw / 100.0 } else { raw };
        Self(score.clamp(0.0, 1.0))
    }

    /// The score, in `[0, 1]`.
    pub fn value(self) -> f64 {
        self.0
    }

    /// How much should a reviewer worry about this value?
    pub fn level(self) -> ConfidenceLevel {
        if self.0 >= 0.9 {
            ConfidenceLevel::High
        } else if self.0 >= 0.7 {
            ConfidenceLevel::Review
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(raw.map(Self::normalize).unwrap_or(Self::UNKNOWN))
    }
}

/// Coarse confidence buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfidenceLevel {
    /// Clearly readable.
    High,
    /// Partially unclear. Please review.
    Review,
    /// Probably guessed. Check carefully.
    Low,
}

/// Deserialize a string, accepting numbers and booleans (as their text) and
/// `null` (as an empty string).
pub fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string, found {other}"
        ))),
    }
}

/// Like [`lenient_string`], but `null` and blank strings become `None`.
fn lenient_optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let s = lenient_string(deserializer)?;
    if s.trim().is_empty() { Ok(None) } else { Ok(Some(s)) }
}

/// Deserialize a list, treating `null` as empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Define a type tag enum which deserializes case-insensitively, and falls
/// back to its default for unknown or missing tags.
macro_rules! type_tag {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$variant_meta:meta])* $variant:ident => $tag:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, JsonSchema)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$variant_meta])* $variant, )+
        }

        impl $name {
            /// Parse a tag, falling back to the default.
            pub fn from_tag(tag: &str) -> Self {
                match tag.trim().to_lowercase().as_str() {
                    $( $tag => Self::$variant, )+
                    _ => Self::default(),
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Ok(Self::from_tag(&lenient_string(deserializer)?))
            }
        }
    };
}

type_tag! {
    /// The type of a metadata or party field.
    pub enum FieldType {
        #[default]
        Text => "text",
        Date => "date",
        Number => "number",
        Phone => "phone",
    }
}

type_tag! {
    /// The type of a line item column.
    #[derive(clap::ValueEnum)]
    pub enum ColumnType {
        #[default]
        Text => "text",
        Number => "number",
        Currency => "currency",
    }
}

type_tag! {
    /// The type of a summary field.
    pub enum SummaryType {
        #[default]
        Text => "text",
        Currency => "currency",
        Percentage => "percentage",
        Number => "number",
    }
}

/// A table cell or summary value. Models return clear numbers as numbers, and
/// everything else as text.
#[derive(Clone, Debug, PartialEq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum CellValue {
    /// A number.
    Number(serde_json::Number),
    /// Text, including currency amounts and anything ambiguous.
    Text(String),
}

impl CellValue {
    /// An empty cell.
    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    /// The value as display text.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Number(n) => Cow::Owned(n.to_string()),
            CellValue::Text(s) => Cow::Borrowed(s),
        }
    }
}

impl Default for CellValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n.into())
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => CellValue::empty(),
            Value::Number(n) => CellValue::Number(n),
            Value::String(s) => CellValue::Text(s),
            Value::Bool(b) => CellValue::Text(b.to_string()),
            other => CellValue::Text(other.to_string()),
        })
    }
}

/// An extra labelled value attached to a party (TIN, BIN, email, etc.).
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, JsonSchema)]
pub struct PartyField {
    /// The label.
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: String,

    /// The value.
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,

    /// The kind of value.
    #[serde(default)]
    pub field_type: FieldType,
}

/// The supplier or the buyer.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, JsonSchema)]
pub struct PartyInfo {
    /// The party's name.
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,

    /// The party's address.
    #[serde(
        default,
        deserialize_with = "lenient_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub address: Option<String>,

    /// The party's phone number.
    #[serde(
        default,
        deserialize_with = "lenient_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub phone: Option<String>,

    /// Any other labelled fields, in order.
    ///
    /// Models return these as a JSON object. We also accept a list of
    /// `{ key, value, field_type }` entries, which is what we write.
    #[serde(default, deserialize_with = "party_fields")]
    pub additional: Vec<PartyField>,
}

impl PartyInfo {
    /// Look up an extra field by label.
    #[cfg(test)]
    pub fn additional_value(&self, key: &str) -> Option<&str> {
        self.additional
            .iter()
            .find(|field| field.key == key)
            .map(|field| field.value.as_str())
    }
}

/// Deserialize [`PartyInfo::additional`] from either an object or a list.
fn party_fields<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PartyField>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(vec![]),
        // `serde_json` is built with `preserve_order`, so this keeps the
        // model's ordering.
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| -> Result<PartyField, D::Error> {
                Ok(PartyField {
                    key,
                    value: lenient_string(value).map_err(D::Error::custom)?,
                    field_type: FieldType::Text,
                })
            })
            .collect(),
        list @ Value::Array(_) => serde_json::from_value(list).map_err(D::Error::custom),
        other => Err(de::Error::custom(format!(
            "expected an object or a list of party fields, found {other}"
        ))),
    }
}

/// An extra header-level field (transport, vehicle number, driver, remarks).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, JsonSchema)]
pub struct MetadataField {
    /// Identifier for addressing this entry.
    #[serde(default)]
    pub id: RecordId,

    /// The label, in the document's own language.
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: String,

    /// The value, as written.
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,

    /// The kind of value.
    #[serde(default)]
    pub field_type: FieldType,

    /// How sure the model was.
    #[serde(default)]
    pub confidence: Confidence,
}

impl MetadataField {
    /// A new, hand-entered field.
    pub fn new(key: impl Into<String>, value: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: RecordId::generate(),
            key: key.into(),
            value: value.into(),
            field_type,
            confidence: Confidence::CERTAIN,
        }
    }
}

/// A column of the line item table.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, JsonSchema)]
pub struct ColumnDefinition {
    /// The key used for this column in every row's cells.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,

    /// The header label, in the document's own language.
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: String,

    /// The kind of values in this column.
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,

    /// Optional width hint, as a percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

/// Turn a label into a column ID.
pub fn column_id_for_label(label: &str) -> String {
    static NON_WORD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w]+").expect("failed to compile regex"));
    let lower = label.trim().to_lowercase();
    let id = NON_WORD.replace_all(&lower, "_");
    let id = id.trim_matches('_');
    if id.is_empty() {
        "column".to_owned()
    } else {
        id.to_owned()
    }
}

/// A row of the line item table.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, JsonSchema)]
pub struct LineItemRow {
    /// Identifier for addressing this row.
    #[serde(default)]
    pub id: RecordId,

    /// Cell values, keyed by column ID.
    #[serde(default)]
    pub cells: IndexMap<String, CellValue>,

    /// How sure the model was about this row.
    #[serde(default)]
    pub confidence: Confidence,
}

impl LineItemRow {
    /// Get a cell. Missing cells are `None`.
    pub fn cell(&self, column_id: &str) -> Option<&CellValue> {
        self.cells.get(column_id)
    }

    /// Get a cell as text. Missing cells read as empty.
    pub fn cell_text(&self, column_id: &str) -> Cow<'_, str> {
        self.cell(column_id)
            .map(CellValue::as_text)
            .unwrap_or(Cow::Borrowed(""))
    }
}

/// The line item table. Columns and rows are edited independently, so a row
/// may be missing cells for some columns.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, JsonSchema)]
pub struct LineItems {
    /// Column definitions, in display order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub columns: Vec<ColumnDefinition>,

    /// Rows, in document order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rows: Vec<LineItemRow>,
}

impl LineItems {
    /// Find a column.
    pub fn column(&self, column_id: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    /// Find a row.
    #[cfg(test)]
    pub fn row(&self, row_id: &RecordId) -> Option<&LineItemRow> {
        self.rows.iter().find(|r| &r.id == row_id)
    }

    /// Add a column with a fresh ID, seeding an empty cell in every existing
    /// row. Returns the new column's ID.
    pub fn add_column(&mut self, label: &str, column_type: ColumnType) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("{}_{}", column_id_for_label(label), &suffix[..8]);
        self.columns.push(ColumnDefinition {
            id: id.clone(),
            label: label.to_owned(),
            column_type,
            width: None,
        });
        for row in &mut self.rows {
            row.cells.insert(id.clone(), CellValue::empty());
        }
        id
    }

    /// Remove a column and its cell from every row. Returns `false` if there
    /// was no such column.
    pub fn remove_column(&mut self, column_id: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c.id != column_id);
        if self.columns.len() == before {
            return false;
        }
        for row in &mut self.rows {
            row.cells.shift_remove(column_id);
        }
        true
    }

    /// Rename a column. Returns `false` if there was no such column.
    pub fn rename_column(&mut self, column_id: &str, label: &str) -> bool {
        match self.columns.iter_mut().find(|c| c.id == column_id) {
            Some(column) => {
                column.label = label.to_owned();
                true
            }
            None => false,
        }
    }

    /// Append an empty row with a cell for every column. Returns its ID.
    pub fn add_row(&mut self) -> RecordId {
        let row = LineItemRow {
            id: RecordId::generate(),
            cells: self
                .columns
                .iter()
                .map(|c| (c.id.clone(), CellValue::empty()))
                .collect(),
            confidence: Confidence::CERTAIN,
        };
        let id = row.id.clone();
        self.rows.push(row);
        id
    }

    /// Remove a row. Returns `false` if there was no such row.
    pub fn remove_row(&mut self, row_id: &RecordId) -> bool {
        let before = self.rows.len();
        self.rows.retain(|r| &r.id != row_id);
        self.rows.len() != before
    }

    /// Set a single cell. Returns `false` if there was no such row or column.
    pub fn set_cell(&mut self, row_id: &RecordId, column_id: &str, value: CellValue) -> bool {
        if self.column(column_id).is_none() {
            return false;
        }
        match self.rows.iter_mut().find(|r| &r.id == row_id) {
            Some(row) => {
                row.cells.insert(column_id.to_owned(), value);
                true
            }
            None => false,
        }
    }
}

/// A total, subtotal, tax or discount line.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, JsonSchema)]
pub struct SummaryField {
    /// Identifier for addressing this entry.
    #[serde(default)]
    pub id: RecordId,

    /// The label.
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: String,

    /// The value.
    #[serde(default)]
    pub value: CellValue,

    /// The kind of value.
    #[serde(default)]
    pub field_type: SummaryType,

    /// How sure the model was.
    #[serde(default)]
    pub confidence: Confidence,
}

impl SummaryField {
    /// A new, hand-entered field.
    pub fn new(key: impl Into<String>, value: CellValue, field_type: SummaryType) -> Self {
        Self {
            id: RecordId::generate(),
            key: key.into(),
            value,
            field_type,
            confidence: Confidence::CERTAIN,
        }
    }
}

/// What kind of document this is. We only support one.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[default]
    DeliveryChalan,
}

/// A structured delivery chalan.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, JsonSchema)]
pub struct DeliveryChalanDocument {
    /// Always `delivery_chalan`.
    #[serde(default, deserialize_with = "ignore_document_type")]
    pub document_type: DocumentType,

    /// The chalan number, exactly as written.
    #[serde(default, deserialize_with = "lenient_string")]
    pub chalan_number: String,

    /// The purchase order number, exactly as written.
    #[serde(default, deserialize_with = "lenient_string")]
    pub po_number: String,

    /// The date, exactly as written.
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,

    /// Who is sending the goods.
    #[serde(default)]
    pub supplier: PartyInfo,

    /// Who is receiving the goods.
    #[serde(default)]
    pub buyer: PartyInfo,

    /// Where the goods are delivered, if different from the buyer's address.
    #[serde(
        default,
        deserialize_with = "lenient_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub delivery_address: Option<String>,

    /// Any other header fields.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub additional_metadata: Vec<MetadataField>,

    /// The product table.
    #[serde(default, deserialize_with = "null_or_default")]
    pub line_items: LineItems,

    /// Totals.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub summary: Vec<SummaryField>,

    /// The OCR text this document was structured from.
    #[serde(default)]
    pub raw_ocr_text: String,

    /// The model's overall confidence.
    #[serde(default)]
    pub ai_confidence: Confidence,

    /// The model that structured this document.
    #[serde(default)]
    pub processing_model: String,

    /// When this document was structured.
    #[serde(default = "Utc::now")]
    pub processed_at: DateTime<Utc>,
}

/// We only have one document type, so whatever the model calls it, it's a
/// delivery chalan.
fn ignore_document_type<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DocumentType, D::Error> {
    de::IgnoredAny::deserialize(deserializer)?;
    Ok(DocumentType::DeliveryChalan)
}

fn null_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl DeliveryChalanDocument {
    /// The file name to use when exporting this document.
    pub fn export_file_name(&self) -> String {
        let number = self.chalan_number.trim();
        if number.is_empty() {
            "chalan_export.json".to_owned()
        } else {
            format!("chalan_{}.json", number.replace(['/', '\\'], "_"))
        }
    }

    /// Pretty-printed JSON, as exported.
    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize document")
    }

    /// Labels of every field the model wasn't sure about, in document order.
    pub fn fields_needing_review(&self) -> Vec<(String, Confidence)> {
        let mut fields = vec![];
        for field in &self.additional_metadata {
            fields.push((field.key.clone(), field.confidence));
        }
        for (idx, row) in self.line_items.rows.iter().enumerate() {
            fields.push((format!("line item {}", idx + 1), row.confidence));
        }
        for field in &self.summary {
            fields.push((field.key.clone(), field.confidence));
        }
        fields.retain(|(_, confidence)| confidence.level() != ConfidenceLevel::High);
        fields
    }
}

/// A partial update to a document. Each field that is set replaces the
/// corresponding top-level field of the document wholesale. Nested values are
/// not merged.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DocumentUpdate {
    /// New chalan number.
    pub chalan_number: Option<String>,
    /// New PO number.
    pub po_number: Option<String>,
    /// New date.
    pub date: Option<String>,
    /// New supplier.
    pub supplier: Option<PartyInfo>,
    /// New buyer.
    pub buyer: Option<PartyInfo>,
    /// New delivery address. An empty string clears it.
    pub delivery_address: Option<String>,
    /// New metadata list.
    pub additional_metadata: Option<Vec<MetadataField>>,
    /// New line item table.
    pub line_items: Option<LineItems>,
    /// New summary list.
    pub summary: Option<Vec<SummaryField>>,
}

impl DocumentUpdate {
    /// Does this update change nothing at all?
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply this update to a document.
    pub fn apply_to(self, document: &mut DeliveryChalanDocument) {
        let DocumentUpdate {
            chalan_number,
            po_number,
            date,
            supplier,
            buyer,
            delivery_address,
            additional_metadata,
            line_items,
            summary,
        } = self;
        if let Some(chalan_number) = chalan_number {
            document.chalan_number = chalan_number;
        }
        if let Some(po_number) = po_number {
            document.po_number = po_number;
        }
        if let Some(date) = date {
            document.date = date;
        }
        if let Some(supplier) = supplier {
            document.supplier = supplier;
        }
        if let Some(buyer) = buyer {
            document.buyer = buyer;
        }
        if let Some(delivery_address) = delivery_address {
            document.delivery_address =
                Some(delivery_address).filter(|address| !address.trim().is_empty());
        }
        if let Some(additional_metadata) = additional_metadata {
            document.additional_metadata = additional_metadata;
        }
        if let Some(line_items) = line_items {
            document.line_items = line_items;
        }
        if let Some(summary) = summary {
            document.summary = summary;
        }
    }
}
