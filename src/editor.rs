//! Editing a structured document.
//!
//! Every edit goes through [`EditorSession::update`], which applies one
//! [`DocumentUpdate`] and counts it as one correction. The higher-level
//! operations below build that update for you: they copy the affected
//! top-level field, change the copy, and submit it as a whole-field
//! replacement.

use clap::ValueEnum;

use crate::{
    document::{
        CellValue, ColumnType, DeliveryChalanDocument, DocumentUpdate, FieldType, LineItems,
        MetadataField, PartyField, PartyInfo, RecordId, SummaryField, SummaryType,
    },
    prelude::*,
};

/// A top-level text field of the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum HeaderField {
    ChalanNumber,
    PoNumber,
    Date,
    DeliveryAddress,
}

/// Which party.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PartyRole {
    Supplier,
    Buyer,
}

/// A fixed field of a party.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartyDetail {
    Name,
    Address,
    Phone,
}

/// A document being corrected by hand.
#[derive(Clone, Debug)]
pub struct EditorSession {
    /// The current document.
    document: DeliveryChalanDocument,

    /// How many updates have been applied.
    corrections: usize,
}

impl EditorSession {
    /// Start editing a document.
    pub fn new(document: DeliveryChalanDocument) -> Self {
        Self {
            document,
            corrections: 0,
        }
    }

    /// The current document.
    pub fn document(&self) -> &DeliveryChalanDocument {
        &self.document
    }

    /// How many corrections have been made so far.
    pub fn corrections(&self) -> usize {
        self.corrections
    }

    /// Apply an update. Empty updates change nothing and aren't counted.
    /// Returns `true` if the update was applied.
    pub fn update(&mut self, update: DocumentUpdate) -> bool {
        if update.is_empty() {
            return false;
        }
        update.apply_to(&mut self.document);
        self.corrections += 1;
        trace!(corrections = self.corrections, "Applied document update");
        true
    }

    /// Set a header field.
    pub fn set_header(&mut self, field: HeaderField, value: &str) -> bool {
        let value = Some(value.to_owned());
        let update = match field {
            HeaderField::ChalanNumber => DocumentUpdate {
                chalan_number: value,
                ..DocumentUpdate::default()
            },
            HeaderField::PoNumber => DocumentUpdate {
                po_number: value,
                ..DocumentUpdate::default()
            },
            HeaderField::Date => DocumentUpdate {
                date: value,
                ..DocumentUpdate::default()
            },
            HeaderField::DeliveryAddress => DocumentUpdate {
                delivery_address: value,
                ..DocumentUpdate::default()
            },
        };
        self.update(update)
    }

    /// Set one of a party's fixed fields. Blank addresses and phone numbers
    /// are cleared.
    pub fn set_party_detail(&mut self, role: PartyRole, detail: PartyDetail, value: &str) -> bool {
        self.edit_party(role, |party| {
            let optional = Some(value.to_owned()).filter(|v| !v.trim().is_empty());
            match detail {
                PartyDetail::Name => party.name = value.to_owned(),
                PartyDetail::Address => party.address = optional,
                PartyDetail::Phone => party.phone = optional,
            }
            true
        })
    }

    /// Set an extra party field, adding it at the end if it doesn't exist.
    pub fn set_party_additional(&mut self, role: PartyRole, key: &str, value: &str) -> bool {
        self.edit_party(role, |party| {
            match party.additional.iter_mut().find(|field| field.key == key) {
                Some(field) => field.value = value.to_owned(),
                None => party.additional.push(PartyField {
                    key: key.to_owned(),
                    value: value.to_owned(),
                    field_type: FieldType::Text,
                }),
            }
            true
        })
    }

    /// Remove an extra party field.
    pub fn remove_party_additional(&mut self, role: PartyRole, key: &str) -> bool {
        self.edit_party(role, |party| {
            let before = party.additional.len();
            party.additional.retain(|field| field.key != key);
            party.additional.len() != before
        })
    }

    /// Add a metadata field at the end. Returns its ID.
    pub fn add_metadata(&mut self, key: &str, value: &str, field_type: FieldType) -> RecordId {
        let field = MetadataField::new(key, value, field_type);
        let id = field.id.clone();
        self.edit_metadata(|metadata| {
            metadata.push(field);
            true
        });
        id
    }

    /// Change a metadata field's label and value.
    pub fn update_metadata(&mut self, id: &RecordId, key: &str, value: &str) -> bool {
        self.edit_metadata(|metadata| match metadata.iter_mut().find(|f| &f.id == id) {
            Some(field) => {
                field.key = key.to_owned();
                field.value = value.to_owned();
                true
            }
            None => false,
        })
    }

    /// Remove a metadata field.
    pub fn remove_metadata(&mut self, id: &RecordId) -> bool {
        self.edit_metadata(|metadata| {
            let before = metadata.len();
            metadata.retain(|f| &f.id != id);
            metadata.len() != before
        })
    }

    /// Add a summary field at the end. Returns its ID.
    pub fn add_summary(&mut self, key: &str, value: CellValue, field_type: SummaryType) -> RecordId {
        let field = SummaryField::new(key, value, field_type);
        let id = field.id.clone();
        self.edit_summary(|summary| {
            summary.push(field);
            true
        });
        id
    }

    /// Change a summary field's label and value.
    pub fn update_summary(&mut self, id: &RecordId, key: &str, value: CellValue) -> bool {
        self.edit_summary(|summary| match summary.iter_mut().find(|f| &f.id == id) {
            Some(field) => {
                field.key = key.to_owned();
                field.value = value;
                true
            }
            None => false,
        })
    }

    /// Remove a summary field.
    pub fn remove_summary(&mut self, id: &RecordId) -> bool {
        self.edit_summary(|summary| {
            let before = summary.len();
            summary.retain(|f| &f.id != id);
            summary.len() != before
        })
    }

    /// Add a line item column. Returns its ID.
    pub fn add_column(&mut self, label: &str, column_type: ColumnType) -> String {
        let mut items = self.document.line_items.clone();
        let column_id = items.add_column(label, column_type);
        self.submit_line_items(items);
        column_id
    }

    /// Rename a line item column.
    pub fn rename_column(&mut self, column_id: &str, label: &str) -> bool {
        self.edit_line_items(|items| items.rename_column(column_id, label))
    }

    /// Remove a line item column and all its cells.
    pub fn remove_column(&mut self, column_id: &str) -> bool {
        self.edit_line_items(|items| items.remove_column(column_id))
    }

    /// Add an empty line item row. Returns its ID.
    pub fn add_row(&mut self) -> RecordId {
        let mut items = self.document.line_items.clone();
        let row_id = items.add_row();
        self.submit_line_items(items);
        row_id
    }

    /// Remove a line item row.
    pub fn remove_row(&mut self, row_id: &RecordId) -> bool {
        self.edit_line_items(|items| items.remove_row(row_id))
    }

    /// Set one cell of the line item table.
    pub fn update_cell(&mut self, row_id: &RecordId, column_id: &str, value: CellValue) -> bool {
        self.edit_line_items(|items| items.set_cell(row_id, column_id, value))
    }

    /// Edit a copy of a party, and submit it if `f` returns `true`.
    fn edit_party(&mut self, role: PartyRole, f: impl FnOnce(&mut PartyInfo) -> bool) -> bool {
        let mut party = match role {
            PartyRole::Supplier => self.document.supplier.clone(),
            PartyRole::Buyer => self.document.buyer.clone(),
        };
        if !f(&mut party) {
            return false;
        }
        let update = match role {
            PartyRole::Supplier => DocumentUpdate {
                supplier: Some(party),
                ..DocumentUpdate::default()
            },
            PartyRole::Buyer => DocumentUpdate {
                buyer: Some(party),
                ..DocumentUpdate::default()
            },
        };
        self.update(update)
    }

    fn edit_metadata(&mut self, f: impl FnOnce(&mut Vec<MetadataField>) -> bool) -> bool {
        let mut metadata = self.document.additional_metadata.clone();
        f(&mut metadata)
            && self.update(DocumentUpdate {
                additional_metadata: Some(metadata),
                ..DocumentUpdate::default()
            })
    }

    fn edit_summary(&mut self, f: impl FnOnce(&mut Vec<SummaryField>) -> bool) -> bool {
        let mut summary = self.document.summary.clone();
        f(&mut summary)
            && self.update(DocumentUpdate {
                summary: Some(summary),
                ..DocumentUpdate::default()
            })
    }

    fn edit_line_items(&mut self, f: impl FnOnce(&mut LineItems) -> bool) -> bool {
        let mut items = self.document.line_items.clone();
        f(&mut items) && self.submit_line_items(items)
    }

    fn submit_line_items(&mut self, items: LineItems) -> bool {
        self.update(DocumentUpdate {
            line_items: Some(items),
            ..DocumentUpdate::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Confidence, tests::sample_document};

    fn session() -> EditorSession {
        EditorSession::new(sample_document())
    }

    #[test]
    fn each_update_is_one_correction() {
        let mut session = session();
        assert!(session.set_header(HeaderField::ChalanNumber, "DC-2000"));
        assert!(session.set_header(HeaderField::Date, "13/03/2024"));
        assert_eq!(session.corrections(), 2);
        assert_eq!(session.document().chalan_number, "DC-2000");
        assert_eq!(session.document().date, "13/03/2024");
    }

    #[test]
    fn empty_updates_are_ignored() {
        let mut session = session();
        assert!(!session.update(DocumentUpdate::default()));
        assert_eq!(session.corrections(), 0);
    }

    #[test]
    fn edits_to_unknown_ids_are_not_corrections() {
        let mut session = session();
        let missing = RecordId::from("missing");
        assert!(!session.remove_row(&missing));
        assert!(!session.update_cell(&missing, "qty", 1.into()));
        assert!(!session.remove_metadata(&missing));
        assert!(!session.remove_column("missing"));
        assert_eq!(session.corrections(), 0);
        assert_eq!(session.document(), &sample_document());
    }

    #[test]
    fn cells_need_an_existing_column() {
        let mut session = session();
        let row = RecordId::from("r1");
        assert!(!session.update_cell(&row, "no_such_column", "x".into()));
        assert_eq!(session.corrections(), 0);
        let cells = &session.document().line_items.rows[0].cells;
        assert!(!cells.contains_key("no_such_column"));
        assert_eq!(session.document(), &sample_document());
    }

    #[test]
    fn adding_a_column_is_one_correction() {
        let mut session = session();
        let id = session.add_column("Rate", ColumnType::Currency);
        assert_eq!(session.corrections(), 1);
        let items = &session.document().line_items;
        assert_eq!(items.columns.len(), 3);
        assert!(items.rows.iter().all(|row| row.cell(&id).is_some()));
    }

    #[test]
    fn removing_a_column_removes_its_cells() {
        let mut session = session();
        assert!(session.remove_column("qty"));
        let items = &session.document().line_items;
        assert!(items.rows.iter().all(|row| row.cell("qty").is_none()));
        assert_eq!(items.rows[0].cell_text("product"), "Rice");
    }

    #[test]
    fn rows_can_be_added_edited_and_removed() {
        let mut session = session();
        let id = session.add_row();
        assert!(session.update_cell(&id, "product", "Sugar".into()));
        assert!(session.update_cell(&id, "qty", 3.into()));
        let row = session.document().line_items.row(&id).unwrap();
        assert_eq!(row.cell_text("product"), "Sugar");
        assert_eq!(row.cell_text("qty"), "3");
        assert!(session.remove_row(&id));
        assert_eq!(session.document().line_items.rows.len(), 2);
        assert_eq!(session.corrections(), 4);
    }

    #[test]
    fn rows_keep_their_order() {
        let mut session = session();
        session.add_row();
        let first = session.document().line_items.rows[0].id.clone();
        session.remove_row(&first);
        let products = session
            .document()
            .line_items
            .rows
            .iter()
            .map(|row| row.cell_text("product").into_owned())
            .collect::<Vec<_>>();
        assert_eq!(products, ["Lentils", ""]);
    }

    #[test]
    fn party_edits_touch_only_that_party() {
        let mut session = session();
        let buyer = session.document().buyer.clone();
        assert!(session.set_party_detail(PartyRole::Supplier, PartyDetail::Phone, "01700000000"));
        assert!(session.set_party_additional(PartyRole::Supplier, "TIN", "111"));
        assert!(session.set_party_additional(PartyRole::Supplier, "Email", "a@b.c"));
        assert!(session.remove_party_additional(PartyRole::Supplier, "BIN"));
        assert!(!session.remove_party_additional(PartyRole::Supplier, "BIN"));

        let supplier = &session.document().supplier;
        assert_eq!(supplier.phone.as_deref(), Some("01700000000"));
        let keys = supplier
            .additional
            .iter()
            .map(|f| f.key.as_str())
            .collect::<Vec<_>>();
        assert_eq!(keys, ["TIN", "Email"]);
        assert_eq!(supplier.additional_value("TIN"), Some("111"));
        assert_eq!(session.document().buyer, buyer);
        assert_eq!(session.corrections(), 4);
    }

    #[test]
    fn hand_entered_fields_are_certain() {
        let mut session = session();
        let id = session.add_metadata("Driver", "Jamal", FieldType::Text);
        let field = session
            .document()
            .additional_metadata
            .iter()
            .find(|f| f.id == id)
            .unwrap();
        assert_eq!(field.confidence, Confidence::CERTAIN);

        let id = session.add_summary("VAT", "৳ 750".into(), SummaryType::Currency);
        assert!(session.update_summary(&id, "VAT (15%)", 750.into()));
        let field = session.document().summary.last().unwrap();
        assert_eq!(field.key, "VAT (15%)");
        assert_eq!(field.value, CellValue::from(750));
        assert!(session.remove_summary(&id));
        assert_eq!(session.document().summary.len(), 1);
    }

    #[test]
    fn metadata_updates_keep_confidence() {
        let mut session = session();
        let id = RecordId::from("m1");
        assert!(session.update_metadata(&id, "Vehicle No", "DHA-11-9999"));
        let field = &session.document().additional_metadata[0];
        assert_eq!(field.key, "Vehicle No");
        assert!((field.confidence.value() - 0.95).abs() < 1e-9);
    }

    #[test]
    fn clearing_the_delivery_address() {
        let mut session = session();
        session.set_header(HeaderField::DeliveryAddress, "Gulshan 2");
        assert_eq!(
            session.document().delivery_address.as_deref(),
            Some("Gulshan 2")
        );
        session.set_header(HeaderField::DeliveryAddress, "");
        assert_eq!(session.document().delivery_address, None);
    }
}
