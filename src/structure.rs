//! Turning OCR text into a structured delivery chalan.

use std::{collections::HashSet, sync::Arc, sync::LazyLock};

use chrono::Utc;
use regex::Regex;

use crate::{
    document::{DeliveryChalanDocument, DocumentType, RecordId, column_id_for_label},
    drivers::{Driver, GenerateRequest, LlmOpts, Part, TokenUsage},
    error::ChalanError,
    llm_client::GeminiConfig,
    prelude::*,
    prompt::Prompt,
};

/// A structured document, plus what it cost to make.
#[derive(Clone, Debug)]
pub struct StructureResult {
    /// The hydrated document.
    pub document: DeliveryChalanDocument,

    /// Token usage, if the API reported it.
    pub token_usage: Option<TokenUsage>,
}

/// Structures OCR text using an LLM.
#[derive(Clone, Debug)]
pub struct StructuringClient {
    driver: Arc<dyn Driver>,
    config: GeminiConfig,
    prompt: Prompt,
    llm_opts: LlmOpts,
}

impl StructuringClient {
    /// Create a new structuring client.
    pub fn new(
        driver: Arc<dyn Driver>,
        config: GeminiConfig,
        prompt: Prompt,
        llm_opts: LlmOpts,
    ) -> Self {
        Self {
            driver,
            config,
            prompt,
            llm_opts,
        }
    }

    /// Structure the OCR text of a delivery chalan. This makes exactly one API
    /// call, or none at all if we have no API key.
    #[instrument(level = "debug", skip_all, fields(model = %model))]
    pub async fn structure_delivery_chalan(
        &self,
        raw_text: &str,
        model: &str,
    ) -> Result<StructureResult, ChalanError> {
        let api_key = self.config.require_api_key()?;

        let mut parts = vec![Part::Text(raw_text.to_owned())];
        if let Some(user) = &self.prompt.user {
            parts.push(Part::Text(user.clone()));
        }
        let request = GenerateRequest {
            model: model.to_owned(),
            system_instruction: self.prompt.system.clone(),
            parts,
            temperature: self.llm_opts.temperature,
            response_mime_type: Some("application/json".to_owned()),
        };

        let response = self
            .driver
            .generate_content(api_key, &request, &self.llm_opts)
            .await
            .inspect_err(|err| error!("Structuring error: {}", err))?;

        let document = response
            .text
            .as_deref()
            .ok_or_else(|| ChalanError::Structuring("Model returned empty response.".to_owned()))
            .and_then(|text| parse_document(text, raw_text, model))
            .inspect_err(|err| error!("Structuring error: {}", err))?;
        debug!(
            rows = document.line_items.rows.len(),
            usage = ?response.token_usage,
            "Structuring complete"
        );

        Ok(StructureResult {
            document,
            token_usage: response.token_usage,
        })
    }
}

/// Remove a Markdown code fence wrapped around a reply, if there is one.
pub fn strip_code_fences(text: &str) -> &str {
    static FENCED: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*(?:```)?$").expect("failed to compile regex")
    });
    let text = text.trim();
    match FENCED.captures(text).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str(),
        None => text,
    }
}

/// Parse and hydrate a structuring reply.
fn parse_document(
    reply: &str,
    raw_text: &str,
    model: &str,
) -> Result<DeliveryChalanDocument, ChalanError> {
    let json = strip_code_fences(reply);
    if json.is_empty() {
        return Err(ChalanError::Structuring(
            "Model returned empty response.".to_owned(),
        ));
    }
    let value = serde_json::from_str::<Value>(json)
        .map_err(|err| ChalanError::Structuring(format!("Invalid JSON: {err}")))?;
    if !value.is_object() {
        return Err(ChalanError::Structuring(
            "Expected a JSON object.".to_owned(),
        ));
    }
    let mut document = serde_json::from_value::<DeliveryChalanDocument>(value)
        .map_err(|err| ChalanError::Structuring(format!("Unexpected document shape: {err}")))?;
    hydrate(&mut document, raw_text, model);
    Ok(document)
}

/// Stamp provenance, and give every list entry a fresh ID.
fn hydrate(document: &mut DeliveryChalanDocument, raw_text: &str, model: &str) {
    document.document_type = DocumentType::DeliveryChalan;
    document.processing_model = model.to_owned();
    document.processed_at = Utc::now();
    document.raw_ocr_text = raw_text.to_owned();

    for field in &mut document.additional_metadata {
        field.id = RecordId::generate();
    }
    for field in &mut document.summary {
        field.id = RecordId::generate();
    }
    for row in &mut document.line_items.rows {
        row.id = RecordId::generate();
    }

    // Column IDs are cell keys, so we only fix the ones that are unusable.
    let mut seen = HashSet::new();
    let line_items = &mut document.line_items;
    for column in &mut line_items.columns {
        let original = column.id.trim().to_owned();
        let base = if original.is_empty() {
            column_id_for_label(&column.label)
        } else {
            original.clone()
        };
        let mut id = base.clone();
        let mut suffix = 2;
        while !seen.insert(id.clone()) {
            id = format!("{base}_{suffix}");
            suffix += 1;
        }
        if id == original {
            continue;
        }
        // If the model keyed cells by label, move them to the new ID.
        if original.is_empty() {
            for row in &mut line_items.rows {
                if let Some(value) = row.cells.shift_remove(&column.label) {
                    row.cells.insert(id.clone(), value);
                }
            }
        }
        debug!(label = %column.label, from = %original, to = %id, "Renamed column");
        column.id = id;
    }
}
