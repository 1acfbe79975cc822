//! Input documents.

use std::fmt;

use crate::{
    data_url::{base64_encode, data_url},
    drivers::Part,
    error::ChalanError,
    prelude::*,
};

/// An image or PDF, loaded into memory and ready to send.
#[derive(Clone)]
pub struct SourceFile {
    /// A name for log messages, usually the file name.
    name: String,

    /// The media type of the file. Always `image/*` or `application/pdf`.
    mime_type: String,

    /// The raw bytes.
    data: Vec<u8>,
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl SourceFile {
    /// Wrap bytes we already have. `name` is used to guess the media type if
    /// we can't detect it from the data.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self, ChalanError> {
        let name = name.into();
        let mime_type = detect_mime_type(&name, &data);
        if !is_supported_mime_type(&mime_type) {
            return Err(ChalanError::UnsupportedMediaType { mime_type });
        }
        Ok(Self {
            name,
            mime_type,
            data,
        })
    }

    /// Load a file from disk.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file at path: {:?}", path))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let source = Self::from_bytes(name, data)?;
        debug!(mime_type = %source.mime_type, len = source.data.len(), "Loaded source file");
        Ok(source)
    }

    /// A name for log messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The media type.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The Base64-encoded contents.
    pub fn base64(&self) -> String {
        base64_encode(&self.data)
    }

    /// A `data:` URL, for previewing the original next to the results.
    pub fn preview_url(&self) -> String {
        data_url(&self.mime_type, &self.data)
    }

    /// The file as an inline request part.
    pub fn to_part(&self) -> Part {
        Part::InlineData {
            mime_type: self.mime_type.clone(),
            data: self.base64(),
        }
    }
}

/// Sniff the media type from magic bytes, falling back to the file extension.
fn detect_mime_type(name: &str, data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_owned();
    }
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_owned()
}

/// Can we send this to the model?
pub fn is_supported_mime_type(mime_type: &str) -> bool {
    mime_type.starts_with("image/") || mime_type == "application/pdf"
}
