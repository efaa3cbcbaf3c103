use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::errors::EditError;

const DATA_URL_SEPARATOR: &str = ";base64,";

/// An image as the models exchange it: a mime type plus base64 text.
///
/// Payloads are never mutated; every edit step produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    mime_type: String,
    data: String,
}

impl ImagePayload {
    /// Wraps data that is already base64 encoded.
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(mime_type, BASE64.encode(bytes))
    }

    /// Loads an uploaded image file. The mime type is sniffed from the file
    /// contents first and from the extension second.
    pub fn from_path(path: &Path) -> Result<Self, EditError> {
        let bytes = fs::read(path).map_err(|err| {
            EditError::InvalidImage(format!("failed reading {}: {err}", path.display()))
        })?;
        let mime_type = sniff_mime(&bytes)
            .or_else(|| mime_for_path(path))
            .ok_or_else(|| EditError::InvalidImage("Could not determine mime type".to_string()))?;
        Ok(Self::from_bytes(&bytes, mime_type))
    }

    /// Parses `data:<mime>;base64,<data>`.
    pub fn from_data_url(raw: &str) -> Result<Self, EditError> {
        let Some((header, data)) = raw.split_once(DATA_URL_SEPARATOR) else {
            return Err(EditError::InvalidImage("Invalid file format".to_string()));
        };
        let mime_type = header
            .strip_prefix("data:")
            .filter(|value| !value.is_empty())
            .ok_or_else(|| EditError::InvalidImage("Could not determine mime type".to_string()))?;
        if data.is_empty() {
            return Err(EditError::InvalidImage("Invalid file format".to_string()));
        }
        Ok(Self::new(mime_type, data))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{}{}{}", self.mime_type, DATA_URL_SEPARATOR, self.data)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Base64 text, as sent to the model.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn decode(&self) -> Result<Vec<u8>, EditError> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|err| EditError::InvalidImage(format!("base64 decode failed: {err}")))
    }

    pub fn file_extension(&self) -> &'static str {
        let lowered = self.mime_type.to_ascii_lowercase();
        if lowered.contains("jpeg") || lowered.contains("jpg") {
            return "jpg";
        }
        if lowered.contains("webp") {
            return "webp";
        }
        if lowered.contains("gif") {
            return "gif";
        }
        "png"
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context as _;

        let bytes = self.decode()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::WebP => Some("image/webp"),
        image::ImageFormat::Gif => Some("image/gif"),
        image::ImageFormat::Bmp => Some("image/bmp"),
        image::ImageFormat::Tiff => Some("image/tiff"),
        _ => None,
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}
