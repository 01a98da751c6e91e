//! Text-safe encoding of binary attachments.
//!
//! Photos and documents are queued as `data:<mime>;base64,<payload>` strings
//! so they survive the JSON column of the durable store. Replay decodes them
//! back into raw bytes for a multipart upload.

use crate::{error::Result, Error};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Mime type used when a data URL does not declare one.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// A decoded binary attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBinary {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// A file queued for upload, stored with its content as a data URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryAttachment {
    /// Multipart field name the server expects for the file
    pub field_name: String,
    /// File name sent in the multipart part
    pub file_name: String,
    /// `data:<mime>;base64,<payload>`
    pub data_url: String,
}

impl BinaryAttachment {
    /// Encode raw bytes into a new attachment.
    pub fn from_bytes(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        mime: &str,
        bytes: &[u8],
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            data_url: encode_data_url(mime, bytes),
        }
    }

    /// Decode the stored data URL.
    pub fn decode(&self) -> Result<DecodedBinary> {
        decode_data_url(&self.data_url)
    }
}

/// Encode bytes as a base64 data URL.
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Decode a base64 data URL into its mime type and bytes.
///
/// Only base64 data URLs are accepted; percent-encoded text URLs are never
/// produced by the queue.
pub fn decode_data_url(url: &str) -> Result<DecodedBinary> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::InvalidDataUrl("missing data: scheme".into()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::InvalidDataUrl("missing comma separator".into()))?;

    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::InvalidDataUrl("not base64 encoded".into()))?;

    let mime = if mime.is_empty() {
        DEFAULT_MIME.to_string()
    } else {
        mime.to_string()
    };

    // Some encoders wrap lines
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::InvalidDataUrl(e.to_string()))?;

    Ok(DecodedBinary { mime, bytes })
}
