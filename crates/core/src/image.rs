//! Optional source image attached to a generation request.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Image reference forwarded upstream as-is (usually a `data:` URI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceImage(String);

/// Raw image bytes recovered from a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl SourceImage {
    pub fn new(reference: impl Into<String>) -> Result<Self, DomainError> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(DomainError::validation("image_data must not be empty"));
        }
        Ok(Self(reference))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Split `data:<mime>;base64,<payload>` into its MIME type and bytes.
    pub fn decode(&self) -> Result<DecodedImage, DomainError> {
        let rest = self
            .0
            .strip_prefix("data:")
            .ok_or_else(|| DomainError::validation("source image is not a data URI"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| DomainError::validation("data URI has no payload separator"))?;

        let mut parts = header.split(';');
        let media_type = parts.next().unwrap_or_default();
        if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(DomainError::validation("only base64 data URIs are supported"));
        }
        let media_type = if media_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            media_type.to_string()
        };

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| DomainError::validation(format!("invalid base64 image payload: {e}")))?;

        Ok(DecodedImage { media_type, bytes })
    }
}
