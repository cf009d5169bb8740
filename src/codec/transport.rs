//! Base64 transport encoding

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::Result;

/// Prefix a data URL carries in front of base64 WAV payloads
pub const DATA_URL_PREFIX: &str = "data:audio/wav;base64,";

/// Encode bytes as standard base64
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64, tolerating a `data:audio/wav;base64,` prefix
///
/// # Errors
///
/// Returns [`crate::Error::Decode`] if the payload is not valid base64
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let payload = trimmed.strip_prefix(DATA_URL_PREFIX).unwrap_or(trimmed);
    Ok(STANDARD.decode(payload)?)
}
