//! AAS Part 2 path and query encoding.
//!
//! - Identifiers of Identifiables travel base64url-encoded without padding
//! - idShortPaths travel percent-encoded, keeping `[]` for list indices
//! - Discovery lookups take each asset id as base64url-encoded JSON
//!
//! # References
//!
//! - IDTA 01002-3-0: Specification of the Asset Administration Shell Part 2

use aas_bridge_core::SpecificAssetId;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped inside an idShortPath segment.
const IDSHORT_PATH_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\');

/// Encode an identifier for use in a URL path.
///
/// # Examples
///
/// ```
/// use aas_bridge_client::encode_id_base64url;
///
/// let encoded = encode_id_base64url("urn:example:aas:asset1");
/// assert_eq!(encoded, "dXJuOmV4YW1wbGU6YWFzOmFzc2V0MQ");
/// ```
#[must_use]
pub fn encode_id_base64url(id: &str) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

/// Decode an identifier taken from a URL path.
///
/// # Errors
///
/// Returns error if the input is not base64url or not UTF-8.
pub fn decode_id_base64url(encoded: &str) -> Result<String, EncodingError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| EncodingError::Base64Decode(e.to_string()))?;

    String::from_utf8(bytes).map_err(|e| EncodingError::Utf8Decode(e.to_string()))
}

/// Percent-encode an idShortPath.
///
/// # Examples
///
/// ```
/// use aas_bridge_client::encode_idshort_path;
///
/// assert_eq!(encode_idshort_path("Documents[0].File"), "Documents[0].File");
/// assert_eq!(encode_idshort_path("Operating Manual"), "Operating%20Manual");
/// ```
#[must_use]
pub fn encode_idshort_path(path: &str) -> String {
    utf8_percent_encode(path, IDSHORT_PATH_ESCAPE).to_string()
}

/// Decode a percent-encoded idShortPath.
///
/// # Errors
///
/// Returns error if the decoded bytes are not UTF-8.
pub fn decode_idshort_path(encoded: &str) -> Result<String, EncodingError> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| EncodingError::Utf8Decode(e.to_string()))
}

/// Encode an asset id as the `assetIds` query value of a discovery lookup.
///
/// The value is the JSON object `{"name": .., "value": ..}`, base64url-encoded.
#[must_use]
pub fn encode_asset_id_query(asset_id: &SpecificAssetId) -> String {
    let json = serde_json::json!({ "name": asset_id.name, "value": asset_id.value });
    encode_id_base64url(&json.to_string())
}

/// Errors that can occur during decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// Base64 decoding failed
    #[error("base64 decode error: {0}")]
    Base64Decode(String),
    /// UTF-8 decoding failed
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(String),
}
