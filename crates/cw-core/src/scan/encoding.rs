//! Encoding detection and normalization to UTF-8.
//!
//! Detection priority: BOM first (most reliable), then UTF-8 validation,
//! then chardetng's statistical guess. Everything decodes to UTF-8; callers
//! treat a remaining NUL byte as the binary marker.

use chardetng::EncodingDetector;
use encoding_rs::{UTF_16BE, UTF_16LE, UTF_8};

/// UTF-8 BOM: EF BB BF
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
/// UTF-16 LE BOM: FF FE
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
/// UTF-16 BE BOM: FE FF
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Decode raw file bytes to normalized UTF-8 text.
pub fn decode_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    if bytes.starts_with(UTF8_BOM) {
        return String::from_utf8_lossy(&bytes[UTF8_BOM.len()..]).into_owned();
    }
    if bytes.starts_with(UTF16_LE_BOM) {
        let (text, _, _) = UTF_16LE.decode(&bytes[UTF16_LE_BOM.len()..]);
        return text.into_owned();
    }
    if bytes.starts_with(UTF16_BE_BOM) {
        let (text, _, _) = UTF_16BE.decode(&bytes[UTF16_BE_BOM.len()..]);
        return text.into_owned();
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let (encoding, confident) = detector.guess_assess(None, true);
    if confident && encoding != UTF_8 {
        let (text, _, _) = encoding.decode(bytes);
        return text.into_owned();
    }

    // Default: UTF-8 with replacement.
    String::from_utf8_lossy(bytes).into_owned()
}

/// Binary marker: decoded text still containing NUL.
pub fn looks_binary(text: &str) -> bool {
    text.contains('\0')
}
