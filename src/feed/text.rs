//! Text cleanup for feed content: mojibake repair and HTML entity decoding.
//!
//! Supplier feeds routinely arrive double-encoded (UTF-8 bytes read back as
//! Latin-1) and with escaped entities inside CDATA sections. Normalization
//! here keeps the staged checksums stable across syncs.

/// Repair UTF-8 text that was mis-decoded as Latin-1 ("HygienickÃ½" -> "Hygienický").
///
/// Only strings whose every char fits in Latin-1 are candidates; anything else
/// is already proper text and is returned unchanged, as is any candidate whose
/// byte form fails UTF-8 validation.
pub fn fix_mojibake(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }

    if text.chars().any(|c| c as u32 > 0xFF) {
        return text.to_string();
    }

    let bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
    match String::from_utf8(bytes) {
        Ok(repaired) => repaired,
        Err(_) => text.to_string(),
    }
}

/// Decode the HTML entities suppliers leave escaped inside CDATA.
pub fn decode_html_entities(text: &str) -> String {
    text.replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
}

/// Full cleanup applied to every text field pulled from a feed.
pub fn normalize(text: &str) -> String {
    decode_html_entities(&fix_mojibake(text)).trim().to_string()
}
