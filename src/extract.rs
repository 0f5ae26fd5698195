//! Binary payload extraction
//!
//! Walks a protocol response and diverts large base64-encoded fields
//! (screenshots, captured bodies) to files on disk, substituting a file
//! reference so the tool response stays bounded. The structure's topology is
//! preserved exactly; only matching string values are replaced.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CdpError;

/// Response fields that commonly carry encoded binary payloads
pub const DEFAULT_BINARY_FIELDS: &[&str] = &["data", "content", "body", "screenshot"];

/// Strings at or below this length are never externalized
pub const DEFAULT_MIN_BINARY_LEN: usize = 1000;

/// Externalize binary payloads using the default field names and length
/// threshold.
pub fn externalize_binary_fields(value: &Value, output_dir: &Path) -> Value {
    externalize_with_options(value, output_dir, DEFAULT_BINARY_FIELDS, DEFAULT_MIN_BINARY_LEN)
}

/// Recursively rebuild `value`, replacing qualifying strings with a file
/// reference. A value qualifies when its key is one of `fields`, it is longer
/// than `min_len`, and it reads as base64 (alphabet only, length a multiple
/// of four, padding at the end). Write failures degrade into a placeholder
/// string; this pass never fails.
pub fn externalize_with_options(
    value: &Value,
    output_dir: &Path,
    fields: &[&str],
    min_len: usize,
) -> Value {
    match value {
        Value::Object(map) => {
            let rebuilt = map
                .iter()
                .map(|(key, val)| {
                    let replacement = match val {
                        Value::String(s)
                            if fields.contains(&key.as_str())
                                && s.len() > min_len
                                && is_base64_payload(s) =>
                        {
                            Value::String(externalize_field(key, s, output_dir))
                        }
                        other => externalize_with_options(other, output_dir, fields, min_len),
                    };
                    (key.clone(), replacement)
                })
                .collect();
            Value::Object(rebuilt)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| externalize_with_options(item, output_dir, fields, min_len))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Decode and persist one payload, returning the replacement string.
fn externalize_field(field: &str, encoded: &str, output_dir: &Path) -> String {
    match persist_payload(field, encoded, output_dir) {
        Ok(path) => {
            debug!("Externalized '{}' ({} chars) to {}", field, encoded.len(), path.display());
            format!("binary data saved to: {}", path.display())
        }
        Err(e) => {
            let reason = match &e {
                CdpError::ExtractionWrite(reason) => reason.clone(),
                other => other.to_string(),
            };
            warn!("Binary extraction failed for field '{}': {}", field, reason);
            format!("failed to save binary data: {}", reason)
        }
    }
}

fn persist_payload(field: &str, encoded: &str, output_dir: &Path) -> Result<PathBuf, CdpError> {
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| CdpError::ExtractionWrite(format!("invalid base64: {}", e)))?;

    std::fs::create_dir_all(output_dir)
        .map_err(|e| CdpError::ExtractionWrite(format!("cannot create {}: {}", output_dir.display(), e)))?;

    let file_name = format!(
        "{}_{}_{}{}",
        field,
        Utc::now().format("%Y%m%d_%H%M%S"),
        &Uuid::new_v4().simple().to_string()[..8],
        sniff_extension(&decoded, field),
    );
    let path = output_dir.join(file_name);

    std::fs::write(&path, &decoded)
        .map_err(|e| CdpError::ExtractionWrite(format!("cannot write {}: {}", path.display(), e)))?;

    Ok(path)
}

/// Base64 alphabet check: length a multiple of four, `=` only as trailing
/// padding. Deliberately a heuristic — a long alphabet-only string under a
/// candidate key is treated as binary even if it never was.
fn is_base64_payload(s: &str) -> bool {
    if s.is_empty() || s.len() % 4 != 0 {
        return false;
    }
    let bytes = s.as_bytes();
    let padding = bytes.iter().rev().take_while(|&&b| b == b'=').count();
    if padding > 2 {
        return false;
    }
    bytes[..bytes.len() - padding]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

/// Pick a file extension from the decoded payload's magic bytes, falling back
/// on the field name. Best-effort only.
fn sniff_extension(decoded: &[u8], field: &str) -> &'static str {
    if decoded.starts_with(&[0x89, b'P', b'N', b'G']) {
        ".png"
    } else if decoded.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ".jpg"
    } else if decoded.starts_with(b"%PDF") {
        ".pdf"
    } else if field == "data" || field == "screenshot" {
        ".png"
    } else {
        ".bin"
    }
}
