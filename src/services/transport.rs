//! Decoding of base64 upload payloads, optionally wrapped in a `data:` URL.

use base64::{Engine as _, engine::general_purpose};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid base64 payload: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

/// Strip a `data:<mime>;base64,` prefix if present.
pub fn strip_data_url(encoded: &str) -> &str {
    let trimmed = encoded.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, payload)) = trimmed.split_once(',') {
            return payload;
        }
    }
    trimmed
}

/// Exact decoded size of a well-formed base64 payload, without decoding it.
pub fn decoded_len(encoded: &str) -> u64 {
    let payload = strip_data_url(encoded).as_bytes();
    let significant = payload.iter().filter(|b| !b.is_ascii_whitespace()).count() as u64;
    let padding = payload
        .iter()
        .rev()
        .filter(|b| !b.is_ascii_whitespace())
        .take(2)
        .take_while(|b| **b == b'=')
        .count() as u64;
    let tail = match significant % 4 {
        2 => 1,
        3 => 2,
        _ => 0,
    };
    ((significant / 4) * 3 + tail).saturating_sub(padding)
}

/// Decode the payload. Whitespace (e.g. MIME line breaks) is ignored.
pub fn decode(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let payload = strip_data_url(encoded);
    if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        return Ok(general_purpose::STANDARD.decode(compact)?);
    }
    Ok(general_purpose::STANDARD.decode(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_and_data_url_payloads() {
        assert_eq!(decode("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode("data:video/mp4;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert_eq!(decode("aGVs\nbG8=").unwrap(), b"hello");
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(decode("not*base64!").is_err());
    }

    #[test]
    fn decoded_len_matches_actual_length() {
        for len in 0..12usize {
            let raw = vec![7u8; len];
            let encoded = general_purpose::STANDARD.encode(&raw);
            assert_eq!(decoded_len(&encoded), len as u64, "len {len}");
            let wrapped = format!("data:image/png;base64,{}", encoded);
            assert_eq!(decoded_len(&wrapped), len as u64);
        }
    }
}
