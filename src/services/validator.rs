//! Size and MIME policy gate for incoming uploads.
//!
//! The declared MIME type is taken at face value. Pair with the sniffer when
//! the real container matters.

use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file too large: {size} bytes exceeds the {max} byte limit")]
    SizeExceeded { size: u64, max: u64 },
    #[error("unsupported media type `{0}`")]
    UnsupportedType(String),
}

impl ValidationError {
    /// Machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::SizeExceeded { .. } => "SizeExceeded",
            ValidationError::UnsupportedType(_) => "UnsupportedType",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Validator {
    max_bytes: u64,
    allowed: BTreeSet<String>,
}

impl Validator {
    pub fn new(max_bytes: u64, allowed: BTreeSet<String>) -> Self {
        let allowed = allowed
            .into_iter()
            .map(|mime| mime.trim().to_ascii_lowercase())
            .collect();
        Self { max_bytes, allowed }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Size is checked first, so an oversize payload is rejected whatever its type.
    pub fn validate(&self, byte_len: u64, declared_mime: &str) -> Result<(), ValidationError> {
        self.check_size(byte_len)?;
        self.check_type(declared_mime)
    }

    pub fn check_size(&self, byte_len: u64) -> Result<(), ValidationError> {
        if byte_len > self.max_bytes {
            return Err(ValidationError::SizeExceeded {
                size: byte_len,
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    pub fn check_type(&self, declared_mime: &str) -> Result<(), ValidationError> {
        // ignore parameters such as `; codecs=...`
        let essence = declared_mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if self.allowed.contains(&essence) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedType(declared_mime.to_string()))
        }
    }
}
