//! Caller-supplied evidence about what was actually exchanged.

use crate::digest::{DigestAlgorithm, DigestValue};

/// Canonical name of the SOAP message part.
pub const MESSAGE: &str = "/message.xml";
/// Canonical name of the hash chain document.
pub const SIG_HASH_CHAIN: &str = "/hashchain.xml";
/// Canonical name of the hash chain result document.
pub const SIG_HASH_CHAIN_RESULT: &str = "/hashchainresult.xml";

/// Canonical name of the `n`th attachment (1-based).
pub fn attachment(n: usize) -> String {
    format!("/attachment{}", n)
}

/// A named payload whose digest participates in a signature or hash chain.
///
/// A part carries either a declared digest, its raw bytes, or both. When raw
/// data is present the digest is computed locally and the declared one is
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    pub name: String,
    pub digest_algorithm: DigestAlgorithm,
    pub digest_value: Option<Vec<u8>>,
    pub raw_data: Option<Vec<u8>>,
    /// Full message bytes as transmitted; resolved for signature references
    /// to [`MESSAGE`].
    pub raw_message: Option<Vec<u8>>,
}

impl MessagePart {
    /// Part described only by its digest.
    pub fn with_digest(
        name: impl Into<String>,
        digest_algorithm: DigestAlgorithm,
        digest_value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            digest_algorithm,
            digest_value: Some(digest_value.into()),
            raw_data: None,
            raw_message: None,
        }
    }

    /// Part carrying its raw bytes.
    pub fn with_data(
        name: impl Into<String>,
        digest_algorithm: DigestAlgorithm,
        raw_data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            digest_algorithm,
            digest_value: None,
            raw_data: Some(raw_data.into()),
            raw_message: None,
        }
    }

    /// Attach the full transmitted message bytes.
    pub fn with_raw_message(mut self, raw_message: impl Into<Vec<u8>>) -> Self {
        self.raw_message = Some(raw_message.into());
        self
    }

    /// Digest used as hash chain input, if the part has one.
    pub fn digest(&self) -> Option<DigestValue> {
        match (&self.raw_data, &self.digest_value) {
            (Some(data), _) => Some(DigestValue::compute(self.digest_algorithm, data)),
            (None, Some(value)) => Some(DigestValue::new(self.digest_algorithm, value.clone())),
            (None, None) => None,
        }
    }

    /// Bytes served to the signature reference resolver.
    pub fn resolvable_bytes(&self) -> Option<&[u8]> {
        self.raw_message
            .as_deref()
            .or(self.raw_data.as_deref())
    }
}
