//! Reference resolution.
//!
//! Hash chain and XML signature verification fetch referenced content
//! through [`ReferenceResolver`] instead of touching storage directly.
//! Defaults cover the message parts and hash chain documents handed to the
//! verifier; callers can layer their own resolver on top (e.g. for
//! multipart attachment stores).

use std::collections::HashMap;

use crate::digest::DigestValue;
use crate::message_part::{MessagePart, MESSAGE, SIG_HASH_CHAIN, SIG_HASH_CHAIN_RESULT};

/// Resolves a reference URI to its byte content.
pub trait ReferenceResolver {
    /// Content for `uri`, or `None` if this resolver does not know it.
    fn resolve(&self, uri: &str) -> Option<Vec<u8>>;

    /// Whether `uri` must be fetched and digested. Returning `false` makes
    /// the verifier trust `digest` as declared.
    fn should_resolve(&self, _uri: &str, _digest: &DigestValue) -> bool {
        true
    }
}

impl<R: ReferenceResolver + ?Sized> ReferenceResolver for &R {
    fn resolve(&self, uri: &str) -> Option<Vec<u8>> {
        (**self).resolve(uri)
    }

    fn should_resolve(&self, uri: &str, digest: &DigestValue) -> bool {
        (**self).should_resolve(uri, digest)
    }
}

impl<R: ReferenceResolver + ?Sized> ReferenceResolver for Box<R> {
    fn resolve(&self, uri: &str) -> Option<Vec<u8>> {
        (**self).resolve(uri)
    }

    fn should_resolve(&self, uri: &str, digest: &DigestValue) -> bool {
        (**self).should_resolve(uri, digest)
    }
}

/// Default resolver for signature references: the message and the hash
/// chain result.
#[derive(Debug, Clone, Default)]
pub struct SignatureResourceResolver {
    message: Option<Vec<u8>>,
    hash_chain_result: Option<Vec<u8>>,
}

impl SignatureResourceResolver {
    pub fn new(parts: &[MessagePart], hash_chain_result: Option<&[u8]>) -> Self {
        let message = parts
            .iter()
            .find(|p| p.name == MESSAGE)
            .and_then(|p| p.resolvable_bytes())
            .map(<[u8]>::to_vec);

        Self {
            message,
            hash_chain_result: hash_chain_result.map(<[u8]>::to_vec),
        }
    }
}

impl ReferenceResolver for SignatureResourceResolver {
    fn resolve(&self, uri: &str) -> Option<Vec<u8>> {
        match uri {
            MESSAGE => self.message.clone(),
            SIG_HASH_CHAIN_RESULT => self.hash_chain_result.clone(),
            _ => None,
        }
    }
}

/// Default resolver for hash chain verification: the hash chain document.
#[derive(Debug, Clone, Default)]
pub struct HashChainResolver {
    hash_chain: Option<Vec<u8>>,
}

impl HashChainResolver {
    pub fn new(hash_chain: Option<&[u8]>) -> Self {
        Self {
            hash_chain: hash_chain.map(<[u8]>::to_vec),
        }
    }
}

impl ReferenceResolver for HashChainResolver {
    fn resolve(&self, uri: &str) -> Option<Vec<u8>> {
        match uri {
            SIG_HASH_CHAIN => self.hash_chain.clone(),
            _ => None,
        }
    }
}

/// In-memory resolver keyed by URI.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    entries: HashMap<String, Vec<u8>>,
    trusted: HashMap<String, DigestValue>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` for `uri`.
    pub fn with_entry(mut self, uri: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(uri.into(), data.into());
        self
    }

    /// Accept the declared digest for `uri` without resolving it when it
    /// equals `digest`.
    pub fn with_trusted_digest(mut self, uri: impl Into<String>, digest: DigestValue) -> Self {
        self.trusted.insert(uri.into(), digest);
        self
    }
}

impl ReferenceResolver for MapResolver {
    fn resolve(&self, uri: &str) -> Option<Vec<u8>> {
        self.entries.get(uri).cloned()
    }

    fn should_resolve(&self, uri: &str, digest: &DigestValue) -> bool {
        self.trusted.get(uri) != Some(digest)
    }
}

/// Consults `primary` first and falls back to `fallback`.
#[derive(Debug, Clone)]
pub struct LayeredResolver<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> LayeredResolver<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: ReferenceResolver, F: ReferenceResolver> ReferenceResolver for LayeredResolver<P, F> {
    fn resolve(&self, uri: &str) -> Option<Vec<u8>> {
        self.primary
            .resolve(uri)
            .or_else(|| self.fallback.resolve(uri))
    }

    fn should_resolve(&self, uri: &str, digest: &DigestValue) -> bool {
        self.primary.should_resolve(uri, digest) && self.fallback.should_resolve(uri, digest)
    }
}
