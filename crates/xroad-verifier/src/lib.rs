//! Offline verification of X-Road message signatures and their evidence.
//!
//! The entry point is [`SignatureVerifier`]: bind a parsed [`Signature`],
//! register the [`MessagePart`]s that were exchanged and call
//! [`SignatureVerifier::verify`] with the claimed signer. Certificate chains
//! are checked through a [`CertChainVerifier`]; [`OcspCertChainVerifier`]
//! evaluates the OCSP responses embedded in the signature against a
//! [`TrustConfiguration`].
//!
//! Timestamp tokens are verified separately with [`timestamp::verify`].
//!
//! All evidence must already be in memory. Nothing here performs network
//! or file I/O apart from [`StaticTrustConfiguration::from_file`].

pub mod cert;
pub mod certchain;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod hashchain;
pub mod identifier;
pub mod message_part;
pub mod ocsp;
pub mod profile;
pub mod resolver;
pub mod signature;
pub mod timestamp;
pub mod trust;
pub mod verifier;
pub mod xml;

#[cfg(test)]
mod testutil;

// Convenience re-exports
pub use cert::Certificate;
pub use certchain::{CertChainVerifier, OcspCertChainVerifier};
pub use digest::{DigestAlgorithm, DigestValue};
pub use error::{CertChainError, ErrorKind, VerificationError, VerificationResult};
pub use identifier::ClientId;
pub use message_part::MessagePart;
pub use resolver::{MapResolver, ReferenceResolver};
pub use signature::Signature;
pub use timestamp::TimestampToken;
pub use trust::{StaticTrustConfiguration, TrustConfiguration};
pub use verifier::SignatureVerifier;
