//! Timestamp token verification.
//!
//! A timestamp token is a TSP's signed statement that a digest (the
//! *message imprint*) existed at `genTime`. Verification is split in two:
//! the imprint check against the stamped data, and the signer check against
//! the trusted TSP certificates.
//!
//! Trusting a TSP certificate is a configuration decision, so an empty list
//! of TSP certificates is an [`InternalError`](crate::VerificationError::InternalError)
//! rather than evidence of tampering.

mod der;

use chrono::{DateTime, Utc};

use crate::cert::Certificate;
use crate::crypto::{SignatureAlgorithm, SignatureEncoding};
use crate::digest::{sha256_hex, DigestAlgorithm};
use crate::error::{VerificationError, VerificationResult};

/// Token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp token: {0}")]
pub struct TimestampDecodeError(pub String);

/// How the token names its signing certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerId {
    /// DER issuer name and raw serial number.
    IssuerSerial { issuer: Vec<u8>, serial: Vec<u8> },
    SubjectKeyId(Vec<u8>),
}

impl SignerId {
    pub fn matches(&self, cert: &Certificate) -> bool {
        match self {
            Self::IssuerSerial { issuer, serial } => {
                issuer.as_slice() == cert.issuer_raw() && serial.as_slice() == cert.serial()
            }
            Self::SubjectKeyId(ski) => cert.subject_key_id() == Some(ski.as_slice()),
        }
    }
}

/// Decoded RFC 3161 timestamp token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampToken {
    /// Algorithm of the message imprint.
    pub hash_algorithm: DigestAlgorithm,
    pub message_imprint: Vec<u8>,
    pub gen_time: DateTime<Utc>,
    pub signer: SignerId,
    /// Signer's digest algorithm.
    pub digest_algorithm: DigestAlgorithm,
    /// Bytes covered by the signature.
    pub signed_content: Vec<u8>,
    /// `messageDigest` signed attribute, when signed attributes are present.
    pub message_digest: Option<Vec<u8>>,
    /// DER of the encapsulated `TSTInfo`.
    pub tst_info: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    pub signature: Vec<u8>,
    /// Certificates carried in the token.
    pub certs: Vec<Certificate>,
}

impl TimestampToken {
    pub fn from_der(der: &[u8]) -> Result<Self, TimestampDecodeError> {
        der::decode(der)
    }

    pub fn gen_time(&self) -> DateTime<Utc> {
        self.gen_time
    }
}

/// Check the imprint against `stamped_data`, then the token signer.
pub fn verify(
    token: &TimestampToken,
    stamped_data: &[u8],
    tsp_certs: &[Certificate],
) -> VerificationResult<()> {
    let digest = token.hash_algorithm.digest(stamped_data);
    if digest != token.message_imprint {
        tracing::warn!(
            algorithm = %token.hash_algorithm,
            data = %sha256_hex(stamped_data),
            "timestamp imprint does not match stamped data"
        );
        return Err(VerificationError::malformed("timestamp hashes do not match"));
    }
    verify_token(token, tsp_certs)
}

/// Check that a trusted TSP signed the token.
pub fn verify_token(token: &TimestampToken, tsp_certs: &[Certificate]) -> VerificationResult<()> {
    let cert = signer_certificate(token, tsp_certs)?;

    // The signature must cover TSTInfo, directly or through messageDigest.
    match &token.message_digest {
        Some(expected) => {
            if token.digest_algorithm.digest(&token.tst_info) != *expected {
                return Err(VerificationError::signer_verification_failed(
                    "messageDigest attribute does not match TSTInfo",
                ));
            }
        }
        None => {
            if token.signed_content != token.tst_info {
                return Err(VerificationError::signer_verification_failed(
                    "Signed attributes carry no messageDigest",
                ));
            }
        }
    }

    cert.verify(
        token.signature_algorithm,
        &token.signed_content,
        &token.signature,
        SignatureEncoding::Asn1,
    )
    .map_err(|e| {
        VerificationError::signer_verification_failed(format!(
            "Timestamp signature by {} does not verify: {}",
            cert.subject(),
            e
        ))
    })?;

    tracing::debug!(tsp = %cert.subject(), gen_time = %token.gen_time, "timestamp token verified");
    Ok(())
}

/// Trusted TSP certificate that signed `token`, without checking the signature.
pub fn signer_certificate<'a>(
    token: &TimestampToken,
    tsp_certs: &'a [Certificate],
) -> VerificationResult<&'a Certificate> {
    if tsp_certs.is_empty() {
        return Err(VerificationError::internal("no TSP providers configured"));
    }
    tsp_certs
        .iter()
        .find(|cert| token.signer.matches(cert))
        .ok_or_else(|| {
            VerificationError::certificate_not_found(
                "Could not find TSP certificate for timestamp",
            )
        })
}
