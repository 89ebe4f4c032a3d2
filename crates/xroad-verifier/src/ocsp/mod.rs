//! OCSP evidence.
//!
//! X-Road signatures carry OCSP responses for the signing certificate (and
//! intermediates) so that revocation status can be checked offline. This
//! module decodes those responses and evaluates them against the trust
//! configuration.
//!
//! # Verification Steps
//!
//! 1. The response must be about the certificate (CertID match)
//! 2. The responder certificate must be found (configured, CA or embedded)
//! 3. The response signature must verify with the responder key
//! 4. The responder must be authorized for the issuing CA
//! 5. `thisUpdate` must be within the freshness window
//! 6. `nextUpdate`, when present and checked, must not have passed
//! 7. The certificate status must be good

mod der;

use chrono::{DateTime, Duration, Utc};

use crate::cert::Certificate;
use crate::crypto::{SignatureAlgorithm, SignatureEncoding};
use crate::digest::DigestAlgorithm;
use crate::error::CertChainError;
use crate::trust::TrustConfiguration;

/// OCSP response could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid OCSP response: {0}")]
pub struct OcspDecodeError(pub String);

/// RFC 6960 `CertID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertId {
    pub hash_algorithm: DigestAlgorithm,
    pub issuer_name_hash: Vec<u8>,
    pub issuer_key_hash: Vec<u8>,
    pub serial: Vec<u8>,
}

impl CertId {
    /// CertID of `subject` as issued by `issuer`.
    pub fn for_certificate(
        subject: &Certificate,
        issuer: &Certificate,
        hash_algorithm: DigestAlgorithm,
    ) -> Self {
        Self {
            hash_algorithm,
            issuer_name_hash: hash_algorithm.digest(issuer.subject_raw()),
            issuer_key_hash: hash_algorithm.digest(issuer.public_key_bits()),
            serial: subject.serial().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertStatus {
    Good,
    Revoked {
        revocation_time: DateTime<Utc>,
        reason: Option<String>,
    },
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderId {
    /// DER encoding of the responder's subject name.
    ByName(Vec<u8>),
    /// SHA-1 of the responder's public key bits.
    ByKey(Vec<u8>),
}

impl ResponderId {
    pub fn matches(&self, cert: &Certificate) -> bool {
        match self {
            Self::ByName(name) => name.as_slice() == cert.subject_raw(),
            Self::ByKey(hash) => *hash == DigestAlgorithm::Sha1.digest(cert.public_key_bits()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub status: CertStatus,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

/// Decoded basic OCSP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspResponse {
    pub responder_id: ResponderId,
    pub produced_at: DateTime<Utc>,
    pub responses: Vec<SingleResponse>,
    /// DER of `tbsResponseData`, the signed bytes.
    pub tbs_response_data: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    pub signature: Vec<u8>,
    /// Certificates embedded in the response.
    pub certs: Vec<Certificate>,
}

impl OcspResponse {
    /// Decode a DER `OCSPResponse`; only successful basic responses are accepted.
    pub fn from_der(der: &[u8]) -> Result<Self, OcspDecodeError> {
        der::decode(der)
    }

    /// The response the evaluation applies to.
    pub fn single_response(&self) -> Option<&SingleResponse> {
        self.responses.first()
    }

    /// Whether this response is about `subject` issued by `issuer`.
    pub fn applies_to(&self, subject: &Certificate, issuer: &Certificate) -> bool {
        self.single_response().is_some_and(|single| {
            single.cert_id
                == CertId::for_certificate(subject, issuer, single.cert_id.hash_algorithm)
        })
    }
}

/// Evaluates OCSP responses against a trust configuration.
pub struct OcspVerifier<'c> {
    conf: &'c dyn TrustConfiguration,
}

impl<'c> OcspVerifier<'c> {
    pub fn new(conf: &'c dyn TrustConfiguration) -> Self {
        Self { conf }
    }

    /// Full check: validity of the response, then certificate status.
    pub fn verify(
        &self,
        response: &OcspResponse,
        subject: &Certificate,
        issuer: &Certificate,
        at: DateTime<Utc>,
    ) -> Result<(), CertChainError> {
        self.verify_validity(response, subject, issuer, at)?;
        self.verify_status(response, subject)
    }

    /// Whether `response` is acceptable evidence about `subject` at `at`.
    pub fn verify_validity(
        &self,
        response: &OcspResponse,
        subject: &Certificate,
        issuer: &Certificate,
        at: DateTime<Utc>,
    ) -> Result<(), CertChainError> {
        // 1. CertID
        let single = response.single_response().ok_or_else(|| {
            CertChainError::invalid_validation_info("OCSP response contains no responses")
        })?;
        if !response.applies_to(subject, issuer) {
            return Err(CertChainError::invalid_validation_info(format!(
                "OCSP response does not apply to certificate (sn = {})",
                subject.serial_hex()
            )));
        }

        // 2. Responder
        let responder = self.find_responder(response, issuer).ok_or_else(|| {
            CertChainError::invalid_validation_info(format!(
                "Could not find OCSP certificate for responder ID {:?}",
                response.responder_id
            ))
        })?;

        // 3. Signature
        responder
            .verify(
                response.signature_algorithm,
                &response.tbs_response_data,
                &response.signature,
                SignatureEncoding::Asn1,
            )
            .map_err(|e| {
                tracing::warn!(responder = %responder.subject(), error = %e, "OCSP signature check failed");
                CertChainError::invalid_validation_info("Signature on OCSP response is not valid")
            })?;

        // 4. Authorization
        if !self.is_authorized(responder, issuer) {
            return Err(CertChainError::invalid_validation_info(format!(
                "OCSP responder is not authorized for given CA (responder: {})",
                responder.subject()
            )));
        }

        // 5. Freshness
        let freshness = i64::try_from(self.conf.ocsp_freshness_seconds()).unwrap_or(i64::MAX);
        let oldest = Duration::try_seconds(freshness).and_then(|d| at.checked_sub_signed(d));
        if oldest.is_some_and(|oldest| single.this_update < oldest) {
            return Err(CertChainError::OcspTooOld {
                reason: format!(
                    "OCSP response is too old (thisUpdate: {})",
                    single.this_update.to_rfc3339()
                ),
            });
        }

        // 6. nextUpdate
        if self.conf.verify_ocsp_next_update() {
            if let Some(next_update) = single.next_update {
                if next_update < at {
                    return Err(CertChainError::OcspTooOld {
                        reason: format!(
                            "OCSP nextUpdate is too old (nextUpdate: {})",
                            next_update.to_rfc3339()
                        ),
                    });
                }
            }
        }

        Ok(())
    }

    /// Status carried by `response`; anything but good is an error.
    pub fn verify_status(
        &self,
        response: &OcspResponse,
        subject: &Certificate,
    ) -> Result<(), CertChainError> {
        let single = response.single_response().ok_or_else(|| {
            CertChainError::invalid_validation_info("OCSP response contains no responses")
        })?;
        match &single.status {
            CertStatus::Good => Ok(()),
            CertStatus::Revoked {
                revocation_time,
                reason,
            } => Err(CertChainError::Revoked {
                subject: subject.subject().to_string(),
                detail: match reason {
                    Some(reason) => format!(
                        "OCSP response indicates certificate status is REVOKED at {} ({})",
                        revocation_time.to_rfc3339(),
                        reason
                    ),
                    None => format!(
                        "OCSP response indicates certificate status is REVOKED at {}",
                        revocation_time.to_rfc3339()
                    ),
                },
            }),
            CertStatus::Unknown => Err(CertChainError::StatusUnknown {
                subject: subject.subject().to_string(),
            }),
        }
    }

    fn find_responder<'a>(
        &'a self,
        response: &'a OcspResponse,
        issuer: &'a Certificate,
    ) -> Option<&'a Certificate> {
        self.conf
            .ocsp_responder_certs()
            .iter()
            .chain(std::iter::once(issuer))
            .chain(response.certs.iter())
            .find(|cert| response.responder_id.matches(cert))
    }

    fn is_authorized(&self, responder: &Certificate, issuer: &Certificate) -> bool {
        self.conf.is_ocsp_responder(issuer, responder)
            || responder == issuer
            || (responder.has_ocsp_signing() && responder.verify_issued_by(issuer).is_ok())
    }
}
