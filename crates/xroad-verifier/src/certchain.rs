//! Certificate chain verification.
//!
//! The orchestrator hands the signing certificate, the extra certificates
//! embedded in the signature and the raw OCSP evidence to a
//! [`CertChainVerifier`]. Deployments with their own PKI stack implement the
//! trait; [`OcspCertChainVerifier`] is the offline default.
//!
//! # Verification Steps
//!
//! 1. Decode every OCSP response
//! 2. Build the path leaf -> extra certificates -> configured CA
//! 3. Check the validity window of every certificate in the path
//! 4. Check every non-anchor certificate against its OCSP response

use chrono::{DateTime, Utc};

use crate::cert::Certificate;
use crate::error::CertChainError;
use crate::ocsp::{OcspResponse, OcspVerifier};
use crate::trust::TrustConfiguration;

/// Validates a certificate path against trust anchors and OCSP evidence.
pub trait CertChainVerifier {
    /// `ocsp_responses` are DER `OCSPResponse` values as found in the signature.
    fn verify(
        &self,
        instance: &str,
        leaf: &Certificate,
        extra_certs: &[Certificate],
        ocsp_responses: &[Vec<u8>],
        at: DateTime<Utc>,
    ) -> Result<(), CertChainError>;
}

impl<V: CertChainVerifier + ?Sized> CertChainVerifier for &V {
    fn verify(
        &self,
        instance: &str,
        leaf: &Certificate,
        extra_certs: &[Certificate],
        ocsp_responses: &[Vec<u8>],
        at: DateTime<Utc>,
    ) -> Result<(), CertChainError> {
        (**self).verify(instance, leaf, extra_certs, ocsp_responses, at)
    }
}

/// Path building and OCSP evaluation against a [`TrustConfiguration`].
pub struct OcspCertChainVerifier<'c> {
    conf: &'c dyn TrustConfiguration,
}

impl<'c> OcspCertChainVerifier<'c> {
    pub fn new(conf: &'c dyn TrustConfiguration) -> Self {
        Self { conf }
    }

    /// Same as [`CertChainVerifier::verify`] with already decoded responses.
    pub fn verify_decoded(
        &self,
        instance: &str,
        leaf: &Certificate,
        extra_certs: &[Certificate],
        ocsp_responses: &[OcspResponse],
        at: DateTime<Utc>,
    ) -> Result<(), CertChainError> {
        // 2. Path
        let path = self.build_path(instance, leaf, extra_certs)?;
        tracing::debug!(
            instance,
            leaf = %leaf.subject(),
            length = path.len(),
            "built certificate path"
        );

        // 3. Validity windows
        for cert in &path {
            check_validity(cert, at)?;
        }

        // 4. Revocation, anchor excluded
        let ocsp = OcspVerifier::new(self.conf);
        for pair in path.windows(2) {
            let (subject, issuer) = (pair[0], pair[1]);
            let response = ocsp_responses
                .iter()
                .find(|r| r.applies_to(subject, issuer))
                .ok_or_else(|| {
                    tracing::warn!(subject = %subject.subject(), "no OCSP response for certificate");
                    CertChainError::MissingOcsp {
                        subject: subject.subject().to_string(),
                    }
                })?;
            ocsp.verify(response, subject, issuer, at)?;
        }

        Ok(())
    }

    /// Leaf first, configured CA last.
    fn build_path<'a>(
        &'a self,
        instance: &str,
        leaf: &'a Certificate,
        extra_certs: &'a [Certificate],
    ) -> Result<Vec<&'a Certificate>, CertChainError> {
        let mut path = vec![leaf];
        let mut current = leaf;

        // Each extra certificate can appear in the path at most once.
        for _ in 0..=extra_certs.len() {
            if let Some(anchor) = self.conf.ca_cert(instance, current) {
                path.push(anchor);
                return Ok(path);
            }

            let next = extra_certs.iter().find(|candidate| {
                !path.contains(candidate) && current.verify_issued_by(candidate).is_ok()
            });
            match next {
                Some(next) => {
                    path.push(next);
                    current = next;
                }
                None => break,
            }
        }

        Err(CertChainError::UntrustedIssuer {
            reason: format!(
                "No trusted CA in instance {} for issuer {}",
                instance,
                current.issuer()
            ),
        })
    }
}

impl CertChainVerifier for OcspCertChainVerifier<'_> {
    fn verify(
        &self,
        instance: &str,
        leaf: &Certificate,
        extra_certs: &[Certificate],
        ocsp_responses: &[Vec<u8>],
        at: DateTime<Utc>,
    ) -> Result<(), CertChainError> {
        // 1. Decode
        let decoded = ocsp_responses
            .iter()
            .map(|der| OcspResponse::from_der(der))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CertChainError::invalid_validation_info(e.to_string()))?;

        self.verify_decoded(instance, leaf, extra_certs, &decoded, at)
    }
}

fn check_validity(cert: &Certificate, at: DateTime<Utc>) -> Result<(), CertChainError> {
    if at < cert.not_before() {
        return Err(CertChainError::NotYetValid {
            subject: cert.subject().to_string(),
            not_before: cert.not_before().to_rfc3339(),
        });
    }
    if at > cert.not_after() {
        return Err(CertChainError::Expired {
            subject: cert.subject().to_string(),
            not_after: cert.not_after().to_rfc3339(),
        });
    }
    Ok(())
}
