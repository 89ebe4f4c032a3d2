//! Error types for signature and evidence verification.
//!
//! Every failure carries a stable [`ErrorKind`] plus a human-readable detail
//! naming the offending element or reference. Certificate chain failures are
//! carried unchanged as [`CertChainError`].

use serde::Serialize;

/// Stable, machine-readable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MalformedSignature,
    IncorrectCertificate,
    InvalidSignatureValue,
    InvalidReference,
    CertificateNotFound,
    SignerVerificationFailed,
    InternalError,
    CertChainExpired,
    CertChainNotYetValid,
    CertChainRevoked,
    CertChainUntrustedIssuer,
    CertChainMissingOcsp,
    CertChainOcspTooOld,
    CertChainInvalidValidationInfo,
    CertChainStatusUnknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Signature verification errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// Structural or schema violation, hash chain mismatch, timestamp imprint mismatch.
    #[error("malformed signature: {reason}")]
    MalformedSignature { reason: String },

    /// Name in the signing certificate does not match the claimed signer.
    #[error("incorrect certificate: {reason}")]
    IncorrectCertificate { reason: String },

    /// Cryptographic check of the XML signature failed.
    #[error("invalid signature value: {reason}")]
    InvalidSignatureValue { reason: String },

    /// Timestamp manifest reference could not be resolved or did not match.
    #[error("invalid reference: {reason}")]
    InvalidReference { reason: String },

    /// Timestamp token signer is not among the trusted TSP certificates.
    #[error("certificate not found: {reason}")]
    CertificateNotFound { reason: String },

    /// Timestamp token signature did not verify.
    #[error("signer verification failed: {reason}")]
    SignerVerificationFailed { reason: String },

    /// Deployment or configuration fault.
    #[error("internal error: {reason}")]
    InternalError { reason: String },

    /// Failure reported by the certificate chain verifier.
    #[error(transparent)]
    CertChain(#[from] CertChainError),
}

impl VerificationError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedSignature {
            reason: reason.into(),
        }
    }

    pub fn incorrect_certificate(reason: impl Into<String>) -> Self {
        Self::IncorrectCertificate {
            reason: reason.into(),
        }
    }

    pub fn invalid_signature_value(reason: impl Into<String>) -> Self {
        Self::InvalidSignatureValue {
            reason: reason.into(),
        }
    }

    pub fn invalid_reference(reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reason: reason.into(),
        }
    }

    pub fn certificate_not_found(reason: impl Into<String>) -> Self {
        Self::CertificateNotFound {
            reason: reason.into(),
        }
    }

    pub fn signer_verification_failed(reason: impl Into<String>) -> Self {
        Self::SignerVerificationFailed {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::InternalError {
            reason: reason.into(),
        }
    }

    /// Stable error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedSignature { .. } => ErrorKind::MalformedSignature,
            Self::IncorrectCertificate { .. } => ErrorKind::IncorrectCertificate,
            Self::InvalidSignatureValue { .. } => ErrorKind::InvalidSignatureValue,
            Self::InvalidReference { .. } => ErrorKind::InvalidReference,
            Self::CertificateNotFound { .. } => ErrorKind::CertificateNotFound,
            Self::SignerVerificationFailed { .. } => ErrorKind::SignerVerificationFailed,
            Self::InternalError { .. } => ErrorKind::InternalError,
            Self::CertChain(e) => e.kind(),
        }
    }

    /// Human-readable detail without the kind prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::MalformedSignature { reason }
            | Self::IncorrectCertificate { reason }
            | Self::InvalidSignatureValue { reason }
            | Self::InvalidReference { reason }
            | Self::CertificateNotFound { reason }
            | Self::SignerVerificationFailed { reason }
            | Self::InternalError { reason } => reason.clone(),
            Self::CertChain(e) => e.to_string(),
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Configuration faults
            Self::InternalError { .. } => 1,

            // Evidence is structurally broken
            Self::MalformedSignature { .. } => 3,
            Self::InvalidReference { .. } => 3,

            // Evidence is well-formed but does not prove what it claims
            Self::IncorrectCertificate { .. } => 4,
            Self::InvalidSignatureValue { .. } => 4,
            Self::CertificateNotFound { .. } => 4,
            Self::SignerVerificationFailed { .. } => 4,

            // Trust path / revocation
            Self::CertChain(_) => 5,
        }
    }

    /// Whether supplying fresher evidence could change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CertChain(CertChainError::MissingOcsp { .. })
                | Self::CertChain(CertChainError::OcspTooOld { .. })
        )
    }
}

/// Certificate chain verification failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertChainError {
    /// Certificate validity ended before the verification time.
    #[error("certificate expired: {subject} (not after {not_after})")]
    Expired { subject: String, not_after: String },

    /// Certificate validity starts after the verification time.
    #[error("certificate not yet valid: {subject} (not before {not_before})")]
    NotYetValid { subject: String, not_before: String },

    /// OCSP evidence reports the certificate as revoked.
    #[error("certificate revoked: {subject} ({detail})")]
    Revoked { subject: String, detail: String },

    /// No path to a configured trust anchor.
    #[error("untrusted issuer: {reason}")]
    UntrustedIssuer { reason: String },

    /// No OCSP response matches a certificate in the path.
    #[error("no OCSP response for certificate: {subject}")]
    MissingOcsp { subject: String },

    /// Matching OCSP response is older than the freshness window allows.
    #[error("OCSP response is too old: {reason}")]
    OcspTooOld { reason: String },

    /// OCSP response is present but cannot be accepted.
    #[error("invalid validation info: {reason}")]
    InvalidValidationInfo { reason: String },

    /// OCSP evidence reports the certificate status as unknown.
    #[error("certificate status unknown: {subject}")]
    StatusUnknown { subject: String },
}

impl CertChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Expired { .. } => ErrorKind::CertChainExpired,
            Self::NotYetValid { .. } => ErrorKind::CertChainNotYetValid,
            Self::Revoked { .. } => ErrorKind::CertChainRevoked,
            Self::UntrustedIssuer { .. } => ErrorKind::CertChainUntrustedIssuer,
            Self::MissingOcsp { .. } => ErrorKind::CertChainMissingOcsp,
            Self::OcspTooOld { .. } => ErrorKind::CertChainOcspTooOld,
            Self::InvalidValidationInfo { .. } => ErrorKind::CertChainInvalidValidationInfo,
            Self::StatusUnknown { .. } => ErrorKind::CertChainStatusUnknown,
        }
    }

    pub(crate) fn invalid_validation_info(reason: impl Into<String>) -> Self {
        Self::InvalidValidationInfo {
            reason: reason.into(),
        }
    }
}

/// Result type for verification operations.
pub type VerificationResult<T> = Result<T, VerificationError>;
