//! X.509 certificates.
//!
//! Certificates are parsed once with `x509-parser` and the fields the
//! verifiers need are kept as owned values next to the original DER.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::crypto::{verify_signature, CryptoError, SignatureAlgorithm, SignatureEncoding};
use crate::digest::{DigestAlgorithm, DigestValue};

pub const OID_COUNTRY: &str = "2.5.4.6";
pub const OID_ORGANIZATION: &str = "2.5.4.10";
pub const OID_ORGANIZATIONAL_UNIT: &str = "2.5.4.11";
pub const OID_COMMON_NAME: &str = "2.5.4.3";
pub const OID_SERIAL_NUMBER: &str = "2.5.4.5";

/// Certificate parse failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid certificate: {0}")]
pub struct CertificateError(pub String);

/// Key usage bits relevant to verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsageFlags {
    pub digital_signature: bool,
    pub non_repudiation: bool,
    pub key_cert_sign: bool,
}

/// Parsed X.509 certificate.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    subject_raw: Vec<u8>,
    issuer_raw: Vec<u8>,
    subject_attributes: Vec<(String, String)>,
    serial: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    spki_der: Vec<u8>,
    public_key_bits: Vec<u8>,
    tbs_der: Vec<u8>,
    signature_oid: String,
    signature: Vec<u8>,
    key_usage: Option<KeyUsageFlags>,
    is_ca: bool,
    ocsp_signing: bool,
    subject_key_id: Option<Vec<u8>>,
}

impl Certificate {
    /// Parse a DER certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| CertificateError(e.to_string()))?;

        let tbs = &cert.tbs_certificate;
        let subject_attributes = tbs
            .subject
            .iter_attributes()
            .filter_map(|attr| {
                let value = attr.as_str().ok()?;
                Some((attr.attr_type().to_id_string(), value.to_string()))
            })
            .collect();

        let key_usage = cert
            .key_usage()
            .map_err(|e| CertificateError(e.to_string()))?
            .map(|ku| KeyUsageFlags {
                digital_signature: ku.value.digital_signature(),
                non_repudiation: ku.value.non_repudiation(),
                key_cert_sign: ku.value.key_cert_sign(),
            });
        let is_ca = cert
            .basic_constraints()
            .map_err(|e| CertificateError(e.to_string()))?
            .is_some_and(|bc| bc.value.ca);
        let ocsp_signing = cert
            .extended_key_usage()
            .map_err(|e| CertificateError(e.to_string()))?
            .is_some_and(|eku| eku.value.ocsp_signing);

        let subject_key_id = cert.extensions().iter().find_map(|ext| {
            match ext.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(kid) => Some(kid.0.to_vec()),
                _ => None,
            }
        });

        Ok(Self {
            der: der.to_vec(),
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            subject_raw: tbs.subject.as_raw().to_vec(),
            issuer_raw: tbs.issuer.as_raw().to_vec(),
            subject_attributes,
            serial: cert.raw_serial().to_vec(),
            not_before: timestamp(cert.validity().not_before.timestamp())?,
            not_after: timestamp(cert.validity().not_after.timestamp())?,
            spki_der: tbs.subject_pki.raw.to_vec(),
            public_key_bits: tbs.subject_pki.subject_public_key.data.to_vec(),
            tbs_der: tbs.as_ref().to_vec(),
            signature_oid: cert.signature_algorithm.algorithm.to_id_string(),
            signature: cert.signature_value.data.to_vec(),
            key_usage,
            is_ca,
            ocsp_signing,
            subject_key_id,
        })
    }

    /// Parse PEM (`-----BEGIN CERTIFICATE-----`) or DER.
    pub fn from_pem_or_der(bytes: &[u8]) -> Result<Self, CertificateError> {
        if bytes.starts_with(b"-----BEGIN") {
            let (_, pem) = x509_parser::pem::parse_x509_pem(bytes)
                .map_err(|e| CertificateError(format!("PEM: {}", e)))?;
            Self::from_der(&pem.contents)
        } else {
            Self::from_der(bytes)
        }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject distinguished name in RFC 4514 form.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// DER encoding of the subject `Name`.
    pub fn subject_raw(&self) -> &[u8] {
        &self.subject_raw
    }

    /// DER encoding of the issuer `Name`.
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer_raw
    }

    /// First subject attribute value with the given OID.
    pub fn subject_attribute(&self, oid: &str) -> Option<&str> {
        self.subject_attributes
            .iter()
            .find(|(o, _)| o == oid)
            .map(|(_, v)| v.as_str())
    }

    pub fn common_name(&self) -> Option<&str> {
        self.subject_attribute(OID_COMMON_NAME)
    }

    /// Serial number as big-endian bytes.
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial)
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    /// DER `SubjectPublicKeyInfo`.
    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }

    /// Contents of the `subjectPublicKey` BIT STRING.
    pub fn public_key_bits(&self) -> &[u8] {
        &self.public_key_bits
    }

    pub fn key_usage(&self) -> Option<KeyUsageFlags> {
        self.key_usage
    }

    /// Signing-purpose certificate: key usage asserts non-repudiation.
    pub fn is_signing_cert(&self) -> bool {
        self.key_usage.is_some_and(|ku| ku.non_repudiation)
    }

    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Extended key usage includes `id-kp-OCSPSigning`.
    pub fn has_ocsp_signing(&self) -> bool {
        self.ocsp_signing
    }

    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.subject_key_id.as_deref()
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject_raw == self.issuer_raw
    }

    /// Digest of the DER encoding.
    pub fn digest(&self, algorithm: DigestAlgorithm) -> DigestValue {
        DigestValue::compute(algorithm, &self.der)
    }

    /// Whether `issuer` names and signed this certificate.
    pub fn verify_issued_by(&self, issuer: &Certificate) -> Result<(), CryptoError> {
        if self.issuer_raw != issuer.subject_raw {
            return Err(CryptoError::BadSignature);
        }
        let algorithm = SignatureAlgorithm::from_oid(&self.signature_oid, None)
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(self.signature_oid.clone()))?;
        verify_signature(
            algorithm,
            &issuer.spki_der,
            &self.tbs_der,
            &self.signature,
            SignatureEncoding::Asn1,
        )
    }

    /// Verify `signature` over `data` with this certificate's key.
    pub fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        signature: &[u8],
        encoding: SignatureEncoding,
    ) -> Result<(), CryptoError> {
        verify_signature(algorithm, &self.spki_der, data, signature, encoding)
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("serial", &self.serial_hex())
            .finish()
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, CertificateError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| CertificateError(format!("validity time out of range: {}", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{
        date_time_ymd, BasicConstraints, CertificateParams, DnType, IsCa, KeyPair,
        KeyUsagePurpose, PKCS_ED25519,
    };

    fn ca() -> (rcgen::Certificate, KeyPair) {
        let key = KeyPair::generate_for(&PKCS_ED25519).unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, "Test CA");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign];
        params.not_before = date_time_ymd(2014, 1, 1);
        params.not_after = date_time_ymd(2034, 1, 1);
        (params.self_signed(&key).unwrap(), key)
    }

    #[test]
    fn test_parse_signing_cert_fields() {
        let (ca_cert, ca_key) = ca();
        let key = KeyPair::generate_for(&PKCS_ED25519).unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CountryName, "EE");
        params
            .distinguished_name
            .push(DnType::OrganizationName, "BUSINESS");
        params.distinguished_name.push(DnType::CommonName, "consumer");
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::ContentCommitment];
        params.not_before = date_time_ymd(2014, 1, 1);
        params.not_after = date_time_ymd(2024, 1, 1);
        let leaf = params.signed_by(&key, &ca_cert, &ca_key).unwrap();

        let cert = Certificate::from_der(leaf.der()).unwrap();
        assert_eq!(cert.subject_attribute(OID_COUNTRY), Some("EE"));
        assert_eq!(cert.subject_attribute(OID_ORGANIZATION), Some("BUSINESS"));
        assert_eq!(cert.common_name(), Some("consumer"));
        assert!(cert.is_signing_cert());
        assert!(!cert.is_ca());
        assert!(cert.is_valid_at(Utc.with_ymd_and_hms(2014, 9, 30, 0, 0, 0).unwrap()));
        assert!(!cert.is_valid_at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));

        let issuer = Certificate::from_der(ca_cert.der()).unwrap();
        assert!(issuer.is_ca());
        assert!(issuer.is_self_issued());
        cert.verify_issued_by(&issuer).unwrap();
        assert!(issuer.verify_issued_by(&cert).is_err());
    }

    #[test]
    fn test_pem_and_der_both_load() {
        let (ca_cert, _) = ca();
        let from_pem = Certificate::from_pem_or_der(ca_cert.pem().as_bytes()).unwrap();
        let from_der = Certificate::from_pem_or_der(ca_cert.der()).unwrap();
        assert_eq!(from_pem, from_der);
        assert!(!from_pem.is_signing_cert());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Certificate::from_der(b"not a certificate").is_err());
    }
}
