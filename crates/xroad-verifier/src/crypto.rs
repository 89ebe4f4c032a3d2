//! Public-key signature verification.
//!
//! Algorithms are addressed by XML-DSig URI (signature documents) or by
//! ASN.1 OID (certificates, OCSP responses, CMS). Keys arrive as DER
//! `SubjectPublicKeyInfo`.

use pkcs8::DecodePublicKey;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use crate::digest::DigestAlgorithm;

pub const RSA_SHA1_URI: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const RSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const RSA_SHA384_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
pub const RSA_SHA512_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";
pub const ECDSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
pub const ED25519_URI: &str = "http://www.w3.org/2021/04/xmldsig-more#eddsa-ed25519";

const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_SHA1_WITH_RSA: &str = "1.2.840.113549.1.1.5";
const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
const OID_SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
const OID_SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";
const OID_ED25519: &str = "1.3.101.112";

/// Crypto failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("malformed signature bytes: {0}")]
    MalformedSignature(String),

    #[error("signature does not verify")]
    BadSignature,
}

/// How the signature value is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEncoding {
    /// XML-DSig: ECDSA as fixed-width `r || s`.
    Xml,
    /// X.509 / OCSP / CMS: ECDSA as DER `Ecdsa-Sig-Value`.
    Asn1,
}

/// Supported signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaPkcs1(DigestAlgorithm),
    EcdsaP256Sha256,
    Ed25519,
}

impl SignatureAlgorithm {
    pub fn from_xml_uri(uri: &str) -> Option<Self> {
        match uri.trim() {
            RSA_SHA1_URI => Some(Self::RsaPkcs1(DigestAlgorithm::Sha1)),
            RSA_SHA256_URI => Some(Self::RsaPkcs1(DigestAlgorithm::Sha256)),
            RSA_SHA384_URI => Some(Self::RsaPkcs1(DigestAlgorithm::Sha384)),
            RSA_SHA512_URI => Some(Self::RsaPkcs1(DigestAlgorithm::Sha512)),
            ECDSA_SHA256_URI => Some(Self::EcdsaP256Sha256),
            ED25519_URI => Some(Self::Ed25519),
            _ => None,
        }
    }

    pub fn xml_uri(&self) -> &'static str {
        match self {
            Self::RsaPkcs1(DigestAlgorithm::Sha1) => RSA_SHA1_URI,
            Self::RsaPkcs1(DigestAlgorithm::Sha256) => RSA_SHA256_URI,
            Self::RsaPkcs1(DigestAlgorithm::Sha384) => RSA_SHA384_URI,
            Self::RsaPkcs1(DigestAlgorithm::Sha512) => RSA_SHA512_URI,
            Self::EcdsaP256Sha256 => ECDSA_SHA256_URI,
            Self::Ed25519 => ED25519_URI,
        }
    }

    /// Resolve a signature algorithm OID. Bare key OIDs (`rsaEncryption`,
    /// `id-ecPublicKey`, as CMS signer infos use) need the separate digest.
    pub fn from_oid(oid: &str, digest: Option<DigestAlgorithm>) -> Option<Self> {
        match oid {
            OID_SHA1_WITH_RSA => Some(Self::RsaPkcs1(DigestAlgorithm::Sha1)),
            OID_SHA256_WITH_RSA => Some(Self::RsaPkcs1(DigestAlgorithm::Sha256)),
            OID_SHA384_WITH_RSA => Some(Self::RsaPkcs1(DigestAlgorithm::Sha384)),
            OID_SHA512_WITH_RSA => Some(Self::RsaPkcs1(DigestAlgorithm::Sha512)),
            OID_RSA_ENCRYPTION => digest.map(Self::RsaPkcs1),
            OID_ECDSA_WITH_SHA256 => Some(Self::EcdsaP256Sha256),
            OID_EC_PUBLIC_KEY if digest == Some(DigestAlgorithm::Sha256) => {
                Some(Self::EcdsaP256Sha256)
            }
            OID_ED25519 => Some(Self::Ed25519),
            _ => None,
        }
    }
}

/// Verify `signature` over `data` with the key in `spki_der`.
pub fn verify_signature(
    algorithm: SignatureAlgorithm,
    spki_der: &[u8],
    data: &[u8],
    signature: &[u8],
    encoding: SignatureEncoding,
) -> Result<(), CryptoError> {
    match algorithm {
        SignatureAlgorithm::RsaPkcs1(digest) => verify_rsa(digest, spki_der, data, signature),
        SignatureAlgorithm::EcdsaP256Sha256 => verify_p256(spki_der, data, signature, encoding),
        SignatureAlgorithm::Ed25519 => verify_ed25519(spki_der, data, signature),
    }
}

fn verify_rsa(
    digest: DigestAlgorithm,
    spki_der: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::signature::Verifier;

    let key = rsa::RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig =
        Signature::try_from(signature).map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;

    let result = match digest {
        DigestAlgorithm::Sha1 => VerifyingKey::<Sha1>::new(key).verify(data, &sig),
        DigestAlgorithm::Sha256 => VerifyingKey::<Sha256>::new(key).verify(data, &sig),
        DigestAlgorithm::Sha384 => VerifyingKey::<Sha384>::new(key).verify(data, &sig),
        DigestAlgorithm::Sha512 => VerifyingKey::<Sha512>::new(key).verify(data, &sig),
    };
    result.map_err(|_| CryptoError::BadSignature)
}

fn verify_p256(
    spki_der: &[u8],
    data: &[u8],
    signature: &[u8],
    encoding: SignatureEncoding,
) -> Result<(), CryptoError> {
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};

    let key = VerifyingKey::from_public_key_der(spki_der)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig = match encoding {
        SignatureEncoding::Xml => Signature::from_slice(signature),
        SignatureEncoding::Asn1 => Signature::from_der(signature),
    }
    .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;

    key.verify(data, &sig).map_err(|_| CryptoError::BadSignature)
}

fn verify_ed25519(spki_der: &[u8], data: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    let key = VerifyingKey::from_public_key_der(spki_der)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig =
        Signature::from_slice(signature).map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;

    key.verify(data, &sig).map_err(|_| CryptoError::BadSignature)
}
