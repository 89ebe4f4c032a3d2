//! Shared fixtures: a small rcgen PKI and a XAdES document builder that
//! signs through the crate's own canonicalizer.

#![allow(dead_code)]

use std::cell::RefCell;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{Signer, SigningKey};
use rcgen::{
    date_time_ymd, BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_ED25519,
};

use xroad_verifier::crypto::ED25519_URI;
use xroad_verifier::digest::SHA256_URI;
use xroad_verifier::hashchain::{concat_digests, NS_HASHCHAIN};
use xroad_verifier::message_part::SIG_HASH_CHAIN;
use xroad_verifier::xml::c14n::{self, CanonicalizationMethod, C14N_11, EXC_C14N};
use xroad_verifier::xml::NS_DS;
use xroad_verifier::{CertChainError, CertChainVerifier, Certificate, DigestAlgorithm, DigestValue};

pub const MESSAGE_0: &[u8] = br#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/"><SOAP-ENV:Body><getRandom/></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;

pub const ALG: DigestAlgorithm = DigestAlgorithm::Sha256;

pub fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 9, 30, 12, 0, 0).unwrap()
}

pub struct Issued {
    pub cert: Certificate,
    pub rcgen: rcgen::Certificate,
    pub key: KeyPair,
}

impl Issued {
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_pkcs8_der(&self.key.serialize_der()).unwrap()
    }
}

fn params(dn: &[(DnType, &str)]) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name = DistinguishedName::new();
    for (ty, value) in dn {
        params.distinguished_name.push(ty.clone(), *value);
    }
    params.not_before = date_time_ymd(2014, 1, 1);
    params.not_after = date_time_ymd(2034, 1, 1);
    params
}

fn finish(rcgen: rcgen::Certificate, key: KeyPair) -> Issued {
    Issued {
        cert: Certificate::from_der(rcgen.der()).unwrap(),
        rcgen,
        key,
    }
}

pub fn ca(cn: &str) -> Issued {
    let mut params = params(&[(DnType::CommonName, cn)]);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign];
    let key = KeyPair::generate_for(&PKCS_ED25519).unwrap();
    let cert = params.self_signed(&key).unwrap();
    finish(cert, key)
}

fn issue(params: CertificateParams, issuer: &Issued) -> Issued {
    let key = KeyPair::generate_for(&PKCS_ED25519).unwrap();
    let cert = params.signed_by(&key, &issuer.rcgen, &issuer.key).unwrap();
    finish(cert, key)
}

/// Signing certificate for member `EE/BUSINESS/<code>`.
pub fn member_signer(code: &str, issuer: &Issued) -> Issued {
    let mut params = params(&[
        (DnType::CountryName, "EE"),
        (DnType::OrganizationName, "BUSINESS"),
        (DnType::CommonName, code),
    ]);
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![KeyUsagePurpose::ContentCommitment];
    issue(params, issuer)
}

/// Certificate without non-repudiation key usage.
pub fn auth_cert(code: &str, issuer: &Issued) -> Issued {
    let mut params = params(&[
        (DnType::CountryName, "EE"),
        (DnType::OrganizationName, "BUSINESS"),
        (DnType::CommonName, code),
    ]);
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    issue(params, issuer)
}

pub fn b64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn digest_b64(data: &[u8]) -> String {
    b64(&ALG.digest(data))
}

/// Builds a signed `asic:XAdESSignatures` document.
pub struct SignatureBuilder<'a> {
    signer: &'a Issued,
    references: Vec<(String, String)>,
    extra_certs: Vec<Certificate>,
    ocsp_responses: Vec<Vec<u8>>,
    key_info: bool,
    timestamp_manifest: bool,
}

impl<'a> SignatureBuilder<'a> {
    pub fn new(signer: &'a Issued) -> Self {
        Self {
            signer,
            references: Vec::new(),
            extra_certs: Vec::new(),
            ocsp_responses: vec![b"ocsp response".to_vec()],
            key_info: true,
            timestamp_manifest: false,
        }
    }

    /// Reference `uri` with the SHA-256 digest of `data`.
    pub fn reference(mut self, uri: &str, data: &[u8]) -> Self {
        self.references.push((uri.to_string(), digest_b64(data)));
        self
    }

    pub fn extra_cert(mut self, cert: Certificate) -> Self {
        self.extra_certs.push(cert);
        self
    }

    pub fn ocsp_responses(mut self, responses: Vec<Vec<u8>>) -> Self {
        self.ocsp_responses = responses;
        self
    }

    pub fn without_key_info(mut self) -> Self {
        self.key_info = false;
        self
    }

    /// Add `ts-root-manifest` listing a manifest over the signature value.
    pub fn timestamp_manifest(mut self) -> Self {
        self.timestamp_manifest = true;
        self
    }

    pub fn build(&self) -> String {
        // Signed properties digest does not depend on SignedInfo.
        let draft = self.document("<ds:SignedInfo/>", "", "");
        let props = c14n::canonicalize_by_id(
            &draft,
            "signed-properties",
            &CanonicalizationMethod::from_uri(C14N_11).unwrap(),
        )
        .unwrap();
        let signed_info = self.signed_info(&b64(&ALG.digest(&props)));

        let unsigned = self.document(&signed_info, "", "");
        let canonical = c14n::canonicalize_element(
            &unsigned,
            NS_DS,
            "SignedInfo",
            &CanonicalizationMethod::from_uri(EXC_C14N).unwrap(),
        )
        .unwrap();
        let value = b64(&self.signer.signing_key().sign(&canonical).to_bytes());

        let signed = self.document(&signed_info, &value, "");
        if !self.timestamp_manifest {
            return signed;
        }
        let signature_value = c14n::canonicalize_by_id(
            &signed,
            "signature-value",
            &CanonicalizationMethod::default(),
        )
        .unwrap();
        self.document(&signed_info, &value, &b64(&ALG.digest(&signature_value)))
    }

    fn signed_info(&self, props_digest: &str) -> String {
        let references: String = self
            .references
            .iter()
            .map(|(uri, digest)| {
                format!(
                    r#"<ds:Reference URI="{uri}"><ds:DigestMethod Algorithm="{SHA256_URI}"/><ds:DigestValue>{digest}</ds:DigestValue></ds:Reference>"#
                )
            })
            .collect();
        format!(
            r##"<ds:SignedInfo><ds:CanonicalizationMethod Algorithm="{EXC_C14N}"/><ds:SignatureMethod Algorithm="{ED25519_URI}"/>{references}<ds:Reference Type="http://uri.etsi.org/01903#SignedProperties" URI="#signed-properties"><ds:Transforms><ds:Transform Algorithm="{C14N_11}"/></ds:Transforms><ds:DigestMethod Algorithm="{SHA256_URI}"/><ds:DigestValue>{props_digest}</ds:DigestValue></ds:Reference></ds:SignedInfo>"##
        )
    }

    fn document(&self, signed_info: &str, value: &str, manifest_digest: &str) -> String {
        let key_info = if self.key_info {
            format!(
                "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
                b64(self.signer.cert.der())
            )
        } else {
            String::new()
        };

        let mut unsigned = String::new();
        if !self.extra_certs.is_empty() {
            unsigned.push_str("<xades:CompleteCertificateRefs><xades:CertRefs>");
            for (i, cert) in self.extra_certs.iter().enumerate() {
                unsigned.push_str(&format!(
                    r##"<xades:Cert URI="#cert-{i}"><xades:CertDigest><ds:DigestMethod Algorithm="{SHA256_URI}"/><ds:DigestValue>{}</ds:DigestValue></xades:CertDigest></xades:Cert>"##,
                    digest_b64(cert.der())
                ));
            }
            unsigned.push_str("</xades:CertRefs></xades:CompleteCertificateRefs><xades:CertificateValues>");
            for (i, cert) in self.extra_certs.iter().enumerate() {
                unsigned.push_str(&format!(
                    r#"<xades:EncapsulatedX509Certificate Id="cert-{i}">{}</xades:EncapsulatedX509Certificate>"#,
                    b64(cert.der())
                ));
            }
            unsigned.push_str("</xades:CertificateValues>");
        }
        if !self.ocsp_responses.is_empty() {
            unsigned.push_str("<xades:RevocationValues><xades:OCSPValues>");
            for response in &self.ocsp_responses {
                unsigned.push_str(&format!(
                    "<xades:EncapsulatedOCSPValue>{}</xades:EncapsulatedOCSPValue>",
                    b64(response)
                ));
            }
            unsigned.push_str("</xades:OCSPValues></xades:RevocationValues>");
        }

        let manifests = if self.timestamp_manifest {
            format!(
                r##"<ds:Object><ds:Manifest Id="ts-root-manifest"><ds:Reference URI="#ts-manifest-0"><ds:DigestMethod Algorithm="{SHA256_URI}"/><ds:DigestValue>AAAA</ds:DigestValue></ds:Reference></ds:Manifest><ds:Manifest Id="ts-manifest-0"><ds:Reference URI="#signature-value"><ds:DigestMethod Algorithm="{SHA256_URI}"/><ds:DigestValue>{}</ds:DigestValue></ds:Reference></ds:Manifest></ds:Object>"##,
                if manifest_digest.is_empty() { "AAAA" } else { manifest_digest }
            )
        } else {
            String::new()
        };

        format!(
            r##"<asic:XAdESSignatures xmlns:asic="http://uri.etsi.org/02918/v1.2.1#" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:xades="http://uri.etsi.org/01903/v1.3.2#"><ds:Signature Id="signature">{signed_info}<ds:SignatureValue Id="signature-value">{value}</ds:SignatureValue>{key_info}<ds:Object><xades:QualifyingProperties Target="#signature"><xades:SignedProperties Id="signed-properties"><xades:SignedSignatureProperties><xades:SigningTime>2014-09-30T10:00:00Z</xades:SigningTime></xades:SignedSignatureProperties></xades:SignedProperties><xades:UnsignedProperties><xades:UnsignedSignatureProperties>{unsigned}</xades:UnsignedSignatureProperties></xades:UnsignedProperties></xades:QualifyingProperties></ds:Object>{manifests}</ds:Signature></asic:XAdESSignatures>"##
        )
    }
}

/// Hash chain over `parts`, one step, and its result document.
pub fn hash_chain(parts: &[(&str, &[u8])]) -> (String, String) {
    let data_refs: String = parts
        .iter()
        .map(|(uri, data)| {
            format!(
                r#"<DataRef URI="{uri}"><ds:DigestValue>{}</ds:DigestValue></DataRef>"#,
                digest_b64(data)
            )
        })
        .collect();
    let chain = format!(
        r#"<HashChain xmlns="{NS_HASHCHAIN}" xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><DefaultDigestMethod Algorithm="{SHA256_URI}"/><HashStep id="STEP0">{data_refs}</HashStep></HashChain>"#
    );

    let digests: Vec<DigestValue> = parts
        .iter()
        .map(|(_, data)| DigestValue::compute(ALG, data))
        .collect();
    let step = concat_digests(&digests).unwrap();
    let result = format!(
        r#"<HashChainResult xmlns="{NS_HASHCHAIN}" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" URI="{SIG_HASH_CHAIN}#STEP0"><ds:DigestMethod Algorithm="{SHA256_URI}"/><ds:DigestValue>{}</ds:DigestValue></HashChainResult>"#,
        digest_b64(&step)
    );
    (chain, result)
}

/// What the orchestrator handed to the chain verifier.
#[derive(Debug, Clone)]
pub struct ChainCall {
    pub instance: String,
    pub leaf: Certificate,
    pub extra_certs: Vec<Certificate>,
    pub ocsp_responses: Vec<Vec<u8>>,
    pub at: DateTime<Utc>,
}

/// Records its input and answers with a fixed outcome.
#[derive(Default)]
pub struct FakeChainVerifier {
    pub outcome: Option<CertChainError>,
    pub calls: RefCell<Vec<ChainCall>>,
}

impl FakeChainVerifier {
    pub fn failing(error: CertChainError) -> Self {
        Self {
            outcome: Some(error),
            calls: RefCell::default(),
        }
    }
}

impl CertChainVerifier for FakeChainVerifier {
    fn verify(
        &self,
        instance: &str,
        leaf: &Certificate,
        extra_certs: &[Certificate],
        ocsp_responses: &[Vec<u8>],
        at: DateTime<Utc>,
    ) -> Result<(), CertChainError> {
        self.calls.borrow_mut().push(ChainCall {
            instance: instance.to_string(),
            leaf: leaf.clone(),
            extra_certs: extra_certs.to_vec(),
            ocsp_responses: ocsp_responses.to_vec(),
            at,
        });
        match &self.outcome {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
