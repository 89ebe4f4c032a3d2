//! XAdES signature documents.
//!
//! An X-Road signature is an `asic:XAdESSignatures` container holding one
//! `ds:Signature`. Besides the XML-DSig core it carries the evidence needed
//! for offline verification:
//!
//! - the signing certificate in `ds:KeyInfo`
//! - extra certificates in `xades:CertificateValues`, referenced with digests
//!   from `xades:CompleteCertificateRefs`
//! - OCSP responses in `xades:RevocationValues`
//! - an optional signature timestamp and timestamp manifests
//!
//! [`Signature`] borrows the XML text; all accessors read from the parsed tree.

pub mod schema;
pub mod xmldsig;

use roxmltree::{Document, Node};

use crate::cert::Certificate;
use crate::digest::{DigestAlgorithm, DigestValue};
use crate::error::{VerificationError, VerificationResult};
use crate::xml::{self, NS_DS, NS_XADES};

/// `Id` of the manifest listing the timestamp manifests.
pub const ID_TS_ROOT_MANIFEST: &str = "ts-root-manifest";

/// Parsed signature document.
pub struct Signature<'a> {
    doc: Document<'a>,
}

impl std::fmt::Debug for Signature<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signature")
            .field("root", &self.doc.root_element().tag_name().name())
            .finish()
    }
}

impl<'a> Signature<'a> {
    /// Parse a signature container or a bare `ds:Signature`.
    pub fn parse(xml: &'a str) -> VerificationResult<Self> {
        let doc = xml::parse(xml)
            .map_err(|e| VerificationError::malformed(format!("Could not parse signature: {}", e)))?;
        xml::ensure_unique_ids(&doc).map_err(|e| VerificationError::malformed(e.to_string()))?;
        let signature = Self { doc };
        signature.signature_element()?;
        signature.object_element()?;
        Ok(signature)
    }

    pub fn document(&self) -> &Document<'a> {
        &self.doc
    }

    /// The `ds:Signature` element.
    pub fn signature_element(&self) -> VerificationResult<Node<'_, 'a>> {
        xml::descendant(self.doc.root(), NS_DS, "Signature")
            .ok_or_else(|| element_not_found("ds:Signature"))
    }

    /// The first `ds:Object` of the signature.
    fn object_element(&self) -> VerificationResult<Node<'_, 'a>> {
        xml::child(self.signature_element()?, NS_DS, "Object")
            .ok_or_else(|| element_not_found("ds:Object"))
    }

    pub fn signed_info(&self) -> VerificationResult<Node<'_, 'a>> {
        xml::child(self.signature_element()?, NS_DS, "SignedInfo")
            .ok_or_else(|| element_not_found("ds:SignedInfo"))
    }

    /// Whether `SignedInfo` has a reference to `uri`.
    pub fn references(&self, uri: &str) -> bool {
        self.signed_info().is_ok_and(|signed_info| {
            xml::children(signed_info, NS_DS, "Reference")
                .any(|r| r.attribute("URI") == Some(uri))
        })
    }

    /// Decoded `ds:SignatureValue`.
    pub fn signature_value(&self) -> VerificationResult<Vec<u8>> {
        let node = xml::child(self.signature_element()?, NS_DS, "SignatureValue")
            .ok_or_else(|| element_not_found("ds:SignatureValue"))?;
        xml::base64_content(node)
            .map_err(|e| VerificationError::malformed(format!("Invalid SignatureValue: {}", e)))
    }

    /// Certificate in `ds:KeyInfo/ds:X509Data`, if present.
    pub fn signing_certificate(&self) -> VerificationResult<Option<Certificate>> {
        let node = xml::child(self.signature_element()?, NS_DS, "KeyInfo")
            .and_then(|key_info| xml::child(key_info, NS_DS, "X509Data"))
            .and_then(|data| xml::child(data, NS_DS, "X509Certificate"));
        match node {
            Some(node) => decode_certificate(node).map(Some),
            None => Ok(None),
        }
    }

    /// Certificates referenced from `CompleteCertificateRefs`, each checked
    /// against its `CertDigest`.
    pub fn extra_certificates(&self) -> VerificationResult<Vec<Certificate>> {
        let Some(cert_refs) = self
            .unsigned_signature_properties()?
            .and_then(|props| xml::child(props, NS_XADES, "CompleteCertificateRefs"))
            .and_then(|refs| xml::child(refs, NS_XADES, "CertRefs"))
        else {
            return Ok(Vec::new());
        };

        let mut certs = Vec::new();
        for cert_ref in xml::children(cert_refs, NS_XADES, "Cert") {
            let uri = cert_ref
                .attribute("URI")
                .filter(|uri| !uri.is_empty())
                .ok_or_else(|| VerificationError::malformed("Missing certificate id attribute"))?;
            let id = uri.strip_prefix('#').unwrap_or(uri);
            let cert_node = self.find_by_id(id)?.ok_or_else(|| {
                VerificationError::malformed(format!("Could not find certificate with id {}", uri))
            })?;
            let cert = decode_certificate(cert_node)?;

            let expected = xml::child(cert_ref, NS_XADES, "CertDigest")
                .ok_or_else(|| element_not_found("xades:CertDigest"))
                .and_then(digest_alg_and_value)?;
            if !expected.matches(cert.der()) {
                return Err(VerificationError::malformed(format!(
                    "Certificate ({}) digest does not match",
                    cert.serial_hex()
                )));
            }
            certs.push(cert);
        }
        Ok(certs)
    }

    /// DER of every `EncapsulatedOCSPValue`.
    pub fn ocsp_responses(&self) -> VerificationResult<Vec<Vec<u8>>> {
        let values: Vec<Node<'_, 'a>> = self
            .unsigned_signature_properties()?
            .and_then(|props| xml::child(props, NS_XADES, "RevocationValues"))
            .and_then(|values| xml::child(values, NS_XADES, "OCSPValues"))
            .map(|ocsp| xml::children(ocsp, NS_XADES, "EncapsulatedOCSPValue").collect())
            .unwrap_or_default();

        if values.is_empty() {
            return Err(VerificationError::malformed(
                "Could not get any OCSP elements from signature",
            ));
        }

        values
            .into_iter()
            .map(|node| {
                xml::base64_content(node).map_err(|e| {
                    VerificationError::malformed(format!("Invalid EncapsulatedOCSPValue: {}", e))
                })
            })
            .collect()
    }

    /// Manifests listed in the timestamp root manifest; empty when there is
    /// no root manifest.
    pub fn timestamp_manifests(&self) -> VerificationResult<Vec<Node<'_, 'a>>> {
        let Some(root) = self.find_by_id(ID_TS_ROOT_MANIFEST)? else {
            return Ok(Vec::new());
        };
        let mut manifests = Vec::new();
        for uri in xml::children(root, NS_DS, "Reference").filter_map(|r| r.attribute("URI")) {
            if let Some(manifest) = self.find_by_id(uri.strip_prefix('#').unwrap_or(uri))? {
                manifests.push(manifest);
            }
        }
        Ok(manifests)
    }

    fn find_by_id(&self, id: &str) -> VerificationResult<Option<Node<'_, 'a>>> {
        xml::find_by_id(&self.doc, id).map_err(|e| VerificationError::malformed(e.to_string()))
    }

    /// Encapsulated signature timestamp token, if the signature was stamped.
    pub fn signature_timestamp(&self) -> VerificationResult<Option<Vec<u8>>> {
        let root = self.doc.root();
        let node = xml::descendant(root, NS_XADES, "EncapsulatedTimeStamp")
            .or_else(|| xml::descendant(root, NS_XADES, "SignatureTimeStamp"));
        match node {
            Some(node) => xml::base64_content(node).map(Some).map_err(|e| {
                VerificationError::malformed(format!("Invalid EncapsulatedTimeStamp: {}", e))
            }),
            None => Ok(None),
        }
    }

    fn unsigned_signature_properties(&self) -> VerificationResult<Option<Node<'_, 'a>>> {
        Ok(xml::child(self.object_element()?, NS_XADES, "QualifyingProperties")
            .and_then(|qp| xml::child(qp, NS_XADES, "UnsignedProperties"))
            .and_then(|up| xml::child(up, NS_XADES, "UnsignedSignatureProperties")))
    }
}

/// `{ds:DigestMethod, ds:DigestValue}` pair as used by `CertDigest`.
fn digest_alg_and_value(node: Node<'_, '_>) -> VerificationResult<DigestValue> {
    let method = xml::child(node, NS_DS, "DigestMethod")
        .ok_or_else(|| element_not_found("ds:DigestMethod"))?;
    let uri = method.attribute("Algorithm").unwrap_or_default();
    let algorithm = DigestAlgorithm::from_uri(uri)
        .ok_or_else(|| VerificationError::malformed(format!("Unsupported digest method: {}", uri)))?;
    let value = xml::child(node, NS_DS, "DigestValue")
        .ok_or_else(|| element_not_found("ds:DigestValue"))?;
    let value = xml::base64_content(value)
        .map_err(|e| VerificationError::malformed(format!("Invalid DigestValue: {}", e)))?;
    Ok(DigestValue::new(algorithm, value))
}

fn decode_certificate(node: Node<'_, '_>) -> VerificationResult<Certificate> {
    let der = xml::base64_content(node).map_err(|e| {
        VerificationError::malformed(format!(
            "Invalid certificate in {}: {}",
            node.tag_name().name(),
            e
        ))
    })?;
    Certificate::from_der(&der).map_err(|e| VerificationError::malformed(e.to_string()))
}

pub(crate) fn element_not_found(tag: &str) -> VerificationError {
    VerificationError::malformed(format!("Could not find element \"{}\"", tag))
}
