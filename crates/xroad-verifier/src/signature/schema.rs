//! Structural validation of the XAdES subset used by X-Road signatures.
//!
//! Checks element order and cardinality, required attributes and base64
//! payloads. Elements outside the subset are rejected where the content
//! model is closed (XML-DSig core, certificate and revocation values) and
//! tolerated inside signed properties.

use roxmltree::Node;

use super::Signature;
use crate::error::{VerificationError, VerificationResult};
use crate::xml::{self, NS_ASIC, NS_DS, NS_XADES};

/// Validate the signature's structure.
pub fn validate(signature: &Signature<'_>) -> VerificationResult<()> {
    check_document(signature.document().root_element()).map_err(|reason| {
        tracing::warn!(%reason, "signature schema validation failed");
        VerificationError::malformed(format!("Signature schema validation failed: {}", reason))
    })
}

type Check = Result<(), String>;

#[derive(Clone, Copy)]
struct Particle {
    ns: &'static str,
    name: &'static str,
    min: usize,
    max: usize,
}

const fn one(ns: &'static str, name: &'static str) -> Particle {
    Particle { ns, name, min: 1, max: 1 }
}

const fn opt(ns: &'static str, name: &'static str) -> Particle {
    Particle { ns, name, min: 0, max: 1 }
}

const fn some(ns: &'static str, name: &'static str) -> Particle {
    Particle { ns, name, min: 1, max: usize::MAX }
}

const fn many(ns: &'static str, name: &'static str) -> Particle {
    Particle { ns, name, min: 0, max: usize::MAX }
}

/// Children of `node` must match `particles` in order.
fn sequence(node: Node<'_, '_>, particles: &[Particle]) -> Check {
    no_text(node)?;
    let mut children = xml::element_children(node).peekable();
    for particle in particles {
        let mut count = 0;
        while count < particle.max
            && children
                .peek()
                .is_some_and(|c| xml::is(*c, particle.ns, particle.name))
        {
            children.next();
            count += 1;
        }
        if count < particle.min {
            return Err(format!(
                "{} requires {} {}",
                label(node),
                particle.name,
                if particle.min == 1 { "element" } else { "elements" }
            ));
        }
    }
    match children.next() {
        Some(extra) => Err(format!("Unexpected element {} in {}", label(extra), label(node))),
        None => Ok(()),
    }
}

/// Element-only content may carry whitespace between children.
fn no_text(node: Node<'_, '_>) -> Check {
    let stray = node
        .children()
        .filter(|c| c.is_text())
        .any(|c| c.text().is_some_and(|t| !t.trim().is_empty()));
    if stray {
        Err(format!("Unexpected text content in {}", label(node)))
    } else {
        Ok(())
    }
}

fn required_attr(node: Node<'_, '_>, name: &str) -> Check {
    match node.attribute(name) {
        Some(value) if !value.is_empty() => Ok(()),
        _ => Err(format!("{} is missing attribute {}", label(node), name)),
    }
}

fn base64(node: Node<'_, '_>) -> Check {
    xml::base64_content(node)
        .map(|_| ())
        .map_err(|e| format!("{} is not valid base64: {}", label(node), e))
}

fn label(node: Node<'_, '_>) -> String {
    match node.tag_name().namespace() {
        Some(NS_DS) => format!("ds:{}", node.tag_name().name()),
        Some(NS_XADES) => format!("xades:{}", node.tag_name().name()),
        Some(NS_ASIC) => format!("asic:{}", node.tag_name().name()),
        _ => node.tag_name().name().to_string(),
    }
}

fn check_document(root: Node<'_, '_>) -> Check {
    if xml::is(root, NS_ASIC, "XAdESSignatures") {
        sequence(root, &[one(NS_DS, "Signature")])?;
        let signature = xml::child(root, NS_DS, "Signature")
            .ok_or_else(|| "asic:XAdESSignatures requires Signature element".to_string())?;
        check_signature(signature)
    } else if xml::is(root, NS_DS, "Signature") {
        check_signature(root)
    } else {
        Err(format!("Unexpected root element {}", label(root)))
    }
}

fn check_signature(node: Node<'_, '_>) -> Check {
    sequence(
        node,
        &[
            one(NS_DS, "SignedInfo"),
            one(NS_DS, "SignatureValue"),
            opt(NS_DS, "KeyInfo"),
            many(NS_DS, "Object"),
        ],
    )?;
    for child in xml::element_children(node) {
        match child.tag_name().name() {
            "SignedInfo" => check_signed_info(child)?,
            "SignatureValue" => base64(child)?,
            "KeyInfo" => check_key_info(child)?,
            _ => check_object(child)?,
        }
    }
    Ok(())
}

fn check_signed_info(node: Node<'_, '_>) -> Check {
    sequence(
        node,
        &[
            one(NS_DS, "CanonicalizationMethod"),
            one(NS_DS, "SignatureMethod"),
            some(NS_DS, "Reference"),
        ],
    )?;
    for child in xml::element_children(node) {
        match child.tag_name().name() {
            "Reference" => check_reference(child)?,
            _ => required_attr(child, "Algorithm")?,
        }
    }
    Ok(())
}

fn check_reference(node: Node<'_, '_>) -> Check {
    sequence(
        node,
        &[
            opt(NS_DS, "Transforms"),
            one(NS_DS, "DigestMethod"),
            one(NS_DS, "DigestValue"),
        ],
    )?;
    if let Some(transforms) = xml::child(node, NS_DS, "Transforms") {
        sequence(transforms, &[some(NS_DS, "Transform")])?;
        for transform in xml::element_children(transforms) {
            required_attr(transform, "Algorithm")?;
        }
    }
    check_digest_alg_and_value(node)
}

fn check_digest_alg_and_value(node: Node<'_, '_>) -> Check {
    for child in xml::element_children(node) {
        match child.tag_name().name() {
            "DigestMethod" => required_attr(child, "Algorithm")?,
            "DigestValue" => base64(child)?,
            _ => {}
        }
    }
    Ok(())
}

fn check_key_info(node: Node<'_, '_>) -> Check {
    sequence(node, &[some(NS_DS, "X509Data")])?;
    for data in xml::element_children(node) {
        sequence(data, &[some(NS_DS, "X509Certificate")])?;
        for cert in xml::element_children(data) {
            base64(cert)?;
        }
    }
    Ok(())
}

fn check_object(node: Node<'_, '_>) -> Check {
    no_text(node)?;
    for child in xml::element_children(node) {
        if xml::is(child, NS_XADES, "QualifyingProperties") {
            check_qualifying_properties(child)?;
        } else if xml::is(child, NS_DS, "Manifest") {
            required_attr(child, "Id")?;
            sequence(child, &[some(NS_DS, "Reference")])?;
            for reference in xml::element_children(child) {
                check_reference(reference)?;
            }
        } else {
            return Err(format!("Unexpected element {} in {}", label(child), label(node)));
        }
    }
    Ok(())
}

fn check_qualifying_properties(node: Node<'_, '_>) -> Check {
    required_attr(node, "Target")?;
    sequence(
        node,
        &[
            opt(NS_XADES, "SignedProperties"),
            opt(NS_XADES, "UnsignedProperties"),
        ],
    )?;
    if let Some(signed) = xml::child(node, NS_XADES, "SignedProperties") {
        check_signed_properties(signed)?;
    }
    if let Some(unsigned) = xml::child(node, NS_XADES, "UnsignedProperties") {
        sequence(unsigned, &[opt(NS_XADES, "UnsignedSignatureProperties")])?;
        if let Some(props) = xml::child(unsigned, NS_XADES, "UnsignedSignatureProperties") {
            check_unsigned_signature_properties(props)?;
        }
    }
    Ok(())
}

fn check_signed_properties(node: Node<'_, '_>) -> Check {
    required_attr(node, "Id")?;
    sequence(
        node,
        &[
            opt(NS_XADES, "SignedSignatureProperties"),
            opt(NS_XADES, "SignedDataObjectProperties"),
        ],
    )?;
    let signing_certificate = xml::child(node, NS_XADES, "SignedSignatureProperties")
        .and_then(|props| xml::child(props, NS_XADES, "SigningCertificate"));
    if let Some(signing_certificate) = signing_certificate {
        check_cert_list(signing_certificate)?;
    }
    Ok(())
}

/// `xades:Cert+`, each with a `CertDigest`.
fn check_cert_list(node: Node<'_, '_>) -> Check {
    sequence(node, &[some(NS_XADES, "Cert")])?;
    for cert in xml::element_children(node) {
        sequence(
            cert,
            &[one(NS_XADES, "CertDigest"), opt(NS_XADES, "IssuerSerial")],
        )?;
        if let Some(digest) = xml::child(cert, NS_XADES, "CertDigest") {
            sequence(
                digest,
                &[one(NS_DS, "DigestMethod"), one(NS_DS, "DigestValue")],
            )?;
            check_digest_alg_and_value(digest)?;
        }
    }
    Ok(())
}

fn check_unsigned_signature_properties(node: Node<'_, '_>) -> Check {
    no_text(node)?;
    for child in xml::element_children(node) {
        if child.tag_name().namespace() != Some(NS_XADES) {
            return Err(format!("Unexpected element {} in {}", label(child), label(node)));
        }
        match child.tag_name().name() {
            "CompleteCertificateRefs" => {
                sequence(child, &[one(NS_XADES, "CertRefs")])?;
                if let Some(refs) = xml::child(child, NS_XADES, "CertRefs") {
                    check_cert_list(refs)?;
                }
            }
            "CompleteRevocationRefs" => {
                sequence(child, &[opt(NS_XADES, "OCSPRefs")])?;
            }
            "CertificateValues" => {
                sequence(child, &[many(NS_XADES, "EncapsulatedX509Certificate")])?;
                for cert in xml::element_children(child) {
                    base64(cert)?;
                }
            }
            "RevocationValues" => {
                sequence(child, &[opt(NS_XADES, "OCSPValues")])?;
                if let Some(values) = xml::child(child, NS_XADES, "OCSPValues") {
                    sequence(values, &[some(NS_XADES, "EncapsulatedOCSPValue")])?;
                    for value in xml::element_children(values) {
                        base64(value)?;
                    }
                }
            }
            "SignatureTimeStamp" => match xml::child(child, NS_XADES, "EncapsulatedTimeStamp") {
                Some(token) => base64(token)?,
                // Older signatures carry the token directly.
                None => base64(child)?,
            },
            _ => {
                return Err(format!("Unexpected element {} in {}", label(child), label(node)));
            }
        }
    }
    Ok(())
}
