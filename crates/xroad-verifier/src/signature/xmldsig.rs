//! XML-DSig core validation: `SignatureValue` over canonical `SignedInfo`,
//! `Reference` digests, and `ds:Manifest` references.

use roxmltree::{Document, Node};

use super::{element_not_found, Signature};
use crate::cert::Certificate;
use crate::crypto::{SignatureAlgorithm, SignatureEncoding};
use crate::digest::{DigestAlgorithm, DigestValue};
use crate::error::{VerificationError, VerificationResult};
use crate::resolver::ReferenceResolver;
use crate::xml::c14n::{self, CanonicalizationMethod};
use crate::xml::{self, NS_DS};

const TRANSFORM_ENVELOPED: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
const NS_EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transform {
    Enveloped,
    Canonicalize(CanonicalizationMethod),
}

/// A parsed `ds:Reference`.
#[derive(Debug, Clone)]
struct Reference<'a> {
    uri: &'a str,
    transforms: Vec<Transform>,
    digest: DigestValue,
}

/// Why a reference did not verify.
#[derive(Debug)]
enum ReferenceFailure {
    /// Content could not be located.
    Missing(String),
    /// Digest differs.
    Mismatch(String),
    /// Reference itself is unusable.
    Malformed(String),
}

/// Verify `SignatureValue` with `cert`, then every `SignedInfo` reference.
///
/// Same-document references (`#id`, `""`) are resolved locally; everything
/// else goes through `resolver`.
pub fn verify_signature_value(
    signature: &Signature<'_>,
    cert: &Certificate,
    resolver: &dyn ReferenceResolver,
) -> VerificationResult<()> {
    let signature_element = signature.signature_element()?;
    let signed_info = signature.signed_info()?;

    // 1. SignedInfo canonicalization and SignatureMethod
    let c14n_node = xml::child(signed_info, NS_DS, "CanonicalizationMethod")
        .ok_or_else(|| element_not_found("ds:CanonicalizationMethod"))?;
    let c14n_method = canonicalization_method(c14n_node).map_err(invalid_signature)?;
    let method_uri = xml::child(signed_info, NS_DS, "SignatureMethod")
        .and_then(|n| n.attribute("Algorithm"))
        .ok_or_else(|| element_not_found("ds:SignatureMethod"))?;
    let algorithm = SignatureAlgorithm::from_xml_uri(method_uri).ok_or_else(|| {
        VerificationError::invalid_signature_value(format!(
            "Unsupported signature method: {}",
            method_uri
        ))
    })?;

    // 2. SignatureValue
    let canonical = c14n::canonicalize(signed_info, &c14n_method, None);
    let value = signature.signature_value()?;
    cert.verify(algorithm, &canonical, &value, SignatureEncoding::Xml)
        .map_err(|e| {
            tracing::warn!(signer = %cert.subject(), error = %e, "signature value check failed");
            VerificationError::invalid_signature_value("Signature is not valid")
        })?;

    // 3. References
    let doc = signature.document();
    for node in xml::children(signed_info, NS_DS, "Reference") {
        let reference = parse_reference(node).map_err(invalid_signature)?;
        match verify_reference(doc, signature_element, &reference, Some(resolver)) {
            Ok(()) => {}
            Err(ReferenceFailure::Missing(uri)) => {
                tracing::warn!(reference = %uri, "signature reference not resolvable");
                return Err(VerificationError::invalid_signature_value(format!(
                    "Could not resolve reference {}",
                    uri
                )));
            }
            Err(ReferenceFailure::Mismatch(uri)) => {
                tracing::warn!(reference = %uri, "signature reference digest mismatch");
                return Err(VerificationError::invalid_signature_value(format!(
                    "Reference {} digest does not match",
                    uri
                )));
            }
            Err(ReferenceFailure::Malformed(reason)) => return Err(invalid_signature(reason)),
        }
    }

    Ok(())
}

/// Verify every reference of a `ds:Manifest` against the local document.
pub fn verify_manifest(signature: &Signature<'_>, manifest: Node<'_, '_>) -> VerificationResult<()> {
    let signature_element = signature.signature_element()?;
    let id = manifest.attribute("Id").unwrap_or_default();

    for node in xml::children(manifest, NS_DS, "Reference") {
        let reference = parse_reference(node).map_err(VerificationError::invalid_reference)?;
        match verify_reference(signature.document(), signature_element, &reference, None) {
            Ok(()) => {}
            Err(ReferenceFailure::Missing(uri)) => {
                return Err(VerificationError::invalid_reference(format!(
                    "Could not find {}",
                    uri
                )));
            }
            Err(ReferenceFailure::Mismatch(uri)) => {
                tracing::warn!(manifest = id, reference = %uri, "manifest reference digest mismatch");
                return Err(VerificationError::invalid_reference(format!(
                    "Timestamp manifest verification failed for {}",
                    id
                )));
            }
            Err(ReferenceFailure::Malformed(reason)) => {
                return Err(VerificationError::invalid_reference(reason));
            }
        }
    }

    Ok(())
}

fn verify_reference(
    doc: &Document<'_>,
    signature_element: Node<'_, '_>,
    reference: &Reference<'_>,
    resolver: Option<&dyn ReferenceResolver>,
) -> Result<(), ReferenceFailure> {
    let uri = reference.uri;
    let canonicalization = reference.transforms.iter().rev().find_map(|t| match t {
        Transform::Canonicalize(method) => Some(method.clone()),
        Transform::Enveloped => None,
    });
    let excluded = reference
        .transforms
        .contains(&Transform::Enveloped)
        .then(|| signature_element.id());

    let data = if uri.is_empty() {
        // Whole document; comments are stripped unless a transform says otherwise.
        let method = canonicalization.unwrap_or_default();
        c14n::canonicalize(doc.root(), &method, excluded)
    } else if let Some(id) = uri.strip_prefix('#') {
        let node = xml::find_by_id(doc, id)
            .map_err(|e| ReferenceFailure::Malformed(e.to_string()))?
            .ok_or_else(|| ReferenceFailure::Missing(uri.to_string()))?;
        let method = canonicalization.unwrap_or_default();
        c14n::canonicalize(node, &method, excluded)
    } else {
        let resolver = resolver.ok_or_else(|| ReferenceFailure::Missing(uri.to_string()))?;
        if !resolver.should_resolve(uri, &reference.digest) {
            tracing::debug!(reference = %uri, "resolver trusts declared digest");
            return Ok(());
        }
        let bytes = resolver
            .resolve(uri)
            .ok_or_else(|| ReferenceFailure::Missing(uri.to_string()))?;
        match canonicalization {
            Some(method) => canonicalize_bytes(&bytes, &method)
                .map_err(|e| ReferenceFailure::Malformed(format!("{}: {}", uri, e)))?,
            None => bytes,
        }
    };

    if reference.digest.matches(&data) {
        Ok(())
    } else {
        Err(ReferenceFailure::Mismatch(uri.to_string()))
    }
}

fn canonicalize_bytes(
    bytes: &[u8],
    method: &CanonicalizationMethod,
) -> Result<Vec<u8>, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
    c14n::canonicalize_document(text, method).map_err(|e| e.to_string())
}

fn parse_reference<'a>(node: Node<'a, '_>) -> Result<Reference<'a>, String> {
    let uri = node.attribute("URI").unwrap_or_default();

    let mut transforms = Vec::new();
    if let Some(list) = xml::child(node, NS_DS, "Transforms") {
        for transform in xml::children(list, NS_DS, "Transform") {
            let algorithm = transform.attribute("Algorithm").unwrap_or_default();
            if algorithm == TRANSFORM_ENVELOPED {
                transforms.push(Transform::Enveloped);
            } else {
                transforms.push(Transform::Canonicalize(canonicalization_method(transform)?));
            }
        }
    }

    let digest_uri = xml::child(node, NS_DS, "DigestMethod")
        .and_then(|n| n.attribute("Algorithm"))
        .ok_or_else(|| format!("Reference {} has no DigestMethod", uri))?;
    let algorithm = DigestAlgorithm::from_uri(digest_uri)
        .ok_or_else(|| format!("Unsupported digest method: {}", digest_uri))?;
    let value = xml::child(node, NS_DS, "DigestValue")
        .ok_or_else(|| format!("Reference {} has no DigestValue", uri))?;
    let value = xml::base64_content(value)
        .map_err(|e| format!("Reference {} has invalid DigestValue: {}", uri, e))?;

    Ok(Reference {
        uri,
        transforms,
        digest: DigestValue::new(algorithm, value),
    })
}

/// Method named by `Algorithm`, with an exclusive-c14n `PrefixList` if present.
fn canonicalization_method(node: Node<'_, '_>) -> Result<CanonicalizationMethod, String> {
    let uri = node.attribute("Algorithm").unwrap_or_default();
    let method = CanonicalizationMethod::from_uri(uri)
        .ok_or_else(|| format!("Unsupported canonicalization method: {}", uri))?;
    let prefixes = xml::child(node, NS_EXC_C14N, "InclusiveNamespaces")
        .and_then(|n| n.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect::<Vec<_>>());
    Ok(match prefixes {
        Some(prefixes) => method.with_inclusive_prefixes(prefixes),
        None => method,
    })
}

fn invalid_signature(reason: String) -> VerificationError {
    VerificationError::invalid_signature_value(reason)
}
