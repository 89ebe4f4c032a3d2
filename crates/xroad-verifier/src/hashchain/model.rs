//! Hash chain and hash chain result documents.

use roxmltree::Node;

use super::HashChainError;
use crate::digest::{DigestAlgorithm, DigestValue};
use crate::xml::c14n::CanonicalizationMethod;
use crate::xml;

pub const NS_HASHCHAIN: &str = "http://x-road.eu/xsd/hashchain.xsd";

const TRANSFORM_ENVELOPED: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// `<HashChainResult URI="...#STEPn">` with the digest of the final step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashChainResult {
    pub uri: String,
    pub digest: DigestValue,
}

/// `<HashChain>`: a list of steps addressed by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashChain {
    pub default_digest_method: Option<DigestAlgorithm>,
    pub steps: Vec<HashStep>,
}

impl HashChain {
    pub fn step(&self, id: &str) -> Option<&HashStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashStep {
    pub id: String,
    pub values: Vec<StepValue>,
}

/// One input of a hash step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepValue {
    /// Digest given inline.
    HashValue {
        digest_method: Option<DigestAlgorithm>,
        digest_value: Vec<u8>,
    },
    /// Digest of another step's output.
    StepRef {
        uri: String,
        digest_method: Option<DigestAlgorithm>,
    },
    /// Digest of referenced data.
    DataRef {
        uri: String,
        transforms: Vec<CanonicalizationMethod>,
        digest_method: Option<DigestAlgorithm>,
        digest_value: Vec<u8>,
    },
}

impl StepValue {
    pub fn digest_method(&self) -> Option<DigestAlgorithm> {
        match self {
            Self::HashValue { digest_method, .. }
            | Self::StepRef { digest_method, .. }
            | Self::DataRef { digest_method, .. } => *digest_method,
        }
    }
}

/// Parse a hash chain result document.
pub fn parse_hash_chain_result(data: &[u8]) -> Result<HashChainResult, HashChainError> {
    let text = utf8(data)?;
    let doc = xml::parse(text).map_err(|e| malformed(format!("Parsing hash chain result failed: {}", e)))?;
    let root = doc.root_element();
    expect_root(root, "HashChainResult")?;

    let uri = required_attr(root, "URI")?;
    let algorithm = digest_method(root)?
        .ok_or_else(|| malformed("HashChainResult is missing DigestMethod"))?;
    let value = digest_value(root)?
        .ok_or_else(|| malformed("HashChainResult is missing DigestValue"))?;

    Ok(HashChainResult {
        uri,
        digest: DigestValue::new(algorithm, value),
    })
}

/// Parse a hash chain document.
pub fn parse_hash_chain(data: &[u8]) -> Result<HashChain, HashChainError> {
    let text = utf8(data)?;
    let doc = xml::parse(text).map_err(|e| malformed(format!("Parsing hash chain failed: {}", e)))?;
    let root = doc.root_element();
    expect_root(root, "HashChain")?;

    let default_digest_method = match xml::child_local(root, "DefaultDigestMethod") {
        Some(node) => Some(algorithm_attr(node)?),
        None => None,
    };

    let mut steps = Vec::new();
    for step in xml::children(root, NS_HASHCHAIN, "HashStep") {
        let id = required_attr(step, "id").or_else(|_| required_attr(step, "Id"))?;
        let mut values = Vec::new();
        for value in xml::element_children(step) {
            values.push(parse_value(value)?);
        }
        if values.is_empty() {
            return Err(malformed(format!("Hash step {} has no values", id)));
        }
        steps.push(HashStep { id, values });
    }
    if steps.is_empty() {
        return Err(malformed("Hash chain has no steps"));
    }

    Ok(HashChain {
        default_digest_method,
        steps,
    })
}

fn parse_value(node: Node<'_, '_>) -> Result<StepValue, HashChainError> {
    if node.tag_name().namespace() != Some(NS_HASHCHAIN) {
        return Err(malformed(format!(
            "Unexpected element in hash step: {}",
            node.tag_name().name()
        )));
    }

    match node.tag_name().name() {
        "HashValue" => Ok(StepValue::HashValue {
            digest_method: digest_method(node)?,
            digest_value: digest_value(node)?
                .ok_or_else(|| malformed("HashValue is missing DigestValue"))?,
        }),
        "StepRef" => Ok(StepValue::StepRef {
            uri: required_attr(node, "URI")?,
            digest_method: digest_method(node)?,
        }),
        "DataRef" => Ok(StepValue::DataRef {
            uri: required_attr(node, "URI")?,
            transforms: transforms(node)?,
            digest_method: digest_method(node)?,
            digest_value: digest_value(node)?
                .ok_or_else(|| malformed("DataRef is missing DigestValue"))?,
        }),
        other => Err(malformed(format!("Unexpected element in hash step: {}", other))),
    }
}

fn transforms(node: Node<'_, '_>) -> Result<Vec<CanonicalizationMethod>, HashChainError> {
    let Some(transforms) = xml::child_local(node, "Transforms") else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for transform in xml::element_children(transforms) {
        let algorithm = required_attr(transform, "Algorithm")?;
        if algorithm == TRANSFORM_ENVELOPED {
            // Hash chain inputs never embed a signature.
            continue;
        }
        let method = CanonicalizationMethod::from_uri(&algorithm)
            .ok_or_else(|| malformed(format!("Unsupported transform: {}", algorithm)))?;
        out.push(method);
    }
    Ok(out)
}

fn digest_method(node: Node<'_, '_>) -> Result<Option<DigestAlgorithm>, HashChainError> {
    match xml::child_local(node, "DigestMethod") {
        Some(dm) => Ok(Some(algorithm_attr(dm)?)),
        None => Ok(None),
    }
}

fn digest_value(node: Node<'_, '_>) -> Result<Option<Vec<u8>>, HashChainError> {
    match xml::child_local(node, "DigestValue") {
        Some(dv) => xml::base64_content(dv)
            .map(Some)
            .map_err(|e| malformed(format!("Invalid DigestValue: {}", e))),
        None => Ok(None),
    }
}

fn algorithm_attr(node: Node<'_, '_>) -> Result<DigestAlgorithm, HashChainError> {
    let uri = required_attr(node, "Algorithm")?;
    DigestAlgorithm::from_uri(&uri)
        .ok_or_else(|| malformed(format!("Unsupported digest method: {}", uri)))
}

fn required_attr(node: Node<'_, '_>, name: &str) -> Result<String, HashChainError> {
    node.attribute(name).map(str::to_string).ok_or_else(|| {
        malformed(format!(
            "{} is missing attribute {}",
            node.tag_name().name(),
            name
        ))
    })
}

fn expect_root(root: Node<'_, '_>, local: &str) -> Result<(), HashChainError> {
    if xml::is(root, NS_HASHCHAIN, local) {
        Ok(())
    } else {
        Err(malformed(format!(
            "Expected {{{}}}{}, found {}",
            NS_HASHCHAIN,
            local,
            root.tag_name().name()
        )))
    }
}

fn utf8(data: &[u8]) -> Result<&str, HashChainError> {
    std::str::from_utf8(data).map_err(|e| malformed(format!("Hash chain is not UTF-8: {}", e)))
}

fn malformed(reason: impl Into<String>) -> HashChainError {
    HashChainError::MalformedHashChain {
        reason: reason.into(),
    }
}
