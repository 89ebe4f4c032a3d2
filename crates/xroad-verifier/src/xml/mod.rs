//! XML helpers shared by the signature and hash chain parsers.
//!
//! Documents are parsed with `roxmltree` (DTDs rejected). Lookups match on
//! namespace URI plus local name, never on the prefix used in the source.

pub mod c14n;

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use roxmltree::{Document, Node};

pub const NS_DS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const NS_XADES: &str = "http://uri.etsi.org/01903/v1.3.2#";
pub const NS_ASIC: &str = "http://uri.etsi.org/02918/v1.2.1#";
pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XML-level failures.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("element not found: {0}")]
    NotFound(String),

    #[error("duplicate Id attribute value: {0}")]
    DuplicateId(String),
}

/// Parse `xml`, rejecting DTDs.
pub fn parse(xml: &str) -> Result<Document<'_>, XmlError> {
    Ok(Document::parse(xml)?)
}

/// Whether `node` is the element `{ns}local`.
pub(crate) fn is(node: Node<'_, '_>, ns: &str, local: &str) -> bool {
    node.is_element() && node.tag_name().name() == local && node.tag_name().namespace() == Some(ns)
}

/// First child element `{ns}local`.
pub(crate) fn child<'a, 'input>(
    node: Node<'a, 'input>,
    ns: &str,
    local: &str,
) -> Option<Node<'a, 'input>> {
    node.children().find(|c| is(*c, ns, local))
}

/// All child elements `{ns}local`.
pub(crate) fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    ns: &'a str,
    local: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |c| is(*c, ns, local))
}

/// First child element with the given local name, any namespace.
pub(crate) fn child_local<'a, 'input>(
    node: Node<'a, 'input>,
    local: &str,
) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == local)
}

/// All child elements, skipping text, comments and PIs.
pub(crate) fn element_children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(|c| c.is_element())
}

/// First descendant element `{ns}local` (including `node` itself).
pub(crate) fn descendant<'a, 'input>(
    node: Node<'a, 'input>,
    ns: &str,
    local: &str,
) -> Option<Node<'a, 'input>> {
    node.descendants().find(|d| is(*d, ns, local))
}

const ID_ATTRIBUTES: [&str; 3] = ["Id", "ID", "id"];

fn ids<'a>(node: Node<'a, '_>) -> impl Iterator<Item = &'a str> {
    let mut ids: Vec<&'a str> = ID_ATTRIBUTES
        .iter()
        .filter_map(|name| node.attribute(*name))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids.into_iter()
}

/// Element carrying `Id`, `ID` or `id` equal to `id`.
///
/// An id carried by more than one element is an error: the element that was
/// digested and the element that is consumed could differ.
pub(crate) fn find_by_id<'a, 'input>(
    doc: &'a Document<'input>,
    id: &str,
) -> Result<Option<Node<'a, 'input>>, XmlError> {
    let mut found = doc
        .descendants()
        .filter(|n| n.is_element() && ids(*n).any(|candidate| candidate == id));
    let first = found.next();
    if found.next().is_some() {
        return Err(XmlError::DuplicateId(id.to_string()));
    }
    Ok(first)
}

/// Reject documents in which two elements carry the same id.
pub(crate) fn ensure_unique_ids(doc: &Document<'_>) -> Result<(), XmlError> {
    let mut seen = HashSet::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        for id in ids(node) {
            if !seen.insert(id) {
                return Err(XmlError::DuplicateId(id.to_string()));
            }
        }
    }
    Ok(())
}

/// Concatenated text content of `node`.
pub(crate) fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|d| d.is_text())
        .filter_map(|d| d.text())
        .collect()
}

/// Base64-decode element text, tolerating embedded whitespace.
pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}

/// Base64 content of `node`.
pub(crate) fn base64_content(node: Node<'_, '_>) -> Result<Vec<u8>, base64::DecodeError> {
    decode_base64(&text_content(node))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<a:root xmlns:a="urn:a" xmlns:b="urn:b">
  <b:item Id="one">QUJD
  REVG</b:item>
  <b:item id="two"/>
</a:root>"#;

    #[test]
    fn test_lookup_ignores_prefix() {
        let doc = parse(DOC).unwrap();
        let root = doc.root_element();
        assert!(is(root, "urn:a", "root"));
        assert_eq!(children(root, "urn:b", "item").count(), 2);
        assert!(child(root, "urn:a", "item").is_none());
        assert!(child_local(root, "item").is_some());
    }

    #[test]
    fn test_find_by_id_accepts_variants() {
        let doc = parse(DOC).unwrap();
        assert!(find_by_id(&doc, "one").unwrap().is_some());
        assert!(find_by_id(&doc, "two").unwrap().is_some());
        assert!(find_by_id(&doc, "three").unwrap().is_none());
        ensure_unique_ids(&doc).unwrap();
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let xml = r#"<root><a Id="x"/><b><c ID="x"/></b><d Id="y" id="y"/></root>"#;
        let doc = parse(xml).unwrap();
        assert!(matches!(
            find_by_id(&doc, "x"),
            Err(XmlError::DuplicateId(id)) if id == "x"
        ));
        // One element naming itself twice is not a duplicate.
        assert!(find_by_id(&doc, "y").unwrap().is_some());
        assert!(matches!(
            ensure_unique_ids(&doc),
            Err(XmlError::DuplicateId(id)) if id == "x"
        ));
    }

    #[test]
    fn test_base64_with_whitespace() {
        let doc = parse(DOC).unwrap();
        let item = find_by_id(&doc, "one").unwrap().unwrap();
        assert_eq!(base64_content(item).unwrap(), b"ABCDEF");
    }

    #[test]
    fn test_dtd_is_rejected() {
        let xml = r#"<!DOCTYPE x [<!ENTITY e "boom">]><x>&e;</x>"#;
        assert!(parse(xml).is_err());
    }
}
