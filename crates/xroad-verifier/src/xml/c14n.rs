//! XML canonicalization.
//!
//! Supports:
//!
//! - Canonical XML 1.0 and 1.1, with and without comments
//! - Exclusive XML Canonicalization 1.0, with and without comments, including
//!   the `InclusiveNamespaces PrefixList`
//! - Exclusion of one subtree (the `enveloped-signature` transform)
//!
//! Input is a `roxmltree` node: an element (document subset rooted at that
//! element) or the document root (whole document).

use std::collections::BTreeMap;

use roxmltree::{Node, NodeId, NodeType};

use super::{find_by_id, parse, XmlError, NS_XML};

pub const C14N_10: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const C14N_10_WITH_COMMENTS: &str =
    "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";
pub const C14N_11: &str = "http://www.w3.org/2006/12/xml-c14n11";
pub const C14N_11_WITH_COMMENTS: &str = "http://www.w3.org/2006/12/xml-c14n11#WithComments";
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const EXC_C14N_WITH_COMMENTS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";

/// Canonicalization algorithm and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalizationMethod {
    Inclusive {
        with_comments: bool,
    },
    Inclusive11 {
        with_comments: bool,
    },
    Exclusive {
        with_comments: bool,
        inclusive_prefixes: Vec<String>,
    },
}

impl Default for CanonicalizationMethod {
    fn default() -> Self {
        Self::Inclusive {
            with_comments: false,
        }
    }
}

impl CanonicalizationMethod {
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri.trim() {
            C14N_10 => Some(Self::Inclusive {
                with_comments: false,
            }),
            C14N_10_WITH_COMMENTS => Some(Self::Inclusive {
                with_comments: true,
            }),
            C14N_11 => Some(Self::Inclusive11 {
                with_comments: false,
            }),
            C14N_11_WITH_COMMENTS => Some(Self::Inclusive11 {
                with_comments: true,
            }),
            EXC_C14N => Some(Self::Exclusive {
                with_comments: false,
                inclusive_prefixes: Vec::new(),
            }),
            EXC_C14N_WITH_COMMENTS => Some(Self::Exclusive {
                with_comments: true,
                inclusive_prefixes: Vec::new(),
            }),
            _ => None,
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive {
                with_comments: false,
            } => C14N_10,
            Self::Inclusive {
                with_comments: true,
            } => C14N_10_WITH_COMMENTS,
            Self::Inclusive11 {
                with_comments: false,
            } => C14N_11,
            Self::Inclusive11 {
                with_comments: true,
            } => C14N_11_WITH_COMMENTS,
            Self::Exclusive {
                with_comments: false,
                ..
            } => EXC_C14N,
            Self::Exclusive {
                with_comments: true,
                ..
            } => EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Set the exclusive-c14n prefix list; `#default` names the default namespace.
    pub fn with_inclusive_prefixes(self, prefixes: Vec<String>) -> Self {
        match self {
            Self::Exclusive { with_comments, .. } => Self::Exclusive {
                with_comments,
                inclusive_prefixes: prefixes
                    .into_iter()
                    .map(|p| if p == "#default" { String::new() } else { p })
                    .collect(),
            },
            other => other,
        }
    }

    fn with_comments(&self) -> bool {
        match self {
            Self::Inclusive { with_comments }
            | Self::Inclusive11 { with_comments }
            | Self::Exclusive { with_comments, .. } => *with_comments,
        }
    }

    fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive { .. })
    }
}

/// Canonicalize the subtree rooted at `node`, skipping `excluded` if given.
pub fn canonicalize(
    node: Node<'_, '_>,
    method: &CanonicalizationMethod,
    excluded: Option<NodeId>,
) -> Vec<u8> {
    let mut c = Canonicalizer {
        method,
        excluded,
        out: Vec::new(),
    };
    if node.node_type() == NodeType::Root {
        c.write_document(node);
    } else {
        c.write_node(node, &BTreeMap::new(), true);
    }
    c.out
}

/// Parse `xml` and canonicalize the whole document.
pub fn canonicalize_document(
    xml: &str,
    method: &CanonicalizationMethod,
) -> Result<Vec<u8>, XmlError> {
    let doc = parse(xml)?;
    Ok(canonicalize(doc.root(), method, None))
}

/// Parse `xml` and canonicalize the element whose `Id` is `id`.
pub fn canonicalize_by_id(
    xml: &str,
    id: &str,
    method: &CanonicalizationMethod,
) -> Result<Vec<u8>, XmlError> {
    let doc = parse(xml)?;
    let node = find_by_id(&doc, id)?.ok_or_else(|| XmlError::NotFound(format!("#{}", id)))?;
    Ok(canonicalize(node, method, None))
}

/// Parse `xml` and canonicalize the first element `{ns}local`.
pub fn canonicalize_element(
    xml: &str,
    ns: &str,
    local: &str,
    method: &CanonicalizationMethod,
) -> Result<Vec<u8>, XmlError> {
    let doc = parse(xml)?;
    let node = doc
        .descendants()
        .find(|n| super::is(*n, ns, local))
        .ok_or_else(|| XmlError::NotFound(format!("{{{}}}{}", ns, local)))?;
    Ok(canonicalize(node, method, None))
}

type NsMap = BTreeMap<String, String>;

struct Canonicalizer<'m> {
    method: &'m CanonicalizationMethod,
    excluded: Option<NodeId>,
    out: Vec<u8>,
}

impl Canonicalizer<'_> {
    fn write_document(&mut self, root: Node<'_, '_>) {
        let mut seen_element = false;
        for child in root.children() {
            match child.node_type() {
                NodeType::Element => {
                    self.write_node(child, &BTreeMap::new(), true);
                    seen_element = true;
                }
                NodeType::PI => {
                    if seen_element {
                        self.out.push(b'\n');
                    }
                    self.write_pi(child);
                    if !seen_element {
                        self.out.push(b'\n');
                    }
                }
                NodeType::Comment if self.method.with_comments() => {
                    if seen_element {
                        self.out.push(b'\n');
                    }
                    self.write_comment(child);
                    if !seen_element {
                        self.out.push(b'\n');
                    }
                }
                // Whitespace outside the document element is not part of the output.
                _ => {}
            }
        }
    }

    fn write_node(&mut self, node: Node<'_, '_>, rendered: &NsMap, apex: bool) {
        if Some(node.id()) == self.excluded {
            return;
        }
        match node.node_type() {
            NodeType::Element => self.write_element(node, rendered, apex),
            NodeType::Text => {
                if let Some(text) = node.text() {
                    escape_text(text, &mut self.out);
                }
            }
            NodeType::Comment => {
                if self.method.with_comments() {
                    self.write_comment(node);
                }
            }
            NodeType::PI => self.write_pi(node),
            NodeType::Root => self.write_document(node),
        }
    }

    fn write_element(&mut self, el: Node<'_, '_>, parent_rendered: &NsMap, apex: bool) {
        let name = qualified_name(el);
        self.out.push(b'<');
        self.out.extend_from_slice(name.as_bytes());

        let mut rendered = parent_rendered.clone();
        let decls = if self.method.is_exclusive() {
            exclusive_declarations(el, parent_rendered, self.method)
        } else {
            inclusive_declarations(el, parent_rendered)
        };
        for (prefix, uri) in &decls {
            if prefix.is_empty() {
                self.out.extend_from_slice(b" xmlns=\"");
            } else {
                self.out.extend_from_slice(b" xmlns:");
                self.out.extend_from_slice(prefix.as_bytes());
                self.out.extend_from_slice(b"=\"");
            }
            escape_attr(uri, &mut self.out);
            self.out.push(b'"');
            rendered.insert(prefix.clone(), uri.clone());
        }

        for (qname, value) in self.attributes(el, apex) {
            self.out.push(b' ');
            self.out.extend_from_slice(qname.as_bytes());
            self.out.extend_from_slice(b"=\"");
            escape_attr(&value, &mut self.out);
            self.out.push(b'"');
        }
        self.out.push(b'>');

        for child in el.children() {
            self.write_node(child, &rendered, false);
        }

        self.out.extend_from_slice(b"</");
        self.out.extend_from_slice(name.as_bytes());
        self.out.push(b'>');
    }

    /// Attributes in canonical order: (namespace URI, local name).
    fn attributes(&self, el: Node<'_, '_>, apex: bool) -> Vec<(String, String)> {
        let mut attrs: Vec<(String, String, String, String)> = el
            .attributes()
            .map(|a| {
                let ns = a.namespace().unwrap_or("").to_string();
                let qname = match attribute_prefix(el, a.namespace()) {
                    Some(prefix) => format!("{}:{}", prefix, a.name()),
                    None => a.name().to_string(),
                };
                (ns, a.name().to_string(), qname, a.value().to_string())
            })
            .collect();

        // Document subsets under inclusive c14n inherit xml:* attributes.
        if apex && !self.method.is_exclusive() {
            let inheritable: &[&str] = match self.method {
                CanonicalizationMethod::Inclusive11 { .. } => &["lang", "space"],
                _ => &["lang", "space", "base"],
            };
            for ancestor in el.ancestors().skip(1).filter(|a| a.is_element()) {
                for a in ancestor.attributes() {
                    if a.namespace() != Some(NS_XML) || !inheritable.contains(&a.name()) {
                        continue;
                    }
                    let present = attrs
                        .iter()
                        .any(|(ns, local, _, _)| ns == NS_XML && local == a.name());
                    if !present {
                        attrs.push((
                            NS_XML.to_string(),
                            a.name().to_string(),
                            format!("xml:{}", a.name()),
                            a.value().to_string(),
                        ));
                    }
                }
            }
        }

        attrs.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        attrs.into_iter().map(|(_, _, q, v)| (q, v)).collect()
    }

    fn write_comment(&mut self, node: Node<'_, '_>) {
        self.out.extend_from_slice(b"<!--");
        if let Some(text) = node.text() {
            self.out.extend_from_slice(text.as_bytes());
        }
        self.out.extend_from_slice(b"-->");
    }

    fn write_pi(&mut self, node: Node<'_, '_>) {
        if let Some(pi) = node.pi() {
            self.out.extend_from_slice(b"<?");
            self.out.extend_from_slice(pi.target.as_bytes());
            if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
                self.out.push(b' ');
                self.out.extend_from_slice(value.as_bytes());
            }
            self.out.extend_from_slice(b"?>");
        }
    }
}

/// In-scope namespaces of `el`, keyed by prefix ("" for default).
fn in_scope(el: Node<'_, '_>) -> NsMap {
    el.namespaces()
        .filter(|ns| ns.name() != Some("xml"))
        .map(|ns| (ns.name().unwrap_or("").to_string(), ns.uri().to_string()))
        .collect()
}

fn inclusive_declarations(el: Node<'_, '_>, rendered: &NsMap) -> Vec<(String, String)> {
    let scope = in_scope(el);
    let mut decls: Vec<(String, String)> = scope
        .iter()
        .filter(|(prefix, uri)| {
            if prefix.is_empty() && uri.is_empty() {
                return false;
            }
            rendered.get(*prefix) != Some(*uri)
        })
        .map(|(p, u)| (p.clone(), u.clone()))
        .collect();

    // Undeclare a default namespace that an output ancestor rendered.
    if !scope.contains_key("") && rendered.get("").is_some_and(|u| !u.is_empty()) {
        decls.push((String::new(), String::new()));
    }
    decls.sort();
    decls
}

fn exclusive_declarations(
    el: Node<'_, '_>,
    rendered: &NsMap,
    method: &CanonicalizationMethod,
) -> Vec<(String, String)> {
    let scope = in_scope(el);
    let mut utilized: Vec<String> = vec![element_prefix(el).unwrap_or("").to_string()];
    for a in el.attributes() {
        if let Some(prefix) = attribute_prefix(el, a.namespace()) {
            if prefix != "xml" {
                utilized.push(prefix);
            }
        }
    }
    if let CanonicalizationMethod::Exclusive {
        inclusive_prefixes, ..
    } = method
    {
        utilized.extend(
            inclusive_prefixes
                .iter()
                .filter(|p| scope.contains_key(*p))
                .cloned(),
        );
    }
    utilized.sort();
    utilized.dedup();

    let mut decls = Vec::new();
    for prefix in utilized {
        let uri = scope.get(&prefix).cloned().unwrap_or_default();
        if prefix.is_empty() && uri.is_empty() {
            if rendered.get("").is_some_and(|u| !u.is_empty()) {
                decls.push((String::new(), String::new()));
            }
            continue;
        }
        if rendered.get(&prefix) != Some(&uri) {
            decls.push((prefix, uri));
        }
    }
    decls
}

/// Prefix as written in the source start tag.
fn element_prefix<'i>(el: Node<'_, 'i>) -> Option<&'i str> {
    let source: &'i str = el.document().input_text();
    let tag = source.get(el.range().start + 1..)?;
    let end = tag
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(tag.len());
    let name = &tag[..end];
    name.split_once(':').map(|(prefix, _)| prefix)
}

fn qualified_name(el: Node<'_, '_>) -> String {
    match element_prefix(el) {
        Some(prefix) => format!("{}:{}", prefix, el.tag_name().name()),
        None => el.tag_name().name().to_string(),
    }
}

fn attribute_prefix(el: Node<'_, '_>, ns: Option<&str>) -> Option<String> {
    let ns = ns?;
    if ns == NS_XML {
        return Some("xml".to_string());
    }
    el.namespaces()
        .find(|n| n.uri() == ns && n.name().is_some())
        .and_then(|n| n.name())
        .map(str::to_string)
}

fn escape_text(text: &str, out: &mut Vec<u8>) {
    for c in text.chars() {
        match c {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            '\r' => out.extend_from_slice(b"&#xD;"),
            _ => push_char(c, out),
        }
    }
}

fn escape_attr(value: &str, out: &mut Vec<u8>) {
    for c in value.chars() {
        match c {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '"' => out.extend_from_slice(b"&quot;"),
            '\t' => out.extend_from_slice(b"&#x9;"),
            '\n' => out.extend_from_slice(b"&#xA;"),
            '\r' => out.extend_from_slice(b"&#xD;"),
            _ => push_char(c, out),
        }
    }
}

fn push_char(c: char, out: &mut Vec<u8>) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}
