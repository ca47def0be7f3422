//! Small DOM helpers over roxmltree.
//!
//! JMA telegrams mix namespaces (`jmx_eb:` on measurement elements); all
//! lookups here match on local names only.

use chrono::DateTime;
use roxmltree::Node;

use crate::errors::DecodeError;

/// First child element with the given local name.
pub fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// All child elements with the given local name.
pub fn children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// Trimmed text of the first child element with the given local name.
pub fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Like [`child`], but a schema error when absent.
pub fn require<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
) -> Result<Node<'a, 'input>, DecodeError> {
    child(node, name)
        .ok_or_else(|| DecodeError::Schema(format!("missing element <{name}>")))
}

/// Like [`child_text`], but a schema error when absent.
pub fn require_text<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, DecodeError> {
    child_text(node, name)
        .ok_or_else(|| DecodeError::Schema(format!("missing text in <{name}>")))
}

/// JMA timestamps are RFC 3339 with the +09:00 offset. Returns epoch
/// seconds plus the formatted string the read API serves.
pub fn parse_jma_time(raw: &str) -> Result<(i64, String), DecodeError> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| DecodeError::Schema(format!("bad datetime '{raw}': {e}")))?;
    Ok((
        parsed.timestamp(),
        parsed.format("%Y/%m/%d %H:%M:%S").to_string(),
    ))
}

/// Short `%m-%d %H:%M` form used for tsunami rows.
pub fn parse_jma_time_short(raw: &str) -> Result<(i64, String), DecodeError> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| DecodeError::Schema(format!("bad datetime '{raw}': {e}")))?;
    Ok((parsed.timestamp(), parsed.format("%m-%d %H:%M").to_string()))
}
