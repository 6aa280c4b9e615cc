//! Minimal XML helpers for the SUSHI XML/SOAP services.
//!
//! Report bodies are stored verbatim; the harvester only needs to spot error
//! elements, summarize them, and escape values it places into request
//! envelopes.

use crate::http::excerpt;

/// Child elements of a SUSHI `Exception` kept in failure reasons.
const EXCEPTION_FIELDS: &[&str] = &["Number", "Severity", "Message"];

/// Byte offset of the first opening tag with the given local name, with or
/// without a namespace prefix (`<Exception>`, `<s:Exception ...>`).
fn find_element(body: &str, local_name: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = body[offset..].find('<') {
        let start = offset + pos;
        let rest = &body[start + 1..];
        let tag_end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let tag = &rest[..tag_end];
        let local = tag.rsplit(':').next().unwrap_or(tag);
        if local == local_name {
            return Some(start);
        }
        offset = start + 1;
    }
    None
}

/// Returns true if `body` contains an element with the given local name.
pub(crate) fn has_element(body: &str, local_name: &str) -> bool {
    find_element(body, local_name).is_some()
}

/// Trimmed text content of the first element with the given local name.
fn element_text<'a>(body: &'a str, local_name: &str) -> Option<&'a str> {
    let start = find_element(body, local_name)?;
    let open_end = start + body[start..].find('>')?;
    if body[..open_end].ends_with('/') {
        return None;
    }
    let content = &body[open_end + 1..];
    let end = content.find("</").unwrap_or(content.len());
    Some(content[..end].trim()).filter(|text| !text.is_empty())
}

/// Builds a failure reason for a rejected XML body.
///
/// Locates the first of `elements` and renders its SUSHI fields as
/// `Number=3030, Severity=Error, Message=...`. Without a `Number` the reason
/// is an excerpt starting at the element, or at the body if none is found.
pub(crate) fn exception_reason(body: &str, elements: &[&str]) -> String {
    let Some(start) = elements.iter().filter_map(|name| find_element(body, name)).min() else {
        return excerpt(body);
    };
    let fragment = &body[start..];

    if element_text(fragment, "Number").is_none() {
        return excerpt(fragment);
    }
    let fields: Vec<String> = EXCEPTION_FIELDS
        .iter()
        .filter_map(|name| element_text(fragment, name).map(|text| format!("{}={}", name, text)))
        .collect();
    excerpt(&fields.join(", "))
}

/// Escapes text for use in element content or attribute values.
pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
