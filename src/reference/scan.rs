//! Lexical scanning of `@readable_id(.property)*` tokens.
//!
//! Edge extraction in the engine and highlighting in editor tooling both go
//! through [`scan`], so they can never disagree about what counts as a
//! reference.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

pub const MARKER: char = '@';

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@([A-Za-z0-9_]+)((?:\.[A-Za-z0-9_]+)*)").expect("reference pattern is valid")
});

/// A well-formed reference token. Offsets are byte offsets into the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceToken<'a> {
    pub start: usize,
    pub end: usize,
    pub ident: &'a str,
    pub properties: Vec<&'a str>,
}

/// Result of scanning a formula.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan<'a> {
    pub tokens: Vec<ReferenceToken<'a>>,
    /// Offset of the first marker not followed by a word character. Scanning
    /// stops there.
    pub malformed_at: Option<usize>,
}

/// Matches a reference token starting exactly at byte offset `start`.
pub fn token_at(text: &str, start: usize) -> Option<ReferenceToken<'_>> {
    let caps = REFERENCE.captures(text.get(start..)?)?;
    let whole = caps.get(0)?.end();
    let ident = caps.get(1)?.as_str();
    let properties = caps
        .get(2)
        .map(|m| m.as_str().split('.').filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    Some(ReferenceToken { start, end: start + whole, ident, properties })
}

/// True when a `.` at `end` starts an accessor with no name yet (`@rev.`).
pub fn dangling_accessor(text: &str, end: usize) -> bool {
    let rest = text.as_bytes().get(end..).unwrap_or_default();
    rest.first() == Some(&b'.') && !rest.get(1).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
}

pub fn scan(text: &str) -> Scan<'_> {
    let mut out = Scan::default();
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(MARKER) {
        let start = cursor + rel;
        match token_at(text, start) {
            Some(token) if dangling_accessor(text, token.end) => {
                out.malformed_at = Some(token.end);
                out.tokens.push(token);
                break;
            }
            Some(token) => {
                cursor = token.end;
                out.tokens.push(token);
            }
            None => {
                out.malformed_at = Some(start);
                break;
            }
        }
    }
    out
}

/// Every distinct readable identifier referenced by `text`, in order of first
/// appearance. References after a malformed token are not counted.
pub fn extract_references(text: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for token in scan(text).tokens {
        if !seen.iter().any(|s| s == token.ident) {
            seen.push(token.ident.to_string());
        }
    }
    seen
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Noun,
    Property,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReferenceSpan {
    pub start: usize,
    pub end: usize,
    pub kind: SpanKind,
}

/// Highlight spans: one noun span per `@ident` (marker included) and one span
/// per `.property` accessor.
pub fn reference_spans(text: &str) -> Vec<ReferenceSpan> {
    let mut spans = Vec::new();
    for token in scan(text).tokens {
        let noun_end = token.start + 1 + token.ident.len();
        spans.push(ReferenceSpan { start: token.start, end: noun_end, kind: SpanKind::Noun });
        let mut offset = noun_end;
        for prop in &token.properties {
            let end = offset + 1 + prop.len();
            spans.push(ReferenceSpan { start: offset, end, kind: SpanKind::Property });
            offset = end;
        }
    }
    spans
}
