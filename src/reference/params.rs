//! Partial-token analysis for incremental editing.

use super::scan::MARKER;
use serde::Serialize;

/// Property accessors understood by the evaluator, sorted.
pub const PROPERTY_NAMES: &[&str] = &["max", "mean", "median", "min", "p5", "p95", "stdev"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceParams {
    /// Identifier typed so far, without the marker.
    pub partial_noun: String,
    /// Accessor typed so far, when the token contains a `.`.
    pub partial_property: Option<String>,
    /// Zero-based position of the accessor being typed.
    pub property_index: Option<usize>,
    /// Text that would complete the token. Empty when nothing matches.
    pub suggestion: String,
}

/// Splits a partial `@noun.prop` token and proposes a completion. Candidates
/// are the readable ids known to the caller.
pub fn resolve_params(partial: &str, candidates: &[&str]) -> ReferenceParams {
    let body = partial.strip_prefix(MARKER).unwrap_or(partial);
    let mut parts = body.split('.');
    let noun = parts.next().unwrap_or_default().to_string();
    let accessors: Vec<&str> = parts.collect();

    match accessors.last() {
        Some(prop) => ReferenceParams {
            suggestion: complete(prop, PROPERTY_NAMES),
            partial_noun: noun,
            partial_property: Some(prop.to_string()),
            property_index: Some(accessors.len() - 1),
        },
        None => {
            let mut sorted = candidates.to_vec();
            sorted.sort_unstable();
            ReferenceParams {
                suggestion: if noun.is_empty() { String::new() } else { complete(&noun, &sorted) },
                partial_noun: noun,
                ..Default::default()
            }
        }
    }
}

fn complete(prefix: &str, options: &[&str]) -> String {
    options
        .iter()
        .find(|o| o.len() > prefix.len() && o.starts_with(prefix))
        .map(|o| o[prefix.len()..].to_string())
        .unwrap_or_default()
}

/// The word immediately before `cursor` if it is a reference being typed.
/// Words are split on anything other than word characters, the marker and `.`.
pub fn partial_token_at(text: &str, cursor: usize) -> Option<&str> {
    let mut end = cursor.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let word = text[..end]
        .rsplit(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == MARKER || c == '.'))
        .next()?;
    word.starts_with(MARKER).then_some(word)
}
