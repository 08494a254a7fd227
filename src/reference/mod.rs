//! Reference parsing: finds `@readable_id` tokens in formula text.
pub mod params;
pub mod scan;

pub use params::{partial_token_at, resolve_params, ReferenceParams, PROPERTY_NAMES};
pub use scan::{extract_references, reference_spans, scan, token_at, ReferenceSpan, ReferenceToken, Scan, SpanKind};
