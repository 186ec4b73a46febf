// Extractors - source discovery in page markup and failure diagnosis
//
// - patterns: ordered regex patterns that turn raw markup into source candidates
// - diagnostics: classifies failures into likely blocking reasons

mod diagnostics;
mod patterns;

pub use diagnostics::{diagnose_error, diagnose_failure, BlockingReason, Diagnosis};
pub use patterns::{extract_candidates, normalize, ExtractOrder, PatternExtractor};
