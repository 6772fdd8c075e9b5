//! Path pattern tokenization and scoring.
//!
//! # Responsibilities
//! - Split patterns and request paths into lower-cased segments
//! - Classify segments as literal or fuzzy (`<name>` / `[name]`)
//! - Decide template equivalence (duplicate detection)
//! - Score a template against a concrete path
//!
//! # Design Decisions
//! - Pure functions over token slices, independent of registry storage
//! - Literal agreement weighs 100, a fuzzy capture 10, a catch-all template 1
//! - A literal mismatch stops the walk but keeps the weight accumulated so far

use std::collections::HashMap;

/// Weight of a segment that matches a literal token exactly.
pub const LITERAL_WEIGHT: u32 = 100;
/// Weight of a segment captured by a fuzzy token.
pub const FUZZY_WEIGHT: u32 = 10;
/// Weight of a zero-token template, which matches any path of its verb.
pub const CATCH_ALL_WEIGHT: u32 = 1;

const FUZZY_MARKERS: [char; 4] = ['<', '>', '[', ']'];

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Matched case-insensitively against the same path segment.
    Literal(String),
    /// Captures any single segment under the given variable name.
    Fuzzy(String),
}

impl Token {
    /// Classify a single lower-cased segment.
    pub fn parse(segment: &str) -> Self {
        match fuzzy_name(segment) {
            Some(name) => Token::Fuzzy(name.to_string()),
            None => Token::Literal(segment.to_string()),
        }
    }

    pub fn is_fuzzy(&self) -> bool {
        matches!(self, Token::Fuzzy(_))
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Literal(s) => f.write_str(s),
            Token::Fuzzy(name) => write!(f, "<{}>", name),
        }
    }
}

/// Returns the variable name when `segment` is wrapped in `<...>` or `[...]`.
fn fuzzy_name(segment: &str) -> Option<&str> {
    let wrapped = (segment.starts_with('<') && segment.ends_with('>'))
        || (segment.starts_with('[') && segment.ends_with(']'));
    if wrapped && segment.len() >= 2 {
        Some(&segment[1..segment.len() - 1])
    } else {
        None
    }
}

/// True if the raw text contains any of the fuzzy marker characters.
pub fn contains_fuzzy_markers(text: &str) -> bool {
    text.contains(FUZZY_MARKERS)
}

/// Lower-case and split a path on `/`, dropping any query suffix and empty segments.
pub fn split_path(path: &str) -> Vec<String> {
    let schema = path.split('?').next().unwrap_or_default();
    schema
        .to_lowercase()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokenize a route pattern.
pub fn tokenize(pattern: &str) -> Vec<Token> {
    split_path(pattern).iter().map(|s| Token::parse(s)).collect()
}

/// Two templates are equivalent when they have the same length and each position holds
/// either the same literal or two fuzzy tokens (names ignored).
pub fn equivalent(a: &[Token], b: &[Token]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|pair| match pair {
            (Token::Literal(l), Token::Literal(r)) => l == r,
            (Token::Fuzzy(_), Token::Fuzzy(_)) => true,
            _ => false,
        })
}

/// Result of scoring one template against a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Score {
    pub weight: u32,
    pub args: HashMap<String, String>,
}

/// Score `template` against the already split `segments` of a request path.
///
/// Returns `None` when the template is longer than the path and cannot apply.
pub fn score(template: &[Token], segments: &[String]) -> Option<Score> {
    if template.len() > segments.len() {
        return None;
    }
    if template.is_empty() {
        return Some(Score {
            weight: CATCH_ALL_WEIGHT,
            args: HashMap::new(),
        });
    }

    let mut result = Score::default();
    for (token, segment) in template.iter().zip(segments) {
        match token {
            Token::Literal(lit) if lit == segment => result.weight += LITERAL_WEIGHT,
            Token::Fuzzy(name) => {
                result.args.insert(name.clone(), segment.clone());
                result.weight += FUZZY_WEIGHT;
            }
            Token::Literal(_) => break,
        }
    }
    Some(result)
}
