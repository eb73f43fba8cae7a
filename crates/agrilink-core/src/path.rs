//! Restricted payload path expressions.
//!
//! Gateway payloads address nested values with dotted fields and
//! single-level numeric indices, e.g. `object.soil[0].moisture`. This is
//! deliberately not a JSONPath engine; the grammar below covers everything
//! the dashboard configures.
//!
//! Expressions are validated once, when an entity is registered. Extraction
//! at message time can only ever report "absent", never an error.
//!
//! Parsing is hand-written over the input bytes to keep the core crate free
//! of regex dependencies.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::str::FromStr;

/// One step of a parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Dotted field access into a JSON object.
    Key(String),
    /// Numeric index into a JSON array.
    Index(usize),
}

/// Errors raised when a path expression does not match the grammar.
///
/// These surface synchronously to the registering caller; they are never
/// produced at message time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathSyntaxError {
    #[error("empty path expression")]
    Empty,
    #[error("invalid segment at byte {0}: segments match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidSegment(usize),
    #[error("invalid index at byte {0}: expected '[' digits ']'")]
    InvalidIndex(usize),
    #[error("unexpected character '{0}' at byte {1}")]
    UnexpectedChar(char, usize),
}

/// A validated path expression.
///
/// Grammar: `segment ('.' segment | '[' digits ']')*` with
/// segment = `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    raw: String,
    steps: Vec<Step>,
}

impl PathExpr {
    /// Parse and validate an expression against the grammar.
    pub fn parse(input: &str) -> Result<Self, PathSyntaxError> {
        if input.is_empty() {
            return Err(PathSyntaxError::Empty);
        }

        let bytes = input.as_bytes();
        let mut steps = Vec::new();
        let mut i = parse_segment(bytes, 0, &mut steps)?;

        while i < bytes.len() {
            match bytes[i] {
                b'.' => {
                    i = parse_segment(bytes, i + 1, &mut steps)?;
                }
                b'[' => {
                    let start = i + 1;
                    let mut j = start;
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                    if j == start || j >= bytes.len() || bytes[j] != b']' {
                        return Err(PathSyntaxError::InvalidIndex(i));
                    }
                    let index = input[start..j]
                        .parse::<usize>()
                        .map_err(|_| PathSyntaxError::InvalidIndex(i))?;
                    steps.push(Step::Index(index));
                    i = j + 1;
                }
                _ => {
                    let ch = input[i..].chars().next().unwrap_or('?');
                    return Err(PathSyntaxError::UnexpectedChar(ch, i));
                }
            }
        }

        Ok(Self {
            raw: input.to_string(),
            steps,
        })
    }

    /// Resolve this expression against a decoded JSON document.
    ///
    /// A dotted step requires the current value to be an object containing
    /// the key; an index step requires an array with the index in bounds.
    /// Any mismatch yields `None`.
    pub fn extract<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut current = doc;
        for step in &self.steps {
            current = match step {
                Step::Key(key) => current.as_object()?.get(key)?,
                Step::Index(index) => current.as_array()?.get(*index)?,
            };
        }
        Some(current)
    }

    /// The original expression text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed steps.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Whether any step is an array index.
    ///
    /// Command topics reject indexed paths at registration because the
    /// command encoder can only rebuild keyed nesting.
    pub fn has_index(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, Step::Index(_)))
    }
}

fn parse_segment(
    bytes: &[u8],
    start: usize,
    steps: &mut Vec<Step>,
) -> Result<usize, PathSyntaxError> {
    if start >= bytes.len() || !(bytes[start].is_ascii_alphabetic() || bytes[start] == b'_') {
        return Err(PathSyntaxError::InvalidSegment(start));
    }
    let mut i = start + 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    // Segments are ASCII by construction, so the slice is valid UTF-8.
    let segment = std::str::from_utf8(&bytes[start..i])
        .map_err(|_| PathSyntaxError::InvalidSegment(start))?;
    steps.push(Step::Key(segment.to_string()));
    Ok(i)
}

impl std::fmt::Display for PathExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for PathExpr {
    type Err = PathSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathExpr::parse(s)
    }
}

impl Serialize for PathExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PathExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PathExpr::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_dotted() {
        let expr = PathExpr::parse("object.temperature").unwrap();
        assert_eq!(
            expr.steps(),
            &[
                Step::Key("object".to_string()),
                Step::Key("temperature".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_indexed() {
        let expr = PathExpr::parse("readings[2].value").unwrap();
        assert_eq!(
            expr.steps(),
            &[
                Step::Key("readings".to_string()),
                Step::Index(2),
                Step::Key("value".to_string())
            ]
        );
        assert!(expr.has_index());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(PathExpr::parse(""), Err(PathSyntaxError::Empty));
        assert!(PathExpr::parse("1abc").is_err());
        assert!(PathExpr::parse("a..b").is_err());
        assert!(PathExpr::parse("a.").is_err());
        assert!(PathExpr::parse("a[").is_err());
        assert!(PathExpr::parse("a[]").is_err());
        assert!(PathExpr::parse("a[1").is_err());
        assert!(PathExpr::parse("a[x]").is_err());
        assert!(PathExpr::parse("a b").is_err());
        assert!(PathExpr::parse("[0]").is_err());
    }

    #[test]
    fn test_extract_nested() {
        let doc = json!({
            "object": {
                "soil": [
                    {"moisture": 41.5},
                    {"moisture": 38.2}
                ]
            }
        });

        let expr = PathExpr::parse("object.soil[1].moisture").unwrap();
        assert_eq!(expr.extract(&doc), Some(&json!(38.2)));
    }

    #[test]
    fn test_extract_absent_never_errors() {
        let doc = json!({"object": {"temperature": 21.0}});

        // Missing key
        let expr = PathExpr::parse("object.humidity").unwrap();
        assert_eq!(expr.extract(&doc), None);

        // Index into a non-array
        let expr = PathExpr::parse("object[0]").unwrap();
        assert_eq!(expr.extract(&doc), None);

        // Key into a scalar
        let expr = PathExpr::parse("object.temperature.raw").unwrap();
        assert_eq!(expr.extract(&doc), None);

        // Index out of bounds
        let doc = json!({"a": [1, 2]});
        let expr = PathExpr::parse("a[5]").unwrap();
        assert_eq!(expr.extract(&doc), None);
    }

    #[test]
    fn test_display_round_trips() {
        let raw = "object.soil[0].moisture";
        let expr = PathExpr::parse(raw).unwrap();
        assert_eq!(expr.to_string(), raw);
    }

    #[test]
    fn test_serde_round_trip() {
        let expr = PathExpr::parse("object.level").unwrap();
        let json = serde_json::to_string(&expr).unwrap();
        assert_eq!(json, "\"object.level\"");

        let back: PathExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expr);

        let bad: Result<PathExpr, _> = serde_json::from_str("\"a..b\"");
        assert!(bad.is_err());
    }
}
