//! Value normalization.
//!
//! Extracted payload values arrive as JSON scalars or raw text and have to
//! be coerced into the domain the target channel expects: numeric for
//! sensor/level, boolean-like for pump, and the fixed auto/manual set for
//! mode. A failed coercion is reported as `None`; the caller logs and drops
//! the message.

use serde_json::Value;

/// Coerce a value to a float.
///
/// Numbers pass through; strings get a trimmed parse attempt. Booleans,
/// arrays and objects are not numeric.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerce a value to a switch state.
///
/// Accepts JSON booleans, the numbers 1/0 and the strings
/// "1"/"0"/"true"/"false" (case-insensitive).
pub fn as_switch(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(true),
            Some(f) if f == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Interpret a value as an operating mode.
///
/// Only "auto" and "automatic" (case-insensitive) select automatic mode;
/// any other value, including non-strings, means manual. Unrecognized mode
/// strings are intentionally not rejected.
pub fn as_mode(value: &Value) -> bool {
    match value {
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "auto" | "automatic"
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&json!(3.85)), Some(3.85));
        assert_eq!(as_number(&json!(-7)), Some(-7.0));
        assert_eq!(as_number(&json!("21.5")), Some(21.5));
        assert_eq!(as_number(&json!(" 12 ")), Some(12.0));
        assert_eq!(as_number(&json!("n/a")), None);
        assert_eq!(as_number(&json!(true)), None);
        assert_eq!(as_number(&json!({"v": 1})), None);
        assert_eq!(as_number(&Value::Null), None);
    }

    #[test]
    fn test_as_switch() {
        assert_eq!(as_switch(&json!(true)), Some(true));
        assert_eq!(as_switch(&json!(false)), Some(false));
        assert_eq!(as_switch(&json!(1)), Some(true));
        assert_eq!(as_switch(&json!(0)), Some(false));
        assert_eq!(as_switch(&json!("1")), Some(true));
        assert_eq!(as_switch(&json!("TRUE")), Some(true));
        assert_eq!(as_switch(&json!("false")), Some(false));
        assert_eq!(as_switch(&json!("on")), None);
        assert_eq!(as_switch(&json!(2)), None);
        assert_eq!(as_switch(&json!([1])), None);
    }

    #[test]
    fn test_as_mode_is_lenient() {
        assert!(as_mode(&json!("auto")));
        assert!(as_mode(&json!("Automatic")));
        assert!(as_mode(&json!(" AUTO ")));
        // Everything else is manual, never an error.
        assert!(!as_mode(&json!("manual")));
        assert!(!as_mode(&json!("eco")));
        assert!(!as_mode(&json!(true)));
        assert!(!as_mode(&json!(1)));
    }

}
