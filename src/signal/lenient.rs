//! Loose coercion of JSON values coming from the meter side.
//!
//! Upstream payloads are produced by foreign tooling and may carry numbers as
//! strings, `null`s, or be missing whole branches. None of these helpers ever
//! fail: anything unusable collapses to a neutral default.

use serde_json::Value;

/// Looks up a nested field by key path, returning `None` on any miss.
pub fn field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(key))
}

/// Coerces a value to a finite number.
///
/// Numbers pass through, numeric strings are parsed, booleans map to 0/1.
/// Everything else (and any non-finite result) yields `None`.
pub fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().ok()?
            }
        }
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Like [`number`], defaulting to `0.0`.
pub fn number_or_zero(value: Option<&Value>) -> f64 {
    number(value).unwrap_or(0.0)
}

/// JavaScript-style truthiness.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// Renders a truthy value as text; falsy values become `None`.
pub fn text(value: Option<&Value>) -> Option<String> {
    if !truthy(value) {
        return None;
    }
    match value? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Returns the value only when it is a JSON boolean.
pub fn strict_bool(value: Option<&Value>) -> Option<bool> {
    value.and_then(Value::as_bool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_accept_numeric_strings() {
        assert_eq!(number(Some(&json!("1500"))), Some(1500.0));
        assert_eq!(number(Some(&json!(" 2.5 "))), Some(2.5));
        assert_eq!(number(Some(&json!("abc"))), None);
        assert_eq!(number(Some(&json!(null))), None);
        assert_eq!(number(None), None);
    }

    #[test]
    fn nested_lookup_tolerates_wrong_shapes() {
        let v = json!({ "power": 12 });
        assert!(field(&v, &["power", "importW"]).is_none());
        let v = json!({ "power": { "importW": 800 } });
        assert_eq!(number_or_zero(field(&v, &["power", "importW"])), 800.0);
    }

    #[test]
    fn truthiness_matches_loose_semantics() {
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(""))));
        assert!(truthy(Some(&json!("x"))));
        assert!(truthy(Some(&json!({}))));
        assert_eq!(text(Some(&json!(""))), None);
        assert_eq!(text(Some(&json!(42))).as_deref(), Some("42"));
    }

    #[test]
    fn strict_bool_rejects_truthy_non_booleans() {
        assert_eq!(strict_bool(Some(&json!(true))), Some(true));
        assert_eq!(strict_bool(Some(&json!(1))), None);
        assert_eq!(strict_bool(Some(&json!("true"))), None);
    }
}
