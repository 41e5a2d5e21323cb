//! Text cell -> number coercion.
//!
//! Portal tables render everything as text. Cells that parse as integers or
//! decimals become JSON numbers; everything else stays a string.

use serde_json::{Map, Number, Value};

/// Coerce one text value: integer, else finite decimal, else the input unchanged.
/// Empty or whitespace-only text is returned untouched.
pub fn coerce_text(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::String(raw.to_string());
    }
    parse_number(trimmed).unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Coerce every string leaf of a nested mapping in place.
/// Numbers, booleans, arrays and nulls are left as they are.
pub fn coerce_map(map: &mut Map<String, Value>) {
    for value in map.values_mut() {
        match value {
            Value::Object(inner) => coerce_map(inner),
            Value::String(text) => {
                let coerced = coerce_text(text);
                *value = coerced;
            }
            _ => {}
        }
    }
}

/// Marks-table flavour: a dash stays a dash, an empty cell counts as `0`,
/// and only text containing a `.` is tried as a decimal.
pub fn coerce_mark_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed {
        "-" => Value::String("-".to_string()),
        "" => Value::from(0),
        _ if trimmed.contains('.') => parse_float(trimmed),
        _ => trimmed
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(trimmed.to_string())),
    }
}

/// True for values the portal uses to mean "nothing recorded": `-`, empty, or zero.
pub fn is_blank_or_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s == "-"
        }
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn parse_float(text: &str) -> Value {
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_text_integers_and_decimals() {
        assert_eq!(coerce_text("42"), json!(42));
        assert_eq!(coerce_text(" 7 "), json!(7));
        assert_eq!(coerce_text("-3"), json!(-3));
        assert_eq!(coerce_text("8.25"), json!(8.25));
    }

    #[test]
    fn test_coerce_text_keeps_strings() {
        assert_eq!(coerce_text("M.Harshith"), json!("M.Harshith"));
        assert_eq!(coerce_text("-"), json!("-"));
        assert_eq!(coerce_text("2024-25"), json!("2024-25"));
        assert_eq!(coerce_text("NaN"), json!("NaN"));
        assert_eq!(coerce_text("inf"), json!("inf"));
    }

    #[test]
    fn test_coerce_text_leaves_empty_untouched() {
        assert_eq!(coerce_text(""), json!(""));
        assert_eq!(coerce_text("   "), json!("   "));
    }

    #[test]
    fn test_coerce_map_recurses() {
        let mut value = json!({
            "Name": "A. Student",
            "Roll No": "1602231234",
            "Held Classes": { "DS": "40", "DBMS(OE)-OE": "-", "CGPA": "8.1" },
            "flag": true,
            "count": 3
        });
        coerce_map(value.as_object_mut().unwrap());

        assert_eq!(
            value,
            json!({
                "Name": "A. Student",
                "Roll No": 1602231234,
                "Held Classes": { "DS": 40, "DBMS(OE)-OE": "-", "CGPA": 8.1 },
                "flag": true,
                "count": 3
            })
        );
    }

    #[test]
    fn test_coerce_map_is_idempotent() {
        let mut once = json!({
            "a": "1", "b": "2.50", "c": "x", "d": "", "e": { "f": "  9 ", "g": { "h": "-" } }
        });
        coerce_map(once.as_object_mut().unwrap());
        let mut twice = once.clone();
        coerce_map(twice.as_object_mut().unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_coerce_mark_cell() {
        assert_eq!(coerce_mark_cell("-"), json!("-"));
        assert_eq!(coerce_mark_cell(""), json!(0));
        assert_eq!(coerce_mark_cell("18"), json!(18));
        assert_eq!(coerce_mark_cell("92.5"), json!(92.5));
        assert_eq!(coerce_mark_cell("A+"), json!("A+"));
        assert_eq!(coerce_mark_cell("1e3"), json!("1e3"));
    }

    #[test]
    fn test_is_blank_or_zero() {
        assert!(is_blank_or_zero(&json!(0)));
        assert!(is_blank_or_zero(&json!(0.0)));
        assert!(is_blank_or_zero(&json!("-")));
        assert!(is_blank_or_zero(&json!("")));
        assert!(!is_blank_or_zero(&json!(20)));
        assert!(!is_blank_or_zero(&json!("AB")));
    }
}
