use serde_json::Value;

/// Fallback used on the description-generation path.
pub const CREATIVE_DEFAULT_CONFIDENCE: f64 = 0.7;

/// Normalize a confidence reported as a fraction, a percentage number,
/// or a percentage string into [0, 1].
///
/// Values above 1 are read as percentages. Anything unparseable yields
/// `default`. The result is always clamped.
pub fn parse_confidence(raw: &Value, default: f64) -> f64 {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_text(s),
        _ => None,
    };

    let value = match parsed {
        Some(v) if v.is_finite() => {
            if v > 1.0 {
                v / 100.0
            } else {
                v
            }
        }
        _ => default,
    };

    clamp_unit(value)
}

fn parse_text(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    number.parse::<f64>().ok()
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn percentage_string() {
        assert_eq!(parse_confidence(&json!("85%"), 0.7), 0.85);
        assert_eq!(parse_confidence(&json!(" 42 % "), 0.7), 0.42);
    }

    #[test]
    fn percentage_number() {
        assert_eq!(parse_confidence(&json!(85), 0.7), 0.85);
    }

    #[test]
    fn fraction_passes_through() {
        assert_eq!(parse_confidence(&json!(0.42), 0.7), 0.42);
        assert_eq!(parse_confidence(&json!("0.5"), 0.7), 0.5);
        assert_eq!(parse_confidence(&json!(1), 0.7), 1.0);
    }

    #[test]
    fn unparseable_uses_context_default() {
        assert_eq!(parse_confidence(&json!("very sure"), CREATIVE_DEFAULT_CONFIDENCE), 0.7);
        assert_eq!(parse_confidence(&json!(null), 0.0), 0.0);
        assert_eq!(parse_confidence(&json!([0.9]), 0.0), 0.0);
        assert_eq!(parse_confidence(&json!(true), 0.7), 0.7);
    }

    #[test]
    fn always_clamped() {
        assert_eq!(parse_confidence(&json!(250), 0.7), 1.0);
        assert_eq!(parse_confidence(&json!(-3), 0.7), 0.0);
        assert_eq!(parse_confidence(&json!("-12%"), 0.7), 0.0);
        assert_eq!(parse_confidence(&json!("NaN"), 0.7), 0.7);
        assert_eq!(parse_confidence(&json!("x"), 4.0), 1.0);
    }
}
