//! Conversion Engine
//!
//! Pure, side-effect-free translation of a raw sensor reading into a
//! physical value according to a conversion profile's kind and payload.
//! No I/O of any kind happens in this module; it is exercised directly
//! by the backfill worker and the ingest service alike.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three conversion profile kinds a sensor can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Linear,
    Polynomial,
    LookupTable,
}

impl ProfileKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Polynomial => "polynomial",
            Self::LookupTable => "lookup_table",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "linear" => Some(Self::Linear),
            "polynomial" => Some(Self::Polynomial),
            "lookup_table" => Some(Self::LookupTable),
            _ => None,
        }
    }
}

/// A lookup table point, pre-sorted by `raw` ascending.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LookupPoint {
    raw: f64,
    physical: f64,
}

/// Apply a conversion profile to a single raw value.
///
/// `kind` is the raw string stored alongside the profile (callers may also
/// pass [`ProfileKind::as_str`]); unknown kinds and malformed payloads both
/// yield `None`, which the caller must record as `conversion_status =
/// conversion_failed`.
#[must_use]
pub fn apply_conversion(kind: &str, payload: &Value, raw_value: f64) -> Option<f64> {
    match ProfileKind::parse(kind)? {
        ProfileKind::Linear => apply_linear(payload, raw_value),
        ProfileKind::Polynomial => apply_polynomial(payload, raw_value),
        ProfileKind::LookupTable => apply_lookup_table(payload, raw_value),
    }
}

fn apply_linear(payload: &Value, raw_value: f64) -> Option<f64> {
    let a = payload.get("a")?.as_f64()?;
    let b = payload.get("b")?.as_f64()?;
    Some(a * raw_value + b)
}

fn apply_polynomial(payload: &Value, raw_value: f64) -> Option<f64> {
    let coefficients = payload.get("coefficients")?.as_array()?;
    if coefficients.is_empty() {
        return None;
    }
    let mut result = 0.0_f64;
    let mut power = 1.0_f64;
    for coefficient in coefficients {
        let c = coefficient.as_f64()?;
        result += c * power;
        power *= raw_value;
    }
    Some(result)
}

fn apply_lookup_table(payload: &Value, raw_value: f64) -> Option<f64> {
    let points_value = payload.get("points")?.as_array()?;
    if points_value.len() < 2 {
        return None;
    }
    let mut points = Vec::with_capacity(points_value.len());
    for point in points_value {
        let raw = point.get("raw")?.as_f64()?;
        let physical = point.get("physical")?.as_f64()?;
        points.push(LookupPoint { raw, physical });
    }
    points.sort_by(|a, b| a.raw.partial_cmp(&b.raw).unwrap_or(std::cmp::Ordering::Equal));

    let first = points.first()?;
    let last = points.last()?;
    if raw_value <= first.raw {
        return Some(first.physical);
    }
    if raw_value >= last.raw {
        return Some(last.physical);
    }
    for window in points.windows(2) {
        let (lo, hi) = (window[0], window[1]);
        if raw_value >= lo.raw && raw_value <= hi.raw {
            let span = hi.raw - lo.raw;
            if span == 0.0 {
                return Some(lo.physical);
            }
            let t = (raw_value - lo.raw) / span;
            return Some(lo.physical + t * (hi.physical - lo.physical));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn linear_applies_affine_formula() {
        let payload = json!({"a": 2.0, "b": 1.0});
        assert_eq!(apply_conversion("linear", &payload, 3.0), Some(7.0));
    }

    #[test]
    fn linear_missing_field_fails() {
        let payload = json!({"a": 2.0});
        assert_eq!(apply_conversion("linear", &payload, 3.0), None);
    }

    #[test]
    fn polynomial_sums_powers_from_zero() {
        // c0 + c1*x + c2*x^2
        let payload = json!({"coefficients": [1.0, 2.0, 3.0]});
        assert_eq!(apply_conversion("polynomial", &payload, 2.0), Some(1.0 + 2.0 * 2.0 + 3.0 * 4.0));
    }

    #[test]
    fn polynomial_empty_coefficients_fails() {
        let payload = json!({"coefficients": []});
        assert_eq!(apply_conversion("polynomial", &payload, 2.0), None);
    }

    #[test]
    fn polynomial_non_numeric_entry_fails() {
        let payload = json!({"coefficients": [1.0, "oops"]});
        assert_eq!(apply_conversion("polynomial", &payload, 2.0), None);
    }

    #[test]
    fn lookup_table_clamps_below_and_above() {
        let payload = json!({"points": [
            {"raw": 0.0, "physical": 0.0},
            {"raw": 10.0, "physical": 100.0},
            {"raw": 20.0, "physical": 200.0},
        ]});
        assert_eq!(apply_conversion("lookup_table", &payload, -5.0), Some(0.0));
        assert_eq!(apply_conversion("lookup_table", &payload, 30.0), Some(200.0));
    }

    #[test]
    fn lookup_table_interpolates_inside_segment() {
        let payload = json!({"points": [
            {"raw": 0.0, "physical": 0.0},
            {"raw": 10.0, "physical": 100.0},
            {"raw": 20.0, "physical": 200.0},
        ]});
        assert_eq!(apply_conversion("lookup_table", &payload, 5.0), Some(50.0));
    }

    #[test]
    fn lookup_table_sorts_unordered_points() {
        let payload = json!({"points": [
            {"raw": 20.0, "physical": 200.0},
            {"raw": 0.0, "physical": 0.0},
            {"raw": 10.0, "physical": 100.0},
        ]});
        assert_eq!(apply_conversion("lookup_table", &payload, 15.0), Some(150.0));
    }

    #[test]
    fn lookup_table_zero_width_segment_uses_lower_point() {
        let payload = json!({"points": [
            {"raw": 5.0, "physical": 1.0},
            {"raw": 5.0, "physical": 9.0},
        ]});
        assert_eq!(apply_conversion("lookup_table", &payload, 5.0), Some(1.0));
    }

    #[test]
    fn lookup_table_single_point_fails() {
        let payload = json!({"points": [{"raw": 0.0, "physical": 0.0}]});
        assert_eq!(apply_conversion("lookup_table", &payload, 0.0), None);
    }

    #[test]
    fn unknown_kind_fails() {
        let payload = json!({});
        assert_eq!(apply_conversion("quadratic_spline", &payload, 1.0), None);
    }
}
