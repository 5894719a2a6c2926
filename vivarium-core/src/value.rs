//! The two surface kinds of the scripting language: numbers and strings.

use serde::{Deserialize, Serialize};

/// A script value. Numbers share one floating representation; booleans are
/// numeric 0/1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Num(f64),
    Str(String),
}

impl Value {
    /// Build the numeric form of a boolean.
    pub fn from_bool(b: bool) -> Self {
        Value::Num(if b { 1.0 } else { 0.0 })
    }

    pub fn is_num(&self) -> bool {
        matches!(self, Value::Num(_))
    }

    pub fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    /// Numeric view: strings parse as decimal and yield 0 on failure.
    pub fn as_num(&self) -> f64 {
        match self {
            Value::Num(v) => *v,
            Value::Str(s) => parse_num(s),
        }
    }

    /// String view: numbers print in canonical decimal form.
    pub fn as_str(&self) -> String {
        match self {
            Value::Num(v) => format_num(*v),
            Value::Str(s) => s.clone(),
        }
    }

    /// Truth: any value comparing unequal to numeric zero.
    pub fn is_truthy(&self) -> bool {
        self.as_num() != 0.0
    }
}

/// Canonical decimal printing: shortest form that round-trips, no trailing
/// zeros (`7.0` prints as `7`, `1.7` as `1.7`).
pub fn format_num(v: f64) -> String {
    v.to_string()
}

/// Decimal parsing with the scripting language's conversion contract:
/// unparseable input yields 0.
pub fn parse_num(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_without_trailing_zeros() {
        assert_eq!(format_num(7.0), "7");
        assert_eq!(format_num(1.7), "1.7");
        assert_eq!(format_num(-0.5), "-0.5");
    }

    #[test]
    fn string_to_number_is_zero_on_failure() {
        assert_eq!(parse_num("3.25"), 3.25);
        assert_eq!(parse_num("  12 "), 12.0);
        assert_eq!(parse_num("balloons"), 0.0);
        assert_eq!(parse_num(""), 0.0);
    }

    #[test]
    fn truthiness_follows_numeric_view() {
        assert!(Value::Num(2.0).is_truthy());
        assert!(!Value::Num(0.0).is_truthy());
        assert!(Value::Str("1".into()).is_truthy());
        assert!(!Value::Str("zero".into()).is_truthy());
    }

    proptest::proptest! {
        /// Canonical printing round-trips exactly through parsing.
        #[test]
        fn print_then_parse_is_identity(v in -1.0e12..1.0e12_f64) {
            proptest::prop_assert_eq!(parse_num(&format_num(v)), v);
        }
    }
}
