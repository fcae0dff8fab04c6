use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Row key of every table in the crate.
pub type Timestamp = NaiveDateTime;

/// Name of the index column in tables written to or read from disk.
pub const DATETIME_COLUMN: &str = "DateTime";

/// Format used when writing the `DateTime` index column. Fractional seconds
/// are only printed when present.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const DATETIME_PARSE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
];

/// Parse a timestamp as written in a `DateTime` index column.
pub fn parse_timestamp(s: &str) -> Option<Timestamp> {
    let s = s.trim();
    DATETIME_PARSE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

// ---------------------------------------------------------------------------
// ConfigValue – a single instrument configuration entry
// ---------------------------------------------------------------------------

/// A dynamically-typed configuration value.
///
/// `Unset` behaves like a floating point NaN: it never compares equal to
/// anything, itself included.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    #[default]
    Unset,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        use ConfigValue::*;
        match (self, other) {
            (Unset, _) | (_, Unset) => false,
            (Text(a), Text(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Text(_), _) | (_, Text(_)) => false,
            // mixed numeric: compare by value, 10 == 10.0
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Unset => write!(f, "<unset>"),
            ConfigValue::Integer(i) => write!(f, "{i}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
            ConfigValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl ConfigValue {
    pub fn is_unset(&self) -> bool {
        matches!(self, ConfigValue::Unset)
    }

    /// Numeric view of the value. `Unset` and text yield `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Integer view. Floats are not truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Integer(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Integer(v as i64)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Text(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Text(v)
    }
}

// ---------------------------------------------------------------------------
// Merge and lookup options
// ---------------------------------------------------------------------------

/// Which side wins when both data sets observed a variable at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    KeepCurrent,
    KeepOther,
}

/// How [`get_variable_observation`](crate::data::dataset::TabularDataset::get_variable_observation)
/// matches the requested time against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMethod {
    /// Only an observation at exactly the requested time.
    Exact,
    /// The closest observation inside the window.
    #[default]
    Nearest,
    /// Mean of the observations inside the window.
    Mean,
    /// Linear in time between the closest observations on either side.
    Interpolate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_never_equal() {
        assert_ne!(ConfigValue::Unset, ConfigValue::Unset);
        assert_ne!(ConfigValue::Unset, ConfigValue::Float(1.0));
        assert_ne!(ConfigValue::Float(f64::NAN), ConfigValue::Float(f64::NAN));
    }

    #[test]
    fn mixed_numeric_equality() {
        assert_eq!(ConfigValue::Integer(10), ConfigValue::Float(10.0));
        assert_ne!(ConfigValue::Integer(10), ConfigValue::Text("10".into()));
        assert_eq!(ConfigValue::from("Horizontal"), ConfigValue::Text("Horizontal".into()));
    }

    #[test]
    fn json_shapes() {
        let values: Vec<ConfigValue> = serde_json::from_str(r#"[null, 10, 1.75, "SL"]"#).unwrap();
        assert!(values[0].is_unset());
        assert_eq!(values[1].as_i64(), Some(10));
        assert_eq!(values[2].as_f64(), Some(1.75));
        assert_eq!(values[3].as_str(), Some("SL"));
        assert_eq!(serde_json::to_string(&ConfigValue::Unset).unwrap(), "null");
    }

    #[test]
    fn timestamps() {
        let a = parse_timestamp("2017-03-01 12:30:00").unwrap();
        let b = parse_timestamp("2017-03-01T12:30:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.format(DATETIME_FORMAT).to_string(), "2017-03-01 12:30:00");
        assert!(parse_timestamp("yesterday").is_none());
    }
}
