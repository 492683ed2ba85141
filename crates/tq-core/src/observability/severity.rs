use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Log severity, ordered from least to most severe.
///
/// Numeric values and labels follow the classic logger scale, so records
/// pushed to the log queue carry `level` 0..=5 and the matching label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    #[default]
    Warn = 2,
    Error = 3,
    Fatal = 4,
    Unknown = 5,
}

const ALL: [Severity; 6] = [
    Severity::Debug,
    Severity::Info,
    Severity::Warn,
    Severity::Error,
    Severity::Fatal,
    Severity::Unknown,
];

/// (label, queue tag) per severity, indexed by level.
const LABELS: [(&str, &str); 6] = [
    ("DEBUG", "debug"),
    ("INFO", "info"),
    ("WARN", "warn"),
    ("ERROR", "error"),
    ("FATAL", "fatal"),
    ("ANY", "any"),
];

impl Severity {
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        ALL.get(usize::from(level)).copied()
    }

    /// Upper-case label written into log records.
    pub fn label(self) -> &'static str {
        LABELS[self as usize].0
    }

    /// Lower-case tag used when pushing to the log queue.
    pub fn tag(self) -> &'static str {
        LABELS[self as usize].1
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity: {0:?}")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    /// Accepts labels in any case, `unknown`/`warning` aliases, and numeric levels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Ok(n) = lower.parse::<u8>() {
            return Severity::from_level(n).ok_or_else(|| ParseSeverityError(s.to_string()));
        }
        match lower.as_str() {
            "warning" => Ok(Severity::Warn),
            "unknown" => Ok(Severity::Unknown),
            other => ALL
                .iter()
                .copied()
                .find(|sev| sev.tag() == other)
                .ok_or_else(|| ParseSeverityError(s.to_string())),
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeverityRepr {
    Level(u8),
    Name(String),
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match SeverityRepr::deserialize(deserializer)? {
            SeverityRepr::Level(n) => Severity::from_level(n)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown severity level {n}"))),
            SeverityRepr::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn ordering_follows_levels() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Error >= Severity::Warn);
        assert!(Severity::Unknown > Severity::Fatal);
    }

    #[test]
    fn unknown_is_labelled_any() {
        assert_eq!(Severity::Unknown.label(), "ANY");
        assert_eq!(Severity::Unknown.tag(), "any");
    }

    #[rstest]
    #[case("warn", Severity::Warn)]
    #[case("WARNING", Severity::Warn)]
    #[case(" Error ", Severity::Error)]
    #[case("any", Severity::Unknown)]
    #[case("unknown", Severity::Unknown)]
    #[case("0", Severity::Debug)]
    fn parses_names_and_levels(#[case] input: &str, #[case] expected: Severity) {
        assert_eq!(input.parse::<Severity>().unwrap(), expected);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!("6".parse::<Severity>().is_err());
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn deserializes_from_number_or_name() {
        let s: Severity = serde_json::from_str("3").unwrap();
        assert_eq!(s, Severity::Error);
        let s: Severity = serde_json::from_str("\"info\"").unwrap();
        assert_eq!(s, Severity::Info);
    }
}
