//! Tri-state health codes
//!
//! Every health-style check reports one of three codes. Ordering follows
//! severity, so aggregating sub-checks is a `max`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Health code of a check (higher = worse)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TriStateCode {
    #[default]
    Healthy = 0,
    Degraded = 1,
    Unhealthy = 2,
}

impl TriStateCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Unhealthy => "UNHEALTHY",
        }
    }

    /// Numeric code as used in the run summary
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Healthy),
            1 => Some(Self::Degraded),
            2 => Some(Self::Unhealthy),
            _ => None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Worst code across sub-checks; an empty set is healthy.
    pub fn worst<I>(codes: I) -> Self
    where
        I: IntoIterator<Item = TriStateCode>,
    {
        codes.into_iter().max().unwrap_or_default()
    }

    /// Classify a "lower is worse" measurement, such as free disk percent.
    pub fn from_floor(value: f64, warn_below: f64, critical_below: f64) -> Self {
        if value < critical_below {
            Self::Unhealthy
        } else if value < warn_below {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    /// Classify a "higher is worse" measurement, such as memory usage.
    pub fn from_ceiling(value: f64, warn_at: f64, critical_at: f64) -> Self {
        if value >= critical_at {
            Self::Unhealthy
        } else if value >= warn_at {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }
}

impl fmt::Display for TriStateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Serialized as the bare numeric code so summaries stay machine-parseable
impl Serialize for TriStateCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for TriStateCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = u8::deserialize(deserializer)?;
        TriStateCode::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid health code {}", code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_by_severity() {
        assert!(TriStateCode::Healthy < TriStateCode::Degraded);
        assert!(TriStateCode::Degraded < TriStateCode::Unhealthy);
    }

    #[test]
    fn test_worst() {
        let codes = [TriStateCode::Healthy, TriStateCode::Unhealthy, TriStateCode::Degraded];
        assert_eq!(TriStateCode::worst(codes), TriStateCode::Unhealthy);
        assert_eq!(TriStateCode::worst(Vec::new()), TriStateCode::Healthy);
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(TriStateCode::from_floor(50.0, 20.0, 10.0), TriStateCode::Healthy);
        assert_eq!(TriStateCode::from_floor(15.0, 20.0, 10.0), TriStateCode::Degraded);
        assert_eq!(TriStateCode::from_floor(5.0, 20.0, 10.0), TriStateCode::Unhealthy);
        assert_eq!(TriStateCode::from_ceiling(85.0, 85.0, 95.0), TriStateCode::Degraded);
        assert_eq!(TriStateCode::from_ceiling(99.0, 85.0, 95.0), TriStateCode::Unhealthy);
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&TriStateCode::Degraded).unwrap();
        assert_eq!(json, "1");
        let back: TriStateCode = serde_json::from_str("2").unwrap();
        assert_eq!(back, TriStateCode::Unhealthy);
        assert!(serde_json::from_str::<TriStateCode>("7").is_err());
    }
}
