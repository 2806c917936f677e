//! Distance unit normalization
//!
//! SDK variants disagree on the range unit: some report meters, some report
//! millimeters through the same field. [`DistanceUnit::Auto`] applies a
//! best-effort heuristic: any raw value above
//! [`MILLIMETER_HEURISTIC_THRESHOLD`] is taken to be millimeters.
//!
//! **This is a compatibility shim, not a protocol guarantee.** A sensor that
//! really sees beyond 1000 m, or a millimeter reading below 1000 mm, is
//! misclassified. Configure `Meters` or `Millimeters` explicitly when the
//! driver's unit is known.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raw magnitudes above this are treated as millimeters in `Auto` mode
pub const MILLIMETER_HEURISTIC_THRESHOLD: f64 = 1000.0;

/// Unit of the raw range values reported by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DistanceUnit {
    Meters,
    Millimeters,
    /// Per-value heuristic, see module docs
    #[default]
    Auto,
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DistanceUnit::Meters => "m",
            DistanceUnit::Millimeters => "mm",
            DistanceUnit::Auto => "auto",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown distance unit '{0}' (expected 'm', 'mm' or 'auto')")]
pub struct ParseDistanceUnitError(pub String);

impl FromStr for DistanceUnit {
    type Err = ParseDistanceUnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "meters" => Ok(DistanceUnit::Meters),
            "mm" | "millimeters" => Ok(DistanceUnit::Millimeters),
            "auto" => Ok(DistanceUnit::Auto),
            other => Err(ParseDistanceUnitError(other.to_string())),
        }
    }
}

/// Convert a raw range value to meters
pub fn normalize_distance(raw: f64, unit: DistanceUnit) -> f64 {
    match unit {
        DistanceUnit::Meters => raw,
        DistanceUnit::Millimeters => raw / 1000.0,
        DistanceUnit::Auto => {
            if raw > MILLIMETER_HEURISTIC_THRESHOLD {
                raw / 1000.0
            } else {
                raw
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_heuristic() {
        assert_eq!(normalize_distance(3.25, DistanceUnit::Auto), 3.25);
        assert_eq!(normalize_distance(1000.0, DistanceUnit::Auto), 1000.0);
        assert!((normalize_distance(2500.0, DistanceUnit::Auto) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_forced_units() {
        assert_eq!(normalize_distance(2500.0, DistanceUnit::Meters), 2500.0);
        assert!((normalize_distance(250.0, DistanceUnit::Millimeters) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_parse_unit() {
        assert_eq!("mm".parse::<DistanceUnit>().unwrap(), DistanceUnit::Millimeters);
        assert_eq!("Meters".parse::<DistanceUnit>().unwrap(), DistanceUnit::Meters);
        assert_eq!("auto".parse::<DistanceUnit>().unwrap(), DistanceUnit::Auto);
        assert_eq!(
            "feet".parse::<DistanceUnit>(),
            Err(ParseDistanceUnitError("feet".to_string()))
        );
    }
}
