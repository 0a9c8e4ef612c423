//! Human-readable size and duration parsing for configuration values

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),
}

/// Splits `"15m"` into `(15, "m")`. A bare number yields an empty unit.
fn split_number_unit(s: &str) -> Result<(u64, String), ParseError> {
    let s = s.trim();
    let pos = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if pos == 0 {
        return Err(ParseError::InvalidFormat(s.to_string()));
    }
    let num: u64 = s[..pos].parse()?;
    Ok((num, s[pos..].trim().to_ascii_lowercase()))
}

/// Config values may be written either as a string with a unit or as a plain integer.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Int(u64),
    Text(String),
}

/// Byte size wrapper with human-readable parsing ("64KB", "5MB")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (num, unit) = split_number_unit(s)?;
        let multiplier = match unit.as_str() {
            "" | "b" => 1,
            "k" | "kb" | "kib" => 1024,
            "m" | "mb" | "mib" => 1024 * 1024,
            "g" | "gb" | "gib" => 1024 * 1024 * 1024,
            _ => return Err(ParseError::InvalidUnit(unit)),
        };
        Ok(ByteSize(num * multiplier))
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match RawValue::deserialize(deserializer)? {
            RawValue::Int(v) => Ok(ByteSize(v)),
            RawValue::Text(v) => v.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: &[(&str, u64)] = &[("GB", 1 << 30), ("MB", 1 << 20), ("KB", 1 << 10)];
        for &(unit, divisor) in UNITS {
            if self.0 >= divisor && self.0 % divisor == 0 {
                return write!(f, "{}{}", self.0 / divisor, unit);
            }
        }
        write!(f, "{}B", self.0)
    }
}

/// Duration with human-readable parsing ("90s", "30m", "2h", "7d").
///
/// Plain integers are read as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (num, unit) = split_number_unit(s)?;
        let multiplier = match unit.as_str() {
            "" | "s" | "sec" | "secs" => 1,
            "m" | "min" | "mins" => 60,
            "h" | "hr" | "hrs" => 60 * 60,
            "d" | "day" | "days" => 24 * 60 * 60,
            _ => return Err(ParseError::InvalidUnit(unit)),
        };
        Ok(HumanDuration::from_secs(num * multiplier))
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match RawValue::deserialize(deserializer)? {
            RawValue::Int(v) => Ok(HumanDuration::from_secs(v)),
            RawValue::Text(v) => v.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.as_secs();
        match secs {
            0 => write!(f, "0s"),
            s if s % 86_400 == 0 => write!(f, "{}d", s / 86_400),
            s if s % 3_600 == 0 => write!(f, "{}h", s / 3_600),
            s if s % 60 == 0 => write!(f, "{}m", s / 60),
            s => write!(f, "{}s", s),
        }
    }
}
