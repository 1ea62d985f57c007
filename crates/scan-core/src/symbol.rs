use crate::ScanError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// A non-empty, upper-case ticker symbol. The unique key used throughout
/// the store, the bus, and the strategy engine.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct Symbol(String);

impl Symbol {
    /// Construct a [`Symbol`], upper-casing the input. Returns
    /// `ScanError::DataValidationError` for an empty or whitespace-only string.
    pub fn new(input: impl Into<String>) -> Result<Self, ScanError> {
        let raw = input.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ScanError::DataValidationError(
                "symbol must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Symbol::new(raw).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ScanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ScanError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_cases_and_trims() {
        let s = Symbol::new(" aapl ").unwrap();
        assert_eq!(s.as_str(), "AAPL");
    }

    #[test]
    fn rejects_empty() {
        assert!(Symbol::new("").is_err());
        assert!(Symbol::new("   ").is_err());
    }

    #[test]
    fn orders_lexicographically() {
        let a = Symbol::new("AAA").unwrap();
        let b = Symbol::new("BBB").unwrap();
        assert!(a < b);
    }
}
