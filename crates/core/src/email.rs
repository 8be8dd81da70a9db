use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A customer's e-mail address, normalised (trimmed, lower-cased).
///
/// Normalisation matters because the address is half of the interest-record
/// key: `Ana@x.com` and `ana@x.com ` must land on the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomerEmail(String);

impl CustomerEmail {
    pub fn parse(raw: impl AsRef<str>) -> DomainResult<Self> {
        let value = raw.as_ref().trim().to_lowercase();
        if value.is_empty() {
            return Err(DomainError::validation("email is required"));
        }
        if value.len() > 254 {
            return Err(DomainError::validation("email is too long"));
        }

        let (local, domain) = value
            .split_once('@')
            .ok_or_else(|| DomainError::validation(format!("invalid email: {value}")))?;
        if local.is_empty()
            || domain.is_empty()
            || domain.contains('@')
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
            || value.chars().any(char::is_whitespace)
        {
            return Err(DomainError::validation(format!("invalid email: {value}")));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for CustomerEmail {}

impl core::fmt::Display for CustomerEmail {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CustomerEmail {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CustomerEmail> for String {
    fn from(value: CustomerEmail) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_case_and_whitespace() {
        let a = CustomerEmail::parse("Ana@Padaria.test").unwrap();
        let b = CustomerEmail::parse("  ana@padaria.test ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "ana@padaria.test");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["", "   ", "ana", "@padaria.test", "ana@", "ana@padaria", "a b@x.com", "a@b@c.com", "ana@.com"] {
            assert!(CustomerEmail::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn deserialisation_validates() {
        let ok: CustomerEmail = serde_json::from_str("\"Bia@Padaria.test\"").unwrap();
        assert_eq!(ok.as_str(), "bia@padaria.test");
        assert!(serde_json::from_str::<CustomerEmail>("\"nope\"").is_err());
    }
}
