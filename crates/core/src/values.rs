//! Validated value objects: email, phone, language, domain names.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

// E.164: plus sign, then up to 15 digits, no leading zero.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("phone regex"));

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}$").expect("domain regex")
});

macro_rules! fmt_as_str {
    () => {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            f.write_str(&self.0)
        }
    };
}

/// An email address, stored as given but compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_argument("CORE-em01", "email must not be empty"));
        }
        if !EMAIL_RE.is_match(trimmed) {
            return Err(
                Error::invalid_argument("CORE-em02", "email has invalid format")
                    .with_detail("email", trimmed),
            );
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the `@`, used as a username fallback during
    /// provisioning from an external identity.
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }

    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl core::fmt::Display for EmailAddress {
    fmt_as_str!();
}

/// An E.164 phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        // Accept spaces and dashes from user input, store canonical form.
        let canonical: String = raw.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
        if canonical.is_empty() {
            return Err(Error::invalid_argument("CORE-ph01", "phone must not be empty"));
        }
        if !PHONE_RE.is_match(&canonical) {
            return Err(
                Error::invalid_argument("CORE-ph02", "phone must be in E.164 format")
                    .with_detail("phone", raw),
            );
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PhoneNumber {
    fmt_as_str!();
}

/// A language tag, lowercased primary subtag only (e.g. `en`, `de`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let tag = raw.trim().to_ascii_lowercase();
        let primary = tag.split('-').next().unwrap_or("");
        if primary.len() < 2 || primary.len() > 3 || !primary.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(
                Error::invalid_argument("CORE-lg01", "language tag is invalid")
                    .with_detail("language", raw),
            );
        }
        Ok(Self(primary.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Language {
    fn default() -> Self {
        Self("en".to_string())
    }
}

impl core::fmt::Display for Language {
    fmt_as_str!();
}

/// A DNS domain name, lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainName(String);

impl DomainName {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let lowered = raw.trim().to_ascii_lowercase();
        if !DOMAIN_RE.is_match(&lowered) {
            return Err(
                Error::invalid_argument("CORE-dn01", "domain name is invalid")
                    .with_detail("domain", raw),
            );
        }
        Ok(Self(lowered))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DomainName {
    fmt_as_str!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(EmailAddress::parse("alice@example.com").is_ok());
        assert!(EmailAddress::parse("not-an-email").is_err());
        assert!(EmailAddress::parse("a b@example.com").is_err());
        let e = EmailAddress::parse("Alice@Example.com").unwrap();
        assert_eq!(e.local_part(), "Alice");
        assert!(e.eq_ignore_case("alice@example.com"));
    }

    #[test]
    fn phone_validation() {
        assert_eq!(PhoneNumber::parse("+41 79 123 45 67").unwrap().as_str(), "+41791234567");
        assert!(PhoneNumber::parse("0791234567").is_err());
        assert!(PhoneNumber::parse("+0123").is_err());
    }

    #[test]
    fn language_normalizes_to_primary_subtag() {
        assert_eq!(Language::parse("de-CH").unwrap().as_str(), "de");
        assert!(Language::parse("x").is_err());
    }

    #[test]
    fn domain_names_are_lowercased() {
        assert_eq!(DomainName::parse("Login.Example.COM").unwrap().as_str(), "login.example.com");
        assert!(DomainName::parse("no_underscores.example").is_err());
        assert!(DomainName::parse("single").is_err());
    }
}
