//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are opaque strings on the wire (they appear in URLs, tokens
//! and foreign systems), so they are string-backed here. Freshly generated
//! ids use UUIDv7 in simple (hyphenless) encoding, which keeps them
//! time-ordered and index-friendly.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, ErrorKind};

/// Generate a fresh time-ordered id string.
pub fn generate() -> String {
    Uuid::now_v7().simple().to_string()
}

macro_rules! impl_string_id {
    ($t:ident, $name:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(String);

        impl $t {
            /// Wrap an existing identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh identifier (UUIDv7, simple encoding).
            pub fn generate() -> Self {
                Self(generate())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Default for $t {
            /// Empty id; placeholder until the first event assigns one.
            fn default() -> Self {
                Self(String::new())
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        "CORE-id01",
                        concat!($name, " must not be empty"),
                    ));
                }
                Ok(Self(s.to_string()))
            }
        }
    };
}

impl_string_id!(InstanceId, "InstanceId");
impl_string_id!(OrgId, "OrgId");
impl_string_id!(UserId, "UserId");
impl_string_id!(ProjectId, "ProjectId");
impl_string_id!(AppId, "AppId");
impl_string_id!(IdpId, "IdpId");
impl_string_id!(ActionId, "ActionId");
impl_string_id!(TargetId, "TargetId");
impl_string_id!(ExecutionId, "ExecutionId");
impl_string_id!(IntentId, "IntentId");
impl_string_id!(SessionId, "SessionId");
impl_string_id!(RequestId, "RequestId");
impl_string_id!(TokenId, "TokenId");

impl InstanceId {
    /// The org scope of instance-owned aggregates is the instance itself.
    pub fn as_org_id(&self) -> OrgId {
        OrgId::new(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_ordered() {
        let a = UserId::generate();
        let b = UserId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().len() == 32);
    }

    #[test]
    fn empty_id_is_rejected() {
        let err = "".parse::<OrgId>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
