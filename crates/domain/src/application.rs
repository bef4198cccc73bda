//! Application model: OIDC and API apps on a project.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl AppState {
    pub fn exists(self) -> bool {
        matches!(self, Self::Active | Self::Inactive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OidcAppType {
    Web,
    UserAgent,
    Native,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OidcGrantType {
    AuthorizationCode,
    Implicit,
    RefreshToken,
    DeviceCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OidcResponseType {
    Code,
    IdToken,
    Token,
}

/// Client authentication at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OidcAuthMethod {
    Basic,
    Post,
    None,
    PrivateKeyJwt,
}

impl OidcAuthMethod {
    /// Whether clients using this method get a generated secret.
    pub fn needs_secret(self) -> bool {
        matches!(self, Self::Basic | Self::Post)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiAuthMethod {
    Basic,
    PrivateKeyJwt,
}

impl ApiAuthMethod {
    pub fn needs_secret(self) -> bool {
        matches!(self, Self::Basic)
    }
}
