//! Dynamic client registration metadata (RFC 7591).

use serde::{Deserialize, Serialize};

use idforge_core::{Error, Result};

use crate::application::{OidcAppType, OidcAuthMethod, OidcGrantType, OidcResponseType};
use crate::validate::{is_localhost, parse_http_url};

/// Client metadata as submitted to the registration endpoint.
///
/// Defaults follow the RFC: omitted `grant_types` means authorization code,
/// omitted `response_types` means `code`, omitted auth method means basic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    #[serde(default)]
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub application_type: Option<OidcAppType>,
    #[serde(default)]
    pub grant_types: Vec<OidcGrantType>,
    #[serde(default)]
    pub response_types: Vec<OidcResponseType>,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<OidcAuthMethod>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl ClientMetadata {
    pub fn application_type(&self) -> OidcAppType {
        self.application_type.unwrap_or(OidcAppType::Web)
    }

    pub fn grant_types(&self) -> Vec<OidcGrantType> {
        if self.grant_types.is_empty() {
            vec![OidcGrantType::AuthorizationCode]
        } else {
            self.grant_types.clone()
        }
    }

    pub fn response_types(&self) -> Vec<OidcResponseType> {
        if self.response_types.is_empty() {
            vec![OidcResponseType::Code]
        } else {
            self.response_types.clone()
        }
    }

    pub fn auth_method(&self) -> OidcAuthMethod {
        self.token_endpoint_auth_method.unwrap_or(OidcAuthMethod::Basic)
    }

    /// Validate the metadata per RFC 7591 plus the web-app https rule.
    pub fn validate(&self) -> Result<()> {
        if self.redirect_uris.is_empty() {
            return Err(Error::invalid_argument(
                "DOMAIN-dcr1",
                "at least one redirect_uri is required",
            ));
        }

        let app_type = self.application_type();
        for raw in &self.redirect_uris {
            let url = parse_http_url(raw)?;
            if app_type == OidcAppType::Web && url.scheme() != "https" && !is_localhost(&url) {
                return Err(Error::invalid_argument(
                    "DOMAIN-dcr2",
                    "web applications require https redirect uris",
                )
                .with_detail("redirect_uri", raw));
            }
        }

        self.check_grant_response_consistency()
    }

    /// `authorization_code` and `code` imply each other; `implicit` requires
    /// a `token` or `id_token` response type.
    fn check_grant_response_consistency(&self) -> Result<()> {
        let grants = self.grant_types();
        let responses = self.response_types();

        let has_code_grant = grants.contains(&OidcGrantType::AuthorizationCode);
        let has_code_response = responses.contains(&OidcResponseType::Code);
        if has_code_grant != has_code_response {
            return Err(Error::invalid_argument(
                "DOMAIN-dcr3",
                "authorization_code grant and code response type must be used together",
            ));
        }

        let has_implicit = grants.contains(&OidcGrantType::Implicit);
        let has_implicit_response = responses.contains(&OidcResponseType::Token)
            || responses.contains(&OidcResponseType::IdToken);
        if has_implicit && !has_implicit_response {
            return Err(Error::invalid_argument(
                "DOMAIN-dcr4",
                "implicit grant requires token or id_token response type",
            ));
        }
        if has_implicit_response && !has_implicit {
            return Err(Error::invalid_argument(
                "DOMAIN-dcr5",
                "token and id_token response types require the implicit grant",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(uris: &[&str]) -> ClientMetadata {
        ClientMetadata {
            client_name: "test".to_string(),
            redirect_uris: uris.iter().map(|s| s.to_string()).collect(),
            application_type: Some(OidcAppType::Web),
            grant_types: vec![],
            response_types: vec![],
            token_endpoint_auth_method: None,
            post_logout_redirect_uris: vec![],
            scope: None,
        }
    }

    #[test]
    fn web_apps_require_https() {
        assert!(metadata(&["http://example.com/cb"]).validate().is_err());
        assert!(metadata(&["https://example.com/cb"]).validate().is_ok());
        assert!(metadata(&["http://localhost:3000/cb"]).validate().is_ok());
    }

    #[test]
    fn redirect_uris_must_not_be_empty() {
        assert!(metadata(&[]).validate().is_err());
    }

    #[test]
    fn grant_response_consistency() {
        let mut m = metadata(&["https://example.com/cb"]);
        m.grant_types = vec![OidcGrantType::AuthorizationCode];
        m.response_types = vec![OidcResponseType::Code];
        assert!(m.validate().is_ok());

        m.response_types = vec![OidcResponseType::Token];
        assert!(m.validate().is_err());

        m.grant_types = vec![OidcGrantType::Implicit];
        m.response_types = vec![OidcResponseType::Token];
        assert!(m.validate().is_ok());

        m.response_types = vec![OidcResponseType::Code];
        assert!(m.validate().is_err());
    }
}
