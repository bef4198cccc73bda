//! Generic OAuth provider with explicitly configured endpoints.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use url::Url;

use idforge_core::{Context, EmailAddress, Error, Result};
use idforge_domain::OAuthIdpConfig;

use crate::provider::{map_provider_status, map_request_error, Provider, Tokens};
use crate::user::ExternalUser;

pub struct OAuthProvider {
    name: String,
    client: reqwest::Client,
    config: OAuthIdpConfig,
}

impl OAuthProvider {
    pub fn new(client: reqwest::Client, name: &str, config: OAuthIdpConfig) -> Self {
        Self {
            name: name.to_string(),
            client,
            config,
        }
    }
}

#[async_trait]
impl Provider for OAuthProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn auth_url(
        &self,
        redirect_uri: &str,
        state: &str,
        _nonce: Option<&str>,
        code_challenge: Option<&str>,
    ) -> Result<String> {
        let mut url = Url::parse(&self.config.authorization_endpoint).map_err(|e| {
            Error::internal("IDP-oa01", format!("authorization endpoint invalid: {e}"))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("state", state);
            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scopes.join(" "));
            }
            if let Some(challenge) = code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }
        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        ctx: &Context,
        code: &str,
        code_verifier: Option<&str>,
        redirect_uri: &str,
    ) -> Result<Tokens> {
        ctx.check_deadline(Utc::now())?;
        let secret = String::from_utf8_lossy(&self.config.client_secret).to_string();
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("client_id", self.config.client_id.clone()),
            ("client_secret", secret),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier.to_string()));
        }

        let response = self
            .client
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| map_request_error("token exchange", &e))?;
        if !response.status().is_success() {
            return Err(map_provider_status("token exchange", response.status()));
        }
        response
            .json()
            .await
            .map_err(|e| Error::unauthenticated("IDP-oa02", format!("token response invalid: {e}")))
    }

    async fn fetch_user(
        &self,
        ctx: &Context,
        tokens: &Tokens,
        _expected_nonce: Option<&str>,
    ) -> Result<ExternalUser> {
        ctx.check_deadline(Utc::now())?;
        let response = self
            .client
            .get(&self.config.user_endpoint)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| map_request_error("userinfo", &e))?;
        if !response.status().is_success() {
            return Err(map_provider_status("userinfo", response.status()));
        }
        let body: JsonValue = response.json().await.map_err(|e| {
            Error::unauthenticated("IDP-oa03", format!("userinfo response invalid: {e}"))
        })?;

        normalise(&self.config.id_attribute, &body)
    }
}

/// Plain OAuth has no claim standard, so mapping is attribute-driven: the
/// configured `id_attribute` names the unique id, common field names cover
/// the rest.
fn normalise(id_attribute: &str, body: &JsonValue) -> Result<ExternalUser> {
    let external_user_id = match &body[id_attribute] {
        JsonValue::String(s) if !s.is_empty() => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        _ => {
            return Err(Error::unauthenticated(
                "IDP-oa04",
                format!("userinfo response is missing id attribute '{id_attribute}'"),
            ));
        }
    };

    let string_of = |key: &str| body[key].as_str().map(str::to_string);
    Ok(ExternalUser {
        external_user_id,
        email: string_of("email").and_then(|raw| EmailAddress::parse(raw).ok()),
        email_verified: body["email_verified"].as_bool().unwrap_or(false),
        username: string_of("login").or_else(|| string_of("username")),
        first_name: string_of("given_name").or_else(|| string_of("first_name")),
        last_name: string_of("family_name").or_else(|| string_of("last_name")),
        display_name: string_of("name"),
        avatar_url: string_of("avatar_url").or_else(|| string_of("picture")),
        locale: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_attribute_drives_identity() {
        let body = json!({"id": 12345, "login": "octo", "email": "octo@example.com"});
        let user = normalise("id", &body).unwrap();
        assert_eq!(user.external_user_id, "12345");
        assert_eq!(user.username.as_deref(), Some("octo"));

        assert!(normalise("uid", &body).is_err());
    }
}
