//! The provider seam between the command engine and external IDPs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use idforge_core::{Context, Error, IdpId, Result};
use idforge_domain::IdpConfig;

use crate::oauth::OAuthProvider;
use crate::oidc::OidcProvider;
use crate::user::ExternalUser;

/// What the provider redirected back to us.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdpCallback {
    pub code: Option<String>,
    pub state: String,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Token response of a code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// One configured external provider.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Build the authorization URL the browser is sent to.
    fn auth_url(
        &self,
        redirect_uri: &str,
        state: &str,
        nonce: Option<&str>,
        code_challenge: Option<&str>,
    ) -> Result<String>;

    /// Exchange the authorization code for tokens.
    async fn exchange_code(
        &self,
        ctx: &Context,
        code: &str,
        code_verifier: Option<&str>,
        redirect_uri: &str,
    ) -> Result<Tokens>;

    /// Fetch and normalise the external user behind the tokens.
    ///
    /// `expected_nonce` is checked against the id token where the provider
    /// issues one.
    async fn fetch_user(
        &self,
        ctx: &Context,
        tokens: &Tokens,
        expected_nonce: Option<&str>,
    ) -> Result<ExternalUser>;
}

/// Builds providers from stored configurations.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn provider(
        &self,
        ctx: &Context,
        idp_id: &IdpId,
        config: &IdpConfig,
    ) -> Result<Box<dyn Provider>>;
}

/// Production factory: HTTP-backed providers, deadline-bounded.
#[derive(Debug, Default)]
pub struct HttpProviderFactory;

impl HttpProviderFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProviderFactory for HttpProviderFactory {
    async fn provider(
        &self,
        ctx: &Context,
        idp_id: &IdpId,
        config: &IdpConfig,
    ) -> Result<Box<dyn Provider>> {
        let client = client_for(ctx)?;
        match config {
            IdpConfig::Oidc(c) => Ok(Box::new(
                OidcProvider::discover(ctx, client, idp_id.as_str(), c.clone()).await?,
            )),
            IdpConfig::OAuth(c) => {
                Ok(Box::new(OAuthProvider::new(client, idp_id.as_str(), c.clone())))
            }
            other => Err(Error::precondition_failed(
                "IDP-fa01",
                format!("idp type {:?} has no redirect provider", other.idp_type()),
            )),
        }
    }
}

/// HTTP client bounded by the command deadline.
///
/// Cancellation with the context: once the deadline elapses, in-flight
/// requests abort and surface as `DeadlineExceeded` upstream.
pub(crate) fn client_for(ctx: &Context) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(remaining) = ctx.remaining(Utc::now()) {
        let remaining = remaining.to_std().map_err(|_| {
            Error::deadline_exceeded("IDP-cl01", "command deadline elapsed before provider call")
        })?;
        builder = builder.timeout(remaining);
    } else {
        builder = builder.timeout(Duration::from_secs(30));
    }
    builder
        .build()
        .map_err(|e| Error::internal("IDP-cl02", format!("http client construction failed: {e}")))
}

/// Map token/userinfo endpoint failures into the taxonomy: 4xx means the
/// exchange was rejected, 5xx means the provider is down.
pub(crate) fn map_provider_status(op: &str, status: reqwest::StatusCode) -> Error {
    if status.is_client_error() {
        Error::unauthenticated("IDP-ht01", format!("{op} rejected by provider ({status})"))
    } else {
        Error::unavailable("IDP-ht02", format!("{op} failed at provider ({status})"))
    }
}

pub(crate) fn map_request_error(op: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::deadline_exceeded("IDP-ht03", format!("{op} timed out"))
    } else {
        Error::unavailable("IDP-ht04", format!("{op} failed: {err}"))
    }
}
