//! Dynamic client registration (RFC 7591): turn submitted client metadata
//! into an OIDC application on a project.

use idforge_core::{AppId, Context, ObjectDetails, ProjectId, Result};
use idforge_domain::ClientMetadata;

use crate::application::{AddOidcApplication, CreatedOidcApplication};
use crate::Commands;

#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub app_id: AppId,
    pub client_id: String,
    /// Absent for `none` and `private_key_jwt` clients.
    pub client_secret: Option<String>,
    /// Unix seconds; zero means the secret never expires.
    pub client_secret_expires_at: i64,
    pub details: ObjectDetails,
}

impl Commands {
    /// Register a client from RFC 7591 metadata.
    ///
    /// Validation happens up front (redirect uris present, https for web
    /// apps outside localhost, grant/response consistency); the application
    /// itself is created through the regular OIDC app path, so generated
    /// credentials follow the same rules everywhere.
    pub async fn register_client(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        metadata: ClientMetadata,
    ) -> Result<RegisteredClient> {
        metadata.validate()?;

        let name = if metadata.client_name.trim().is_empty() {
            format!("client-{}", idforge_core::id::generate())
        } else {
            metadata.client_name.trim().to_string()
        };

        let created: CreatedOidcApplication = self
            .add_oidc_application(
                ctx,
                AddOidcApplication {
                    project_id: project_id.clone(),
                    name,
                    redirect_uris: metadata.redirect_uris.clone(),
                    response_types: metadata.response_types(),
                    grant_types: metadata.grant_types(),
                    app_type: metadata.application_type(),
                    auth_method: metadata.auth_method(),
                    post_logout_redirect_uris: metadata.post_logout_redirect_uris.clone(),
                    dev_mode: false,
                },
            )
            .await?;

        Ok(RegisteredClient {
            app_id: created.app_id,
            client_id: created.client_id,
            client_secret: created.client_secret,
            client_secret_expires_at: 0,
            details: created.details,
        })
    }
}
