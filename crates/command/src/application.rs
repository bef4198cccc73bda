//! Application commands: OIDC and API apps on a project.
//!
//! Applications are sub-entities of the project aggregate; the write model
//! folds the whole project stream (its sequence is the aggregate head) and
//! filters payloads by `app_id`.

use uuid::Uuid;

use idforge_core::{AppId, Context, Error, InstanceId, ObjectDetails, ProjectId, Result};
use idforge_crypto::sha256_hex;
use idforge_domain::events::project as project_events;
use idforge_domain::events::AGGREGATE_PROJECT;
use idforge_domain::{
    ApiAuthMethod, AppState, OidcAppType, OidcAuthMethod, OidcGrantType, OidcResponseType,
};
use idforge_domain::validate::{is_localhost, parse_http_url};
use idforge_events::{
    AggregateBatch, Push, SearchQuery, StoredEvent, WriteModel, WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::permission::PERM_APP_WRITE;
use crate::Commands;

/// OIDC configuration as folded from the log.
#[derive(Debug, Clone, Default)]
pub struct OidcConfigState {
    pub client_id: String,
    pub client_secret_digest: String,
    pub redirect_uris: Vec<String>,
    pub response_types: Vec<OidcResponseType>,
    pub grant_types: Vec<OidcGrantType>,
    pub app_type: Option<OidcAppType>,
    pub auth_method: Option<OidcAuthMethod>,
    pub post_logout_redirect_uris: Vec<String>,
    pub dev_mode: bool,
}

/// Write model over one application on a project.
#[derive(Debug, Default)]
pub struct AppWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    project_id: ProjectId,
    app_id: AppId,
    pub state: AppState,
    pub name: String,
    pub project_exists: bool,
    pub oidc: Option<OidcConfigState>,
    pub api_auth_method: Option<ApiAuthMethod>,
}

impl AppWriteModel {
    pub fn new(instance_id: &InstanceId, project_id: &ProjectId, app_id: &AppId) -> Self {
        Self {
            base: WriteModelBase::new(project_id.as_str()),
            instance_id: instance_id.clone(),
            project_id: project_id.clone(),
            app_id: app_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> idforge_events::Aggregate {
        idforge_events::Aggregate::new(
            AGGREGATE_PROJECT,
            self.project_id.as_str(),
            &idforge_core::OrgId::new(self.base.resource_owner.clone()),
            &self.instance_id,
        )
    }

    fn is_mine(&self, app_id: &AppId) -> bool {
        &self.app_id == app_id
    }
}

impl WriteModel for AppWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_PROJECT)
            .aggregate_id(self.project_id.as_str())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&project_events::PROJECT_ADDED) {
            self.project_exists = true;
            return Ok(());
        }
        if event.is(&project_events::PROJECT_REMOVED) {
            self.project_exists = false;
            self.state = AppState::Removed;
            return Ok(());
        }

        if event.is(&project_events::APPLICATION_ADDED) {
            let payload: project_events::ApplicationAdded = event.payload_as()?;
            if self.is_mine(&payload.app_id) {
                self.state = AppState::Active;
                self.name = payload.name;
            }
        } else if event.is(&project_events::APPLICATION_CHANGED) {
            let payload: project_events::ApplicationChanged = event.payload_as()?;
            if self.is_mine(&payload.app_id) {
                self.name = payload.name;
            }
        } else if event.is(&project_events::APPLICATION_DEACTIVATED) {
            let payload: project_events::ApplicationStateChanged = event.payload_as()?;
            if self.is_mine(&payload.app_id) {
                self.state = AppState::Inactive;
            }
        } else if event.is(&project_events::APPLICATION_REACTIVATED) {
            let payload: project_events::ApplicationStateChanged = event.payload_as()?;
            if self.is_mine(&payload.app_id) {
                self.state = AppState::Active;
            }
        } else if event.is(&project_events::APPLICATION_REMOVED) {
            let payload: project_events::ApplicationStateChanged = event.payload_as()?;
            if self.is_mine(&payload.app_id) {
                self.state = AppState::Removed;
            }
        } else if event.is(&project_events::APPLICATION_OIDC_CONFIG_ADDED) {
            let payload: project_events::OidcConfigAdded = event.payload_as()?;
            if self.is_mine(&payload.app_id) {
                self.oidc = Some(OidcConfigState {
                    client_id: payload.client_id,
                    client_secret_digest: payload.client_secret_digest,
                    redirect_uris: payload.redirect_uris,
                    response_types: payload.response_types,
                    grant_types: payload.grant_types,
                    app_type: Some(payload.app_type),
                    auth_method: Some(payload.auth_method),
                    post_logout_redirect_uris: payload.post_logout_redirect_uris,
                    dev_mode: payload.dev_mode,
                });
            }
        } else if event.is(&project_events::APPLICATION_OIDC_CONFIG_CHANGED) {
            let payload: project_events::OidcConfigChanged = event.payload_as()?;
            if self.is_mine(&payload.app_id) {
                if let Some(oidc) = &mut self.oidc {
                    if let Some(v) = payload.redirect_uris {
                        oidc.redirect_uris = v;
                    }
                    if let Some(v) = payload.response_types {
                        oidc.response_types = v;
                    }
                    if let Some(v) = payload.grant_types {
                        oidc.grant_types = v;
                    }
                    if let Some(v) = payload.app_type {
                        oidc.app_type = Some(v);
                    }
                    if let Some(v) = payload.auth_method {
                        oidc.auth_method = Some(v);
                    }
                    if let Some(v) = payload.post_logout_redirect_uris {
                        oidc.post_logout_redirect_uris = v;
                    }
                    if let Some(v) = payload.dev_mode {
                        oidc.dev_mode = v;
                    }
                }
            }
        } else if event.is(&project_events::APPLICATION_OIDC_SECRET_CHANGED) {
            let payload: project_events::OidcSecretChanged = event.payload_as()?;
            if self.is_mine(&payload.app_id) {
                if let Some(oidc) = &mut self.oidc {
                    oidc.client_secret_digest = payload.client_secret_digest;
                }
            }
        } else if event.is(&project_events::APPLICATION_API_CONFIG_ADDED) {
            let payload: project_events::ApiConfigAdded = event.payload_as()?;
            if self.is_mine(&payload.app_id) {
                self.api_auth_method = Some(payload.auth_method);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AddOidcApplication {
    pub project_id: ProjectId,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub response_types: Vec<OidcResponseType>,
    pub grant_types: Vec<OidcGrantType>,
    pub app_type: OidcAppType,
    pub auth_method: OidcAuthMethod,
    pub post_logout_redirect_uris: Vec<String>,
    pub dev_mode: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedOidcApplication {
    pub app_id: AppId,
    pub client_id: String,
    /// Plaintext secret; returned exactly once, `None` for public clients.
    pub client_secret: Option<String>,
    pub details: ObjectDetails,
}

#[derive(Debug, Clone)]
pub struct CreatedApiApplication {
    pub app_id: AppId,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub details: ObjectDetails,
}

/// Validate redirect URIs against the app type. Dev mode disables the
/// https rule, mirroring the registration endpoint's behavior for test
/// clients.
fn validate_redirect_uris(
    app_type: OidcAppType,
    dev_mode: bool,
    uris: &[String],
) -> Result<()> {
    if uris.is_empty() {
        return Err(Error::invalid_argument(
            "COMMAND-ap01",
            "at least one redirect uri is required",
        ));
    }
    for raw in uris {
        let url = parse_http_url(raw)?;
        if app_type == OidcAppType::Web && !dev_mode && url.scheme() != "https" && !is_localhost(&url)
        {
            return Err(Error::invalid_argument(
                "COMMAND-ap02",
                "web applications require https redirect uris",
            )
            .with_detail("redirect_uri", raw));
        }
    }
    Ok(())
}

impl Commands {
    pub async fn add_oidc_application(
        &self,
        ctx: &Context,
        request: AddOidcApplication,
    ) -> Result<CreatedOidcApplication> {
        if request.name.trim().is_empty() {
            return Err(Error::invalid_argument("COMMAND-ap03", "application name must not be empty"));
        }
        validate_redirect_uris(request.app_type, request.dev_mode, &request.redirect_uris)?;

        let project = self.existing_project_model(ctx, &request.project_id).await?;
        self.check_permission(ctx, PERM_APP_WRITE, &project.base().resource_owner)?;

        let app_id = AppId::generate();
        let client_id = Uuid::new_v4().to_string();
        let client_secret = request
            .auth_method
            .needs_secret()
            .then(|| Uuid::new_v4().to_string());

        let creator = ctx.creator();
        let batch = AggregateBatch::new(project.aggregate(), project.base().expected_version())
            .event(
                project_events::APPLICATION_ADDED,
                creator.clone(),
                &project_events::ApplicationAdded {
                    app_id: app_id.clone(),
                    name: request.name.trim().to_string(),
                },
            )?
            .event(
                project_events::APPLICATION_OIDC_CONFIG_ADDED,
                creator,
                &project_events::OidcConfigAdded {
                    app_id: app_id.clone(),
                    client_id: client_id.clone(),
                    client_secret_digest: client_secret
                        .as_deref()
                        .map(|s| sha256_hex(s.as_bytes()))
                        .unwrap_or_default(),
                    redirect_uris: request.redirect_uris,
                    response_types: request.response_types,
                    grant_types: request.grant_types,
                    app_type: request.app_type,
                    auth_method: request.auth_method,
                    post_logout_redirect_uris: request.post_logout_redirect_uris,
                    dev_mode: request.dev_mode,
                    client_secret_expires_at: 0,
                },
            )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(CreatedOidcApplication {
            app_id,
            client_id,
            client_secret,
            details: crate::push_details(&pushed),
        })
    }

    pub async fn add_api_application(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        name: &str,
        auth_method: ApiAuthMethod,
    ) -> Result<CreatedApiApplication> {
        if name.trim().is_empty() {
            return Err(Error::invalid_argument("COMMAND-ap04", "application name must not be empty"));
        }
        let project = self.existing_project_model(ctx, project_id).await?;
        self.check_permission(ctx, PERM_APP_WRITE, &project.base().resource_owner)?;

        let app_id = AppId::generate();
        let client_id = Uuid::new_v4().to_string();
        let client_secret = auth_method.needs_secret().then(|| Uuid::new_v4().to_string());

        let creator = ctx.creator();
        let batch = AggregateBatch::new(project.aggregate(), project.base().expected_version())
            .event(
                project_events::APPLICATION_ADDED,
                creator.clone(),
                &project_events::ApplicationAdded {
                    app_id: app_id.clone(),
                    name: name.trim().to_string(),
                },
            )?
            .event(
                project_events::APPLICATION_API_CONFIG_ADDED,
                creator,
                &project_events::ApiConfigAdded {
                    app_id: app_id.clone(),
                    client_id: client_id.clone(),
                    client_secret_digest: client_secret
                        .as_deref()
                        .map(|s| sha256_hex(s.as_bytes()))
                        .unwrap_or_default(),
                    auth_method,
                },
            )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(CreatedApiApplication {
            app_id,
            client_id,
            client_secret,
            details: crate::push_details(&pushed),
        })
    }

    pub async fn update_oidc_application(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        app_id: &AppId,
        changes: project_events::OidcConfigChanged,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_app_model(ctx, project_id, app_id).await?;
        self.check_permission(ctx, PERM_APP_WRITE, &model.base().resource_owner)?;
        let Some(oidc) = &model.oidc else {
            return Err(Error::precondition_failed("COMMAND-ap05", "application is not an oidc app"));
        };

        if let Some(uris) = &changes.redirect_uris {
            let app_type = changes.app_type.or(oidc.app_type).unwrap_or(OidcAppType::Web);
            let dev_mode = changes.dev_mode.unwrap_or(oidc.dev_mode);
            validate_redirect_uris(app_type, dev_mode, uris)?;
        }

        let payload = project_events::OidcConfigChanged {
            app_id: app_id.clone(),
            redirect_uris: changes.redirect_uris.filter(|v| v != &oidc.redirect_uris),
            response_types: changes.response_types.filter(|v| v != &oidc.response_types),
            grant_types: changes.grant_types.filter(|v| v != &oidc.grant_types),
            app_type: changes.app_type.filter(|v| Some(*v) != oidc.app_type),
            auth_method: changes.auth_method.filter(|v| Some(*v) != oidc.auth_method),
            post_logout_redirect_uris: changes
                .post_logout_redirect_uris
                .filter(|v| v != &oidc.post_logout_redirect_uris),
            dev_mode: changes.dev_mode.filter(|v| *v != oidc.dev_mode),
        };
        let no_change = payload.redirect_uris.is_none()
            && payload.response_types.is_none()
            && payload.grant_types.is_none()
            && payload.app_type.is_none()
            && payload.auth_method.is_none()
            && payload.post_logout_redirect_uris.is_none()
            && payload.dev_mode.is_none();
        if no_change {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            project_events::APPLICATION_OIDC_CONFIG_CHANGED,
            ctx.creator(),
            &payload,
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Rotate an OIDC app secret; the new plaintext is returned once.
    pub async fn regenerate_oidc_secret(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        app_id: &AppId,
    ) -> Result<(String, ObjectDetails)> {
        let mut model = self.existing_app_model(ctx, project_id, app_id).await?;
        self.check_permission(ctx, PERM_APP_WRITE, &model.base().resource_owner)?;
        let Some(oidc) = &model.oidc else {
            return Err(Error::precondition_failed("COMMAND-ap06", "application is not an oidc app"));
        };
        if !oidc.auth_method.is_some_and(OidcAuthMethod::needs_secret) {
            return Err(Error::precondition_failed(
                "COMMAND-ap07",
                "application auth method has no secret",
            ));
        }

        let secret = Uuid::new_v4().to_string();
        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            project_events::APPLICATION_OIDC_SECRET_CHANGED,
            ctx.creator(),
            &project_events::OidcSecretChanged {
                app_id: app_id.clone(),
                client_secret_digest: sha256_hex(secret.as_bytes()),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok((secret, model.details()))
    }

    pub async fn deactivate_application(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        app_id: &AppId,
    ) -> Result<ObjectDetails> {
        self.change_app_state(
            ctx,
            project_id,
            app_id,
            project_events::APPLICATION_DEACTIVATED,
            AppState::Inactive,
            AppState::Active,
            "COMMAND-ap08",
        )
        .await
    }

    pub async fn reactivate_application(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        app_id: &AppId,
    ) -> Result<ObjectDetails> {
        self.change_app_state(
            ctx,
            project_id,
            app_id,
            project_events::APPLICATION_REACTIVATED,
            AppState::Active,
            AppState::Inactive,
            "COMMAND-ap09",
        )
        .await
    }

    pub async fn remove_application(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        app_id: &AppId,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_app_model(ctx, project_id, app_id).await?;
        self.check_permission(ctx, PERM_APP_WRITE, &model.base().resource_owner)?;

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            project_events::APPLICATION_REMOVED,
            ctx.creator(),
            &project_events::ApplicationStateChanged {
                app_id: app_id.clone(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    async fn change_app_state(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        app_id: &AppId,
        event_type: idforge_events::EventType,
        target: AppState,
        required: AppState,
        error_id: &'static str,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_app_model(ctx, project_id, app_id).await?;
        self.check_permission(ctx, PERM_APP_WRITE, &model.base().resource_owner)?;
        if model.state == target {
            return Ok(model.details());
        }
        if model.state != required {
            return Err(Error::precondition_failed(
                error_id,
                format!("application state {:?} does not allow this transition", model.state),
            ));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            event_type,
            ctx.creator(),
            &project_events::ApplicationStateChanged {
                app_id: app_id.clone(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub(crate) async fn existing_app_model(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        app_id: &AppId,
    ) -> Result<AppWriteModel> {
        let mut model = AppWriteModel::new(&ctx.instance_id, project_id, app_id);
        self.load(ctx, &mut model).await?;
        if !model.state.exists() {
            return Err(Error::not_found("COMMAND-ap10", "application not found")
                .with_detail("app_id", app_id.as_str()));
        }
        Ok(model)
    }
}
