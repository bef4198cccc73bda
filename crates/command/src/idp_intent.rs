//! IDP intents: the server-side state of one in-flight federated login.
//!
//! An intent is started before the browser is redirected to the provider,
//! and consumed exactly once by the callback. Single use falls out of the
//! aggregate's optimistic concurrency: the success event expects the intent
//! at the started version, so the second of two racing callbacks conflicts.

use chrono::Duration;

use idforge_core::{
    Context, Error, IdpId, InstanceId, IntentId, ObjectDetails, OrgId, RequestId, Result, UserId,
};
use idforge_crypto::{generate_token, sha256_hex};
use idforge_domain::events::idp_intent as intent_events;
use idforge_domain::events::user as user_events;
use idforge_domain::events::{AGGREGATE_IDP_INTENT, AGGREGATE_USER};
use idforge_domain::{IdpConfig, IdpType, Profile};
use idforge_events::{
    Aggregate, AggregateBatch, ExpectedVersion, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_idp::{
    generate_nonce, generate_state, ExternalUser, IdpCallback, PkcePair, Provider, ProviderFactory,
};

use crate::org_users::OrgUsersWriteModel;
use crate::permission::PERM_SESSION_WRITE;
use crate::{push_details, Commands};

/// Intents expire ten minutes after start.
pub const INTENT_LIFETIME_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntentState {
    #[default]
    Unspecified,
    Started,
    Succeeded,
    Failed,
}

#[derive(Debug, Default)]
pub struct IntentWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub state: IntentState,
    pub idp_id: IdpId,
    pub idp_type: Option<IdpType>,
    pub state_param: String,
    pub redirect_uri: String,
    pub failure_uri: String,
    pub auth_request_id: Option<RequestId>,
    pub code_verifier: Option<String>,
    pub nonce: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub user_id: Option<UserId>,
    pub intent_token_digest: Option<String>,
}

impl IntentWriteModel {
    pub fn new(instance_id: &InstanceId, intent_id: &IntentId) -> Self {
        Self {
            base: WriteModelBase::new(intent_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            AGGREGATE_IDP_INTENT,
            self.base.aggregate_id.clone(),
            &OrgId::new(self.base.resource_owner.clone()),
            &self.instance_id,
        )
    }
}

impl WriteModel for IntentWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_IDP_INTENT)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&intent_events::INTENT_STARTED) {
            let payload: intent_events::IntentStarted = event.payload_as()?;
            self.state = IntentState::Started;
            self.idp_id = payload.idp_id;
            self.idp_type = Some(payload.idp_type);
            self.state_param = payload.state;
            self.redirect_uri = payload.redirect_uri;
            self.failure_uri = payload.failure_uri;
            self.auth_request_id = payload.auth_request_id;
            self.code_verifier = payload.code_verifier;
            self.nonce = payload.nonce;
            self.expires_at = Some(payload.expires_at);
        } else if event.is(&intent_events::INTENT_SUCCEEDED) {
            let payload: intent_events::IntentSucceeded = event.payload_as()?;
            self.state = IntentState::Succeeded;
            self.user_id = Some(payload.user_id);
            self.intent_token_digest = Some(payload.intent_token_digest);
        } else if event.is(&intent_events::INTENT_FAILED) {
            self.state = IntentState::Failed;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StartIdpIntent {
    pub idp_id: IdpId,
    pub redirect_uri: String,
    pub failure_uri: String,
    pub auth_request_id: Option<RequestId>,
}

#[derive(Debug, Clone)]
pub struct StartedIntent {
    pub intent_id: IntentId,
    /// CSRF state to carry through the provider round trip.
    pub state: String,
    pub code_verifier: Option<String>,
    pub nonce: Option<String>,
    pub details: ObjectDetails,
}

#[derive(Debug, Clone)]
pub struct IntentCallbackOutcome {
    pub intent_id: IntentId,
    pub user_id: UserId,
    /// One-time token proving possession of the succeeded intent; only its
    /// digest is persisted.
    pub intent_token: String,
    pub idp_user: ExternalUser,
    pub details: ObjectDetails,
}

impl Commands {
    /// Start a federated login against a configured provider.
    pub async fn start_idp_intent(&self, ctx: &Context, request: StartIdpIntent) -> Result<StartedIntent> {
        idforge_domain::validate::parse_http_url(&request.redirect_uri)?;
        if !request.failure_uri.is_empty() {
            idforge_domain::validate::parse_http_url(&request.failure_uri)?;
        }
        self.check_permission(ctx, PERM_SESSION_WRITE, ctx.org_id.as_str())?;

        let idp = self.existing_idp_model(ctx, &request.idp_id).await?;
        let idp_type = idp
            .config
            .as_ref()
            .map(IdpConfig::idp_type)
            .ok_or_else(|| Error::internal("COMMAND-it01", "idp has no configuration"))?;

        let state = generate_state();
        let pkce = matches!(idp_type, IdpType::Oidc | IdpType::OAuth).then(PkcePair::generate);
        let nonce = matches!(idp_type, IdpType::Oidc | IdpType::Apple).then(generate_nonce);

        let intent_id = IntentId::generate();
        let aggregate = Aggregate::new(
            AGGREGATE_IDP_INTENT,
            intent_id.as_str(),
            &ctx.org_id,
            &ctx.instance_id,
        );
        let payload = intent_events::IntentStarted {
            idp_id: request.idp_id,
            idp_type,
            state: state.clone(),
            redirect_uri: request.redirect_uri,
            failure_uri: request.failure_uri,
            auth_request_id: request.auth_request_id,
            code_verifier: pkce.as_ref().map(|p| p.verifier.clone()),
            nonce: nonce.clone(),
            expires_at: ctx.timestamp + Duration::minutes(INTENT_LIFETIME_MINUTES),
        };
        let batch = AggregateBatch::new(aggregate, ExpectedVersion::NoStream).event(
            intent_events::INTENT_STARTED,
            ctx.creator(),
            &payload,
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(StartedIntent {
            intent_id,
            state,
            code_verifier: pkce.map(|p| p.verifier),
            nonce,
            details: push_details(&pushed),
        })
    }

    /// Consume a provider callback for an OAuth/OIDC intent.
    ///
    /// The intent is found by its CSRF state through the idp_intents
    /// projection, then loaded authoritatively from the log.
    pub async fn handle_oauth_callback(
        &self,
        ctx: &Context,
        callback: IdpCallback,
        existing_user_id: Option<UserId>,
    ) -> Result<IntentCallbackOutcome> {
        if callback.state.is_empty() {
            return Err(Error::invalid_argument("COMMAND-it02", "callback state is required"));
        }
        self.check_permission(ctx, PERM_SESSION_WRITE, ctx.org_id.as_str())?;

        let view = self
            .queries()
            .intent_by_state(&ctx.instance_id, &callback.state)
            .await?
            .ok_or_else(|| Error::not_found("COMMAND-it03", "no intent for callback state"))?;
        let intent_id = IntentId::new(view.id.clone());

        let mut intent = IntentWriteModel::new(&ctx.instance_id, &intent_id);
        self.load(ctx, &mut intent).await?;
        if intent.state == IntentState::Unspecified {
            return Err(Error::not_found("COMMAND-it04", "intent not found"));
        }
        if intent.state != IntentState::Started {
            return Err(Error::precondition_failed(
                "COMMAND-it05",
                "intent was already consumed",
            ));
        }
        if let Some(expires_at) = intent.expires_at {
            if ctx.timestamp > expires_at {
                return Err(Error::precondition_failed("COMMAND-it06", "intent is expired"));
            }
        }

        // Provider-reported errors fail the intent permanently.
        if let Some(error) = &callback.error {
            let reason = callback
                .error_description
                .clone()
                .unwrap_or_else(|| error.clone());
            self.fail_intent(ctx, &mut intent, reason.clone()).await?;
            return Err(Error::unauthenticated(
                "COMMAND-it07",
                format!("provider returned error: {reason}"),
            ));
        }
        let Some(code) = &callback.code else {
            return Err(Error::invalid_argument("COMMAND-it08", "callback code is required"));
        };

        let idp = self.existing_idp_model(ctx, &intent.idp_id).await?;
        let config = idp
            .config
            .clone()
            .ok_or_else(|| Error::internal("COMMAND-it09", "idp has no configuration"))?;
        let provider = self.providers().provider(ctx, &intent.idp_id, &config).await?;

        let tokens = provider
            .exchange_code(ctx, code, intent.code_verifier.as_deref(), &intent.redirect_uri)
            .await?;
        let idp_user = provider
            .fetch_user(ctx, &tokens, intent.nonce.as_deref())
            .await?;
        if idp_user.external_user_id.is_empty() {
            return Err(Error::unauthenticated(
                "COMMAND-it10",
                "provider returned no user identity",
            ));
        }

        let options = idp.options;
        let (user_id, user_batch, guard) = match existing_user_id {
            Some(user_id) => {
                if !options.is_linking_allowed {
                    return Err(Error::precondition_failed(
                        "COMMAND-it11",
                        "linking is not allowed for this idp",
                    ));
                }
                let batch = self
                    .link_batch(ctx, &user_id, &intent.idp_id, &idp_user)
                    .await?;
                (user_id, batch, None)
            }
            None => {
                if !options.is_creation_allowed {
                    return Err(Error::precondition_failed(
                        "COMMAND-it12",
                        "user creation is not allowed for this idp",
                    ));
                }
                let (user_id, batch, guard) =
                    self.provision_batch(ctx, &intent.idp_id, &idp_user).await?;
                (user_id, batch, Some(guard))
            }
        };

        let intent_token = generate_token();
        let intent_batch = AggregateBatch::new(intent.aggregate(), intent.base().expected_version())
            .event(
                intent_events::INTENT_SUCCEEDED,
                ctx.creator(),
                &intent_events::IntentSucceeded {
                    user_id: user_id.clone(),
                    idp_user: serde_json::to_value(&idp_user).map_err(|e| {
                        Error::internal("COMMAND-it13", format!("claims serialization failed: {e}"))
                    })?,
                    external_user_id: idp_user.external_user_id.clone(),
                    intent_token_digest: sha256_hex(intent_token.as_bytes()),
                },
            )?;

        let mut push = Push::single(user_batch).with_batch(intent_batch);
        if let Some(guard) = guard {
            push = push.with_guard(guard);
        }
        let pushed = self.push(ctx, push).await?;

        Ok(IntentCallbackOutcome {
            intent_id,
            user_id,
            intent_token,
            idp_user,
            details: push_details(&pushed),
        })
    }

    /// Events linking an external identity to an existing user.
    async fn link_batch(
        &self,
        ctx: &Context,
        user_id: &UserId,
        idp_id: &IdpId,
        idp_user: &ExternalUser,
    ) -> Result<AggregateBatch> {
        let user = self.existing_user_model(ctx, user_id).await?;
        let creator = ctx.creator();
        let mut batch = AggregateBatch::new(user.aggregate(), user.base().expected_version());
        if !user.has_link(idp_id, &idp_user.external_user_id) {
            batch = batch.event(
                user_events::USER_IDP_LINK_ADDED,
                creator.clone(),
                &user_events::IdpLinkAdded {
                    idp_config_id: idp_id.clone(),
                    external_user_id: idp_user.external_user_id.clone(),
                    display_name: idp_user
                        .display_name
                        .clone()
                        .unwrap_or_else(|| idp_user.external_user_id.clone()),
                },
            )?;
        }
        batch = batch.event(
            user_events::USER_IDP_LOGIN_CHECKED,
            creator,
            &user_events::IdpLoginChecked {
                idp_config_id: idp_id.clone(),
            },
        )?;
        Ok(batch)
    }

    /// Events provisioning a fresh user from external claims, plus the
    /// username guard.
    async fn provision_batch(
        &self,
        ctx: &Context,
        idp_id: &IdpId,
        idp_user: &ExternalUser,
    ) -> Result<(UserId, AggregateBatch, idforge_events::PositionGuard)> {
        let Some(email) = idp_user.email.clone() else {
            return Err(Error::precondition_failed(
                "COMMAND-it14",
                "provider supplied no email; cannot provision a user",
            ));
        };

        let mut org_users = OrgUsersWriteModel::new(&ctx.instance_id, &ctx.org_id);
        self.load(ctx, &mut org_users).await?;

        // Username: claim, then email local part, then a generated name.
        let fallback = format!("user_{}", &idforge_core::id::generate()[..8]);
        let username = [idp_user.preferred_username(), Some(fallback)]
            .into_iter()
            .flatten()
            .find(|candidate| !org_users.is_taken(candidate))
            .ok_or_else(|| {
                Error::already_exists("COMMAND-it15", "no available username for provisioning")
            })?;

        let user_id = UserId::generate();
        let profile = Profile {
            first_name: idp_user.first_name.clone().unwrap_or_else(|| username.clone()),
            last_name: idp_user.last_name.clone().unwrap_or_else(|| username.clone()),
            nick_name: String::new(),
            display_name: idp_user.display_name.clone().unwrap_or_default(),
            preferred_language: idp_user.locale.clone().unwrap_or_default(),
            gender: Default::default(),
        };

        let aggregate = Aggregate::new(AGGREGATE_USER, user_id.as_str(), &ctx.org_id, &ctx.instance_id);
        let creator = ctx.creator();
        let batch = AggregateBatch::new(aggregate, ExpectedVersion::NoStream)
            .event(
                user_events::USER_HUMAN_ADDED,
                creator.clone(),
                &user_events::HumanAdded {
                    username,
                    profile,
                    email,
                    email_verified: idp_user.email_verified,
                    phone: None,
                    phone_verified: false,
                },
            )?
            .event(
                user_events::USER_IDP_LINK_ADDED,
                creator.clone(),
                &user_events::IdpLinkAdded {
                    idp_config_id: idp_id.clone(),
                    external_user_id: idp_user.external_user_id.clone(),
                    display_name: idp_user
                        .display_name
                        .clone()
                        .unwrap_or_else(|| idp_user.external_user_id.clone()),
                },
            )?
            .event(
                user_events::USER_IDP_LOGIN_CHECKED,
                creator,
                &user_events::IdpLoginChecked {
                    idp_config_id: idp_id.clone(),
                },
            )?;
        Ok((user_id, batch, org_users.guard()))
    }

    /// Fail an intent explicitly (provider error, operator action).
    pub async fn fail_idp_intent(
        &self,
        ctx: &Context,
        intent_id: &IntentId,
        reason: String,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_SESSION_WRITE, ctx.org_id.as_str())?;
        let mut intent = IntentWriteModel::new(&ctx.instance_id, intent_id);
        self.load(ctx, &mut intent).await?;
        if intent.state == IntentState::Unspecified {
            return Err(Error::not_found("COMMAND-it16", "intent not found"));
        }
        if intent.state != IntentState::Started {
            // Terminal transitions are idempotent.
            return Ok(intent.details());
        }
        self.fail_intent(ctx, &mut intent, reason).await?;
        Ok(intent.details())
    }

    async fn fail_intent(
        &self,
        ctx: &Context,
        intent: &mut IntentWriteModel,
        reason: String,
    ) -> Result<()> {
        let batch = AggregateBatch::new(intent.aggregate(), intent.base().expected_version())
            .event(
                intent_events::INTENT_FAILED,
                ctx.creator(),
                &intent_events::IntentFailed { reason },
            )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        idforge_eventstore::append_and_reduce(intent, &pushed)?;
        Ok(())
    }

    /// Verify a one-time intent token against a succeeded intent.
    pub async fn verify_intent_token(
        &self,
        ctx: &Context,
        intent_id: &IntentId,
        token: &str,
    ) -> Result<UserId> {
        let mut intent = IntentWriteModel::new(&ctx.instance_id, intent_id);
        self.load(ctx, &mut intent).await?;
        if intent.state != IntentState::Succeeded {
            return Err(Error::precondition_failed("COMMAND-it17", "intent has not succeeded"));
        }
        let digest = sha256_hex(token.as_bytes());
        if intent.intent_token_digest.as_deref() != Some(digest.as_str()) {
            return Err(Error::unauthenticated("COMMAND-it18", "intent token is not valid"));
        }
        intent
            .user_id
            .clone()
            .ok_or_else(|| Error::internal("COMMAND-it19", "succeeded intent has no user"))
    }
}
