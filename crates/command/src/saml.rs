//! SAML request and session state machines.
//!
//! A request progresses `added -> {succeeded | failed}`; linking a session
//! is only possible while `added`. Terminal transitions are idempotent.
//! Sessions carry an absolute expiry and are terminated explicitly or by
//! time.

use chrono::{DateTime, Duration, Utc};

use idforge_core::{
    Context, Error, InstanceId, ObjectDetails, OrgId, RequestId, Result, SessionId, UserId,
};
use idforge_domain::events::saml as saml_events;
use idforge_domain::events::{AGGREGATE_SAML_REQUEST, AGGREGATE_SAML_SESSION};
use idforge_domain::SamlBinding;
use idforge_events::{
    Aggregate, AggregateBatch, ExpectedVersion, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::permission::PERM_SESSION_WRITE;
use crate::{push_details, Commands};

/// Default absolute session lifetime.
pub const SAML_SESSION_LIFETIME_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamlRequestState {
    #[default]
    Unspecified,
    Added,
    Succeeded,
    Failed,
}

#[derive(Debug, Default)]
pub struct SamlRequestWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub state: SamlRequestState,
    pub session_id: Option<SessionId>,
    pub user_id: Option<UserId>,
}

impl SamlRequestWriteModel {
    pub fn new(instance_id: &InstanceId, request_id: &RequestId) -> Self {
        Self {
            base: WriteModelBase::new(request_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            AGGREGATE_SAML_REQUEST,
            self.base.aggregate_id.clone(),
            &OrgId::new(self.base.resource_owner.clone()),
            &self.instance_id,
        )
    }
}

impl WriteModel for SamlRequestWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_SAML_REQUEST)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&saml_events::SAML_REQUEST_ADDED) {
            self.state = SamlRequestState::Added;
        } else if event.is(&saml_events::SAML_REQUEST_SESSION_LINKED) {
            let payload: saml_events::SamlRequestSessionLinked = event.payload_as()?;
            self.session_id = Some(payload.session_id);
            self.user_id = Some(payload.user_id);
        } else if event.is(&saml_events::SAML_REQUEST_SUCCEEDED) {
            self.state = SamlRequestState::Succeeded;
        } else if event.is(&saml_events::SAML_REQUEST_FAILED) {
            self.state = SamlRequestState::Failed;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SamlSessionWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub exists: bool,
    pub terminated: bool,
    pub user_id: Option<UserId>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SamlSessionWriteModel {
    pub fn new(instance_id: &InstanceId, session_id: &SessionId) -> Self {
        Self {
            base: WriteModelBase::new(session_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            AGGREGATE_SAML_SESSION,
            self.base.aggregate_id.clone(),
            &OrgId::new(self.base.resource_owner.clone()),
            &self.instance_id,
        )
    }

    /// Active means created, not terminated, and not past its expiry.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.exists && !self.terminated && self.expires_at.is_some_and(|e| now <= e)
    }
}

impl WriteModel for SamlSessionWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_SAML_SESSION)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&saml_events::SAML_SESSION_ADDED) {
            let payload: saml_events::SamlSessionAdded = event.payload_as()?;
            self.exists = true;
            self.user_id = Some(payload.user_id);
            self.expires_at = Some(payload.expires_at);
        } else if event.is(&saml_events::SAML_SESSION_TERMINATED) {
            self.terminated = true;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AddSamlRequest {
    pub request_id: Option<RequestId>,
    pub binding: SamlBinding,
    pub destination: String,
    pub acs_url: String,
    /// SP-issued request id (InResponseTo).
    pub sp_request_id: String,
    pub issuer: String,
    pub relay_state: String,
    pub login_hint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedSamlRequest {
    pub request_id: RequestId,
    pub details: ObjectDetails,
}

#[derive(Debug, Clone)]
pub struct LinkedSamlSession {
    pub session_id: SessionId,
    pub details: ObjectDetails,
}

impl Commands {
    pub async fn add_saml_request(
        &self,
        ctx: &Context,
        request: AddSamlRequest,
    ) -> Result<CreatedSamlRequest> {
        if request.acs_url.is_empty() || request.issuer.is_empty() || request.sp_request_id.is_empty()
        {
            return Err(Error::invalid_argument(
                "COMMAND-sr01",
                "acs url, issuer and request id are required",
            ));
        }
        idforge_domain::validate::parse_http_url(&request.acs_url)?;
        self.check_permission(ctx, PERM_SESSION_WRITE, ctx.org_id.as_str())?;

        let request_id = request.request_id.unwrap_or_else(RequestId::generate);
        let mut model = SamlRequestWriteModel::new(&ctx.instance_id, &request_id);
        self.load(ctx, &mut model).await?;
        if model.state != SamlRequestState::Unspecified {
            return Err(Error::already_exists("COMMAND-sr02", "saml request already exists"));
        }

        let aggregate = Aggregate::new(
            AGGREGATE_SAML_REQUEST,
            request_id.as_str(),
            &ctx.org_id,
            &ctx.instance_id,
        );
        let batch = AggregateBatch::new(aggregate, ExpectedVersion::NoStream).event(
            saml_events::SAML_REQUEST_ADDED,
            ctx.creator(),
            &saml_events::SamlRequestAdded {
                binding: request.binding,
                destination: request.destination,
                acs_url: request.acs_url,
                request_id: request.sp_request_id,
                issuer: request.issuer,
                relay_state: request.relay_state,
                login_hint: request.login_hint,
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(CreatedSamlRequest {
            request_id,
            details: push_details(&pushed),
        })
    }

    /// Bind an authenticated session to a pending request and create the
    /// SAML session, atomically. Only possible while the request is
    /// `added`.
    pub async fn link_session_to_saml_request(
        &self,
        ctx: &Context,
        request_id: &RequestId,
        user_id: &UserId,
    ) -> Result<LinkedSamlSession> {
        self.check_permission(ctx, PERM_SESSION_WRITE, ctx.org_id.as_str())?;
        let mut model = self.existing_saml_request(ctx, request_id).await?;
        if model.state != SamlRequestState::Added {
            return Err(Error::precondition_failed(
                "COMMAND-sr03",
                "saml request is already terminal",
            ));
        }
        self.existing_user_model(ctx, user_id).await?;

        let session_id = SessionId::generate();
        let request_batch = AggregateBatch::new(model.aggregate(), model.base().expected_version())
            .event(
                saml_events::SAML_REQUEST_SESSION_LINKED,
                ctx.creator(),
                &saml_events::SamlRequestSessionLinked {
                    session_id: session_id.clone(),
                    user_id: user_id.clone(),
                    authenticated_at: ctx.timestamp,
                },
            )?;

        let session_aggregate = Aggregate::new(
            AGGREGATE_SAML_SESSION,
            session_id.as_str(),
            &ctx.org_id,
            &ctx.instance_id,
        );
        let session_batch = AggregateBatch::new(session_aggregate, ExpectedVersion::NoStream).event(
            saml_events::SAML_SESSION_ADDED,
            ctx.creator(),
            &saml_events::SamlSessionAdded {
                saml_request_id: request_id.clone(),
                user_id: user_id.clone(),
                expires_at: ctx.timestamp + Duration::minutes(SAML_SESSION_LIFETIME_MINUTES),
            },
        )?;

        let pushed = self
            .push(ctx, Push::single(request_batch).with_batch(session_batch))
            .await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(LinkedSamlSession {
            session_id,
            details: model.details(),
        })
    }

    /// Mark a linked request as answered. Repeating a terminal transition
    /// returns current details unchanged.
    pub async fn succeed_saml_request(
        &self,
        ctx: &Context,
        request_id: &RequestId,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_SESSION_WRITE, ctx.org_id.as_str())?;
        let mut model = self.existing_saml_request(ctx, request_id).await?;
        match model.state {
            SamlRequestState::Succeeded => return Ok(model.details()),
            SamlRequestState::Failed => {
                return Err(Error::precondition_failed(
                    "COMMAND-sr04",
                    "saml request already failed",
                ));
            }
            SamlRequestState::Added if model.session_id.is_none() => {
                return Err(Error::precondition_failed(
                    "COMMAND-sr05",
                    "saml request has no linked session",
                ));
            }
            _ => {}
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            saml_events::SAML_REQUEST_SUCCEEDED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn fail_saml_request(
        &self,
        ctx: &Context,
        request_id: &RequestId,
        reason: &str,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_SESSION_WRITE, ctx.org_id.as_str())?;
        let mut model = self.existing_saml_request(ctx, request_id).await?;
        match model.state {
            SamlRequestState::Failed => return Ok(model.details()),
            SamlRequestState::Succeeded => {
                return Err(Error::precondition_failed(
                    "COMMAND-sr06",
                    "saml request already succeeded",
                ));
            }
            _ => {}
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            saml_events::SAML_REQUEST_FAILED,
            ctx.creator(),
            &saml_events::SamlRequestFailed {
                reason: reason.to_string(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Terminate a session. Expired sessions terminate idempotently.
    pub async fn terminate_saml_session(
        &self,
        ctx: &Context,
        session_id: &SessionId,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_SESSION_WRITE, ctx.org_id.as_str())?;
        let mut model = SamlSessionWriteModel::new(&ctx.instance_id, session_id);
        self.load(ctx, &mut model).await?;
        if !model.exists {
            return Err(Error::not_found("COMMAND-sr07", "saml session not found"));
        }
        if model.terminated {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            saml_events::SAML_SESSION_TERMINATED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    async fn existing_saml_request(
        &self,
        ctx: &Context,
        request_id: &RequestId,
    ) -> Result<SamlRequestWriteModel> {
        let mut model = SamlRequestWriteModel::new(&ctx.instance_id, request_id);
        self.load(ctx, &mut model).await?;
        if model.state == SamlRequestState::Unspecified {
            return Err(Error::not_found("COMMAND-sr08", "saml request not found"));
        }
        Ok(model)
    }
}
