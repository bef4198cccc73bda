//! Pushed authorization requests (RFC 9126).
//!
//! Authorization parameters are stored under a freshly generated
//! `request_uri`; the URI lives for 90 seconds and may be consumed at most
//! once. Single use falls out of optimistic concurrency on the consume
//! event.

use chrono::{DateTime, Duration, Utc};

use idforge_core::{Context, Error, InstanceId, ObjectDetails, OrgId, RequestId, Result};
use idforge_crypto::generate_token;
use idforge_domain::events::auth_request as par_events;
use idforge_domain::events::AGGREGATE_AUTH_REQUEST;
use idforge_events::{
    Aggregate, AggregateBatch, ExpectedVersion, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::permission::PERM_SESSION_WRITE;
use crate::{push_details, Commands};

/// PAR lifetime per RFC 9126 recommendation.
pub const PAR_LIFETIME_SECONDS: i64 = 90;

pub const REQUEST_URI_PREFIX: &str = "urn:ietf:params:oauth:request_uri:";

#[derive(Debug, Default)]
pub struct AuthRequestWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub exists: bool,
    pub consumed: bool,
    pub request_uri: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthRequestWriteModel {
    pub fn new(instance_id: &InstanceId, request_id: &RequestId) -> Self {
        Self {
            base: WriteModelBase::new(request_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            AGGREGATE_AUTH_REQUEST,
            self.base.aggregate_id.clone(),
            &OrgId::new(self.base.resource_owner.clone()),
            &self.instance_id,
        )
    }
}

impl WriteModel for AuthRequestWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_AUTH_REQUEST)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&par_events::AUTH_REQUEST_ADDED) {
            let payload: par_events::AuthRequestAdded = event.payload_as()?;
            self.exists = true;
            self.request_uri = payload.request_uri;
            self.client_id = payload.client_id;
            self.redirect_uri = payload.redirect_uri;
            self.expires_at = Some(payload.expires_at);
        } else if event.is(&par_events::AUTH_REQUEST_CONSUMED) {
            self.consumed = true;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePushedAuthRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub response_type: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedPushedAuthRequest {
    pub request_id: RequestId,
    pub request_uri: String,
    pub expires_in: i64,
    pub details: ObjectDetails,
}

impl Commands {
    pub async fn create_pushed_auth_request(
        &self,
        ctx: &Context,
        request: CreatePushedAuthRequest,
    ) -> Result<CreatedPushedAuthRequest> {
        if request.client_id.is_empty() {
            return Err(Error::invalid_argument("COMMAND-pr01", "client_id is required"));
        }
        idforge_domain::validate::parse_http_url(&request.redirect_uri)?;
        if let Some(method) = &request.code_challenge_method {
            if method != "S256" {
                return Err(Error::invalid_argument(
                    "COMMAND-pr02",
                    "only the S256 code challenge method is supported",
                ));
            }
        }
        self.check_permission(ctx, PERM_SESSION_WRITE, ctx.org_id.as_str())?;

        let request_id = RequestId::generate();
        let request_uri = format!("{REQUEST_URI_PREFIX}{}", generate_token());
        let aggregate = Aggregate::new(
            AGGREGATE_AUTH_REQUEST,
            request_id.as_str(),
            &ctx.org_id,
            &ctx.instance_id,
        );
        let batch = AggregateBatch::new(aggregate, ExpectedVersion::NoStream).event(
            par_events::AUTH_REQUEST_ADDED,
            ctx.creator(),
            &par_events::AuthRequestAdded {
                request_uri: request_uri.clone(),
                client_id: request.client_id,
                redirect_uri: request.redirect_uri,
                scope: request.scope,
                response_type: request.response_type,
                state: request.state,
                code_challenge: request.code_challenge,
                code_challenge_method: request.code_challenge_method,
                expires_at: ctx.timestamp + Duration::seconds(PAR_LIFETIME_SECONDS),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(CreatedPushedAuthRequest {
            request_id,
            request_uri,
            expires_in: PAR_LIFETIME_SECONDS,
            details: push_details(&pushed),
        })
    }

    /// Consume a pushed request. At most one consumer wins: the consume
    /// event expects the aggregate at the added version, so a concurrent
    /// consume conflicts.
    pub async fn consume_pushed_auth_request(
        &self,
        ctx: &Context,
        request_id: &RequestId,
        request_uri: &str,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_SESSION_WRITE, ctx.org_id.as_str())?;
        let mut model = AuthRequestWriteModel::new(&ctx.instance_id, request_id);
        self.load(ctx, &mut model).await?;
        if !model.exists {
            return Err(Error::not_found("COMMAND-pr03", "pushed auth request not found"));
        }
        if model.request_uri != request_uri {
            return Err(Error::invalid_argument("COMMAND-pr04", "request_uri does not match"));
        }
        if model.consumed {
            return Err(Error::precondition_failed(
                "COMMAND-pr05",
                "request_uri was already used",
            ));
        }
        if model.expires_at.is_some_and(|e| ctx.timestamp > e) {
            return Err(Error::precondition_failed("COMMAND-pr06", "request_uri is expired"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            par_events::AUTH_REQUEST_CONSUMED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }
}
