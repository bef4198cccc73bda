//! Personal access tokens.
//!
//! The plaintext token is returned exactly once, from the add command; the
//! log only ever sees its SHA-256 digest.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use idforge_core::{Context, Error, ObjectDetails, Result, TokenId, UserId};
use idforge_crypto::{generate_token, sha256_hex};
use idforge_domain::events::user as user_events;
use idforge_events::{AggregateBatch, Push, StoredEvent, WriteModel};
use idforge_eventstore::{append_and_reduce, EventStore};

use crate::permission::PERM_USER_CREDENTIAL_WRITE;
use crate::Commands;

#[derive(Debug, Clone)]
pub struct AddPersonalAccessToken {
    pub user_id: UserId,
    pub expiration: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedPersonalAccessToken {
    pub token_id: TokenId,
    /// Plaintext; visible only here.
    pub token: String,
    pub details: ObjectDetails,
}

/// Tracks the active tokens of one user. Sub-entity fold on the user
/// aggregate, filtered by token id where it matters.
#[derive(Debug, Default)]
struct PatState {
    active: Vec<TokenId>,
}

impl PatState {
    fn fold(events: &[StoredEvent]) -> Result<Self> {
        let mut state = Self::default();
        for event in events {
            if event.is(&user_events::USER_PAT_ADDED) {
                let payload: user_events::PersonalAccessTokenAdded = event.payload_as()?;
                state.active.push(payload.token_id);
            } else if event.is(&user_events::USER_PAT_REMOVED) {
                let payload: user_events::PersonalAccessTokenRemoved = event.payload_as()?;
                state.active.retain(|t| t != &payload.token_id);
            }
        }
        Ok(state)
    }
}

impl Commands {
    pub async fn add_personal_access_token(
        &self,
        ctx: &Context,
        request: AddPersonalAccessToken,
    ) -> Result<CreatedPersonalAccessToken> {
        if let Some(expiration) = request.expiration {
            if expiration <= ctx.timestamp {
                return Err(Error::invalid_argument(
                    "COMMAND-pt01",
                    "token expiration must be in the future",
                ));
            }
        }

        let mut model = self.existing_user_model(ctx, &request.user_id).await?;
        self.check_permission(ctx, PERM_USER_CREDENTIAL_WRITE, &model.base().resource_owner)?;

        let token_id = TokenId::generate();
        let token = generate_token();
        let payload = user_events::PersonalAccessTokenAdded {
            token_id: token_id.clone(),
            token_digest: sha256_hex(token.as_bytes()),
            expiration: request.expiration,
            scopes: request.scopes,
        };

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_PAT_ADDED,
            ctx.creator(),
            &payload,
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(CreatedPersonalAccessToken {
            token_id,
            token,
            details: model.details(),
        })
    }

    pub async fn remove_personal_access_token(
        &self,
        ctx: &Context,
        user_id: &UserId,
        token_id: &TokenId,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_CREDENTIAL_WRITE, &model.base().resource_owner)?;

        let events = self.store().filter(&model.query()).await?;
        let pats = PatState::fold(&events)?;
        if !pats.active.contains(token_id) {
            return Err(Error::not_found("COMMAND-pt02", "personal access token not found")
                .with_detail("token_id", token_id.as_str()));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_PAT_REMOVED,
            ctx.creator(),
            &user_events::PersonalAccessTokenRemoved {
                token_id: token_id.clone(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Verify a presented token against a user's stored digests. Revoked
    /// and expired tokens fail.
    pub async fn verify_personal_access_token(
        &self,
        ctx: &Context,
        user_id: &UserId,
        token: &str,
    ) -> Result<TokenId> {
        let model = self.existing_user_model(ctx, user_id).await?;
        let events = self.store().filter(&model.query()).await?;
        let digest = sha256_hex(token.as_bytes());

        let mut candidate: Option<(TokenId, Option<DateTime<Utc>>)> = None;
        for event in &events {
            if event.is(&user_events::USER_PAT_ADDED) {
                let payload: user_events::PersonalAccessTokenAdded = event.payload_as()?;
                if payload.token_digest == digest {
                    candidate = Some((payload.token_id, payload.expiration));
                }
            } else if event.is(&user_events::USER_PAT_REMOVED) {
                let payload: user_events::PersonalAccessTokenRemoved = event.payload_as()?;
                if let Some((id, _)) = &candidate {
                    if id == &payload.token_id {
                        candidate = None;
                    }
                }
            }
        }

        match candidate {
            Some((id, expiration)) => {
                if let Some(expiration) = expiration {
                    if ctx.timestamp > expiration {
                        return Err(Error::unauthenticated("COMMAND-pt03", "token is expired"));
                    }
                }
                Ok(id)
            }
            None => Err(Error::unauthenticated("COMMAND-pt04", "token is not valid")),
        }
    }

    /// The digests visible after creation: never the plaintext.
    pub async fn list_personal_access_token_digests(
        &self,
        ctx: &Context,
        user_id: &UserId,
    ) -> Result<Vec<PatDigest>> {
        let model = self.existing_user_model(ctx, user_id).await?;
        let events = self.store().filter(&model.query()).await?;
        let mut digests: Vec<PatDigest> = Vec::new();
        for event in &events {
            if event.is(&user_events::USER_PAT_ADDED) {
                let payload: user_events::PersonalAccessTokenAdded = event.payload_as()?;
                digests.push(PatDigest {
                    token_id: payload.token_id,
                    token_digest: payload.token_digest,
                    expiration: payload.expiration,
                });
            } else if event.is(&user_events::USER_PAT_REMOVED) {
                let payload: user_events::PersonalAccessTokenRemoved = event.payload_as()?;
                digests.retain(|d| d.token_id != payload.token_id);
            }
        }
        Ok(digests)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PatDigest {
    pub token_id: TokenId,
    pub token_digest: String,
    pub expiration: Option<DateTime<Utc>>,
}
