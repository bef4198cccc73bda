//! IDP intents projection.
//!
//! This is the projection behind intent-by-state lookups on the callback
//! path. The alternative (answering from nothing) would make every callback
//! fail; lookups here are the supported variant, consistency-checked by the
//! caller against the projection cursor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_core::{IdpId, InstanceId, RequestId, Result, UserId};
use idforge_domain::events::idp_intent as intent_events;
use idforge_domain::IdpType;
use idforge_events::{EventType, StoredEvent};

use crate::runtime::Projection;
use crate::store::ReadStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentViewState {
    Started,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentView {
    pub id: String,
    pub instance_id: InstanceId,
    pub resource_owner: String,
    pub state: IntentViewState,
    pub idp_id: IdpId,
    pub idp_type: IdpType,
    /// CSRF state parameter; the lookup key on the callback path.
    pub state_param: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub failure_uri: String,
    #[serde(default)]
    pub auth_request_id: Option<RequestId>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub external_user_id: Option<String>,
    pub sequence: u64,
    pub changed_at: DateTime<Utc>,
}

pub struct IdpIntentsProjection {
    store: Arc<dyn ReadStore<IntentView>>,
}

impl IdpIntentsProjection {
    pub const NAME: &'static str = "idp_intents";

    pub fn new(store: Arc<dyn ReadStore<IntentView>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Projection for IdpIntentsProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn event_types(&self) -> Vec<EventType> {
        vec![
            intent_events::INTENT_STARTED,
            intent_events::INTENT_SUCCEEDED,
            intent_events::INTENT_FAILED,
        ]
    }

    async fn reduce(&self, event: &StoredEvent) -> Result<()> {
        let instance_id = &event.instance_id;
        let key = event.aggregate_id.as_str();

        if event.is(&intent_events::INTENT_STARTED) {
            let payload: intent_events::IntentStarted = event.payload_as()?;
            let view = IntentView {
                id: event.aggregate_id.clone(),
                instance_id: instance_id.clone(),
                resource_owner: event.resource_owner.clone(),
                state: IntentViewState::Started,
                idp_id: payload.idp_id,
                idp_type: payload.idp_type,
                state_param: payload.state,
                redirect_uri: payload.redirect_uri,
                failure_uri: payload.failure_uri,
                auth_request_id: payload.auth_request_id,
                code_verifier: payload.code_verifier,
                nonce: payload.nonce,
                expires_at: payload.expires_at,
                user_id: None,
                external_user_id: None,
                sequence: event.version,
                changed_at: event.created_at,
            };
            return self.store.upsert(instance_id, key, view).await;
        }

        let Some(mut view) = self.store.get(instance_id, key).await? else {
            return Ok(());
        };
        if event.is(&intent_events::INTENT_SUCCEEDED) {
            let payload: intent_events::IntentSucceeded = event.payload_as()?;
            view.state = IntentViewState::Succeeded;
            view.user_id = Some(payload.user_id);
            view.external_user_id = Some(payload.external_user_id);
            // The verifier is spent with the exchange.
            view.code_verifier = None;
        } else if event.is(&intent_events::INTENT_FAILED) {
            view.state = IntentViewState::Failed;
            view.code_verifier = None;
        }
        view.sequence = event.version;
        view.changed_at = event.created_at;
        self.store.upsert(instance_id, key, view).await
    }
}
