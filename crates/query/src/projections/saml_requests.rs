//! SAML requests projection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_core::{InstanceId, Result, SessionId, UserId};
use idforge_domain::events::saml as saml_events;
use idforge_domain::SamlBinding;
use idforge_events::{EventType, StoredEvent};

use crate::runtime::Projection;
use crate::store::ReadStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamlRequestViewState {
    Added,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlRequestView {
    pub id: String,
    pub instance_id: InstanceId,
    pub state: SamlRequestViewState,
    pub binding: SamlBinding,
    pub destination: String,
    pub acs_url: String,
    pub request_id: String,
    pub issuer: String,
    #[serde(default)]
    pub relay_state: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub sequence: u64,
    pub changed_at: DateTime<Utc>,
}

pub struct SamlRequestsProjection {
    store: Arc<dyn ReadStore<SamlRequestView>>,
}

impl SamlRequestsProjection {
    pub const NAME: &'static str = "saml_requests";

    pub fn new(store: Arc<dyn ReadStore<SamlRequestView>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Projection for SamlRequestsProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn event_types(&self) -> Vec<EventType> {
        vec![
            saml_events::SAML_REQUEST_ADDED,
            saml_events::SAML_REQUEST_SESSION_LINKED,
            saml_events::SAML_REQUEST_SUCCEEDED,
            saml_events::SAML_REQUEST_FAILED,
        ]
    }

    async fn reduce(&self, event: &StoredEvent) -> Result<()> {
        let instance_id = &event.instance_id;
        let key = event.aggregate_id.as_str();

        if event.is(&saml_events::SAML_REQUEST_ADDED) {
            let payload: saml_events::SamlRequestAdded = event.payload_as()?;
            let view = SamlRequestView {
                id: event.aggregate_id.clone(),
                instance_id: instance_id.clone(),
                state: SamlRequestViewState::Added,
                binding: payload.binding,
                destination: payload.destination,
                acs_url: payload.acs_url,
                request_id: payload.request_id,
                issuer: payload.issuer,
                relay_state: payload.relay_state,
                session_id: None,
                user_id: None,
                sequence: event.version,
                changed_at: event.created_at,
            };
            return self.store.upsert(instance_id, key, view).await;
        }

        let Some(mut view) = self.store.get(instance_id, key).await? else {
            return Ok(());
        };
        if event.is(&saml_events::SAML_REQUEST_SESSION_LINKED) {
            let payload: saml_events::SamlRequestSessionLinked = event.payload_as()?;
            view.session_id = Some(payload.session_id);
            view.user_id = Some(payload.user_id);
        } else if event.is(&saml_events::SAML_REQUEST_SUCCEEDED) {
            view.state = SamlRequestViewState::Succeeded;
        } else if event.is(&saml_events::SAML_REQUEST_FAILED) {
            view.state = SamlRequestViewState::Failed;
        }
        view.sequence = event.version;
        view.changed_at = event.created_at;
        self.store.upsert(instance_id, key, view).await
    }
}
