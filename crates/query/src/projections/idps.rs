//! IDP templates projection: the union view over all provider variants.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_core::{InstanceId, Result};
use idforge_domain::events::idp as idp_events;
use idforge_domain::{IdpConfig, IdpState, IdpType, ProvisioningOptions};
use idforge_events::{EventType, StoredEvent};

use crate::runtime::Projection;
use crate::store::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpView {
    pub id: String,
    pub instance_id: InstanceId,
    pub resource_owner: String,
    pub name: String,
    pub idp_type: IdpType,
    pub state: IdpState,
    pub options: ProvisioningOptions,
    pub config: IdpConfig,
    pub sequence: u64,
    pub changed_at: DateTime<Utc>,
}

pub struct IdpsProjection {
    store: Arc<dyn ReadStore<IdpView>>,
}

impl IdpsProjection {
    pub const NAME: &'static str = "idp_templates";

    pub fn new(store: Arc<dyn ReadStore<IdpView>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Projection for IdpsProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn event_types(&self) -> Vec<EventType> {
        vec![
            idp_events::IDP_ADDED,
            idp_events::IDP_CHANGED,
            idp_events::IDP_CONFIG_CHANGED,
            idp_events::IDP_REMOVED,
        ]
    }

    async fn reduce(&self, event: &StoredEvent) -> Result<()> {
        let instance_id = &event.instance_id;
        let key = event.aggregate_id.as_str();

        if event.is(&idp_events::IDP_ADDED) {
            let payload: idp_events::IdpAdded = event.payload_as()?;
            let view = IdpView {
                id: event.aggregate_id.clone(),
                instance_id: instance_id.clone(),
                resource_owner: event.resource_owner.clone(),
                name: payload.name,
                idp_type: payload.config.idp_type(),
                state: IdpState::Active,
                options: payload.options,
                config: payload.config,
                sequence: event.version,
                changed_at: event.created_at,
            };
            return self.store.upsert(instance_id, key, view).await;
        }

        let Some(mut view) = self.store.get(instance_id, key).await? else {
            return Ok(());
        };
        if event.is(&idp_events::IDP_CHANGED) {
            let payload: idp_events::IdpChanged = event.payload_as()?;
            if let Some(name) = payload.name {
                view.name = name;
            }
            if let Some(options) = payload.options {
                view.options = options;
            }
        } else if event.is(&idp_events::IDP_CONFIG_CHANGED) {
            let payload: idp_events::IdpConfigChanged = event.payload_as()?;
            view.idp_type = payload.config.idp_type();
            view.config = payload.config;
        } else if event.is(&idp_events::IDP_REMOVED) {
            view.state = IdpState::Removed;
        }
        view.sequence = event.version;
        view.changed_at = event.created_at;
        self.store.upsert(instance_id, key, view).await
    }
}
