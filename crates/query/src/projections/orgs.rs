//! Orgs projection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_core::{InstanceId, Result};
use idforge_domain::events::org as org_events;
use idforge_domain::OrgState;
use idforge_events::{EventType, StoredEvent};

use crate::runtime::Projection;
use crate::store::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgView {
    pub id: String,
    pub instance_id: InstanceId,
    pub name: String,
    pub state: OrgState,
    #[serde(default)]
    pub primary_domain: String,
    #[serde(default)]
    pub domains: Vec<String>,
    pub sequence: u64,
    pub changed_at: DateTime<Utc>,
}

pub struct OrgsProjection {
    store: Arc<dyn ReadStore<OrgView>>,
}

impl OrgsProjection {
    pub const NAME: &'static str = "orgs";

    pub fn new(store: Arc<dyn ReadStore<OrgView>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Projection for OrgsProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn event_types(&self) -> Vec<EventType> {
        vec![
            org_events::ORG_ADDED,
            org_events::ORG_CHANGED,
            org_events::ORG_DEACTIVATED,
            org_events::ORG_REACTIVATED,
            org_events::ORG_REMOVED,
            org_events::ORG_DOMAIN_ADDED,
            org_events::ORG_DOMAIN_PRIMARY_SET,
            org_events::ORG_DOMAIN_REMOVED,
        ]
    }

    async fn reduce(&self, event: &StoredEvent) -> Result<()> {
        let instance_id = &event.instance_id;
        let key = event.aggregate_id.as_str();

        if event.is(&org_events::ORG_ADDED) {
            let payload: org_events::OrgAdded = event.payload_as()?;
            let view = OrgView {
                id: event.aggregate_id.clone(),
                instance_id: instance_id.clone(),
                name: payload.name,
                state: OrgState::Active,
                primary_domain: String::new(),
                domains: Vec::new(),
                sequence: event.version,
                changed_at: event.created_at,
            };
            return self.store.upsert(instance_id, key, view).await;
        }

        if event.is(&org_events::ORG_REMOVED) {
            return self.store.remove(instance_id, key).await;
        }

        let Some(mut view) = self.store.get(instance_id, key).await? else {
            // Out-of-order or replayed tail without the head; nothing to do.
            return Ok(());
        };
        if event.is(&org_events::ORG_CHANGED) {
            let payload: org_events::OrgChanged = event.payload_as()?;
            view.name = payload.name;
        } else if event.is(&org_events::ORG_DEACTIVATED) {
            view.state = OrgState::Inactive;
        } else if event.is(&org_events::ORG_REACTIVATED) {
            view.state = OrgState::Active;
        } else if event.is(&org_events::ORG_DOMAIN_ADDED) {
            let payload: org_events::OrgDomainAdded = event.payload_as()?;
            let domain = payload.domain.as_str().to_string();
            if !view.domains.contains(&domain) {
                view.domains.push(domain);
            }
        } else if event.is(&org_events::ORG_DOMAIN_PRIMARY_SET) {
            let payload: org_events::OrgDomainPrimarySet = event.payload_as()?;
            view.primary_domain = payload.domain.as_str().to_string();
        } else if event.is(&org_events::ORG_DOMAIN_REMOVED) {
            let payload: org_events::OrgDomainRemoved = event.payload_as()?;
            view.domains.retain(|d| d != payload.domain.as_str());
            if view.primary_domain == payload.domain.as_str() {
                view.primary_domain.clear();
            }
        }
        view.sequence = event.version;
        view.changed_at = event.created_at;
        self.store.upsert(instance_id, key, view).await
    }
}
