//! Password complexity policies projection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_core::{InstanceId, Result};
use idforge_domain::events::policy as policy_events;
use idforge_domain::PasswordComplexityPolicy;
use idforge_events::{EventType, StoredEvent};

use crate::runtime::Projection;
use crate::store::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordComplexityView {
    pub owner: String,
    pub instance_id: InstanceId,
    pub is_default: bool,
    pub policy: PasswordComplexityPolicy,
    pub sequence: u64,
    pub changed_at: DateTime<Utc>,
}

pub struct PasswordComplexityProjection {
    store: Arc<dyn ReadStore<PasswordComplexityView>>,
}

impl PasswordComplexityProjection {
    pub const NAME: &'static str = "password_complexity_policies";

    pub fn new(store: Arc<dyn ReadStore<PasswordComplexityView>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Projection for PasswordComplexityProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn event_types(&self) -> Vec<EventType> {
        vec![
            policy_events::INSTANCE_PASSWORD_COMPLEXITY_POLICY_ADDED,
            policy_events::INSTANCE_PASSWORD_COMPLEXITY_POLICY_CHANGED,
            policy_events::ORG_PASSWORD_COMPLEXITY_POLICY_ADDED,
            policy_events::ORG_PASSWORD_COMPLEXITY_POLICY_CHANGED,
            policy_events::ORG_PASSWORD_COMPLEXITY_POLICY_REMOVED,
        ]
    }

    async fn reduce(&self, event: &StoredEvent) -> Result<()> {
        let instance_id = &event.instance_id;
        let key = event.aggregate_id.as_str();
        let ty = event.event_type.as_str();

        if ty.ends_with(".removed") {
            return self.store.remove(instance_id, key).await;
        }

        let policy: PasswordComplexityPolicy = event.payload_as()?;
        let view = PasswordComplexityView {
            owner: event.aggregate_id.clone(),
            instance_id: instance_id.clone(),
            is_default: ty.starts_with("instance."),
            policy,
            sequence: event.version,
            changed_at: event.created_at,
        };
        self.store.upsert(instance_id, key, view).await
    }
}
