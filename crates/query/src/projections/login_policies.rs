//! Login policies projection: instance defaults and org overrides in one
//! view, keyed by the owning aggregate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_core::{InstanceId, Result};
use idforge_domain::events::policy as policy_events;
use idforge_domain::{LoginPolicy, MultiFactorType, SecondFactorType};
use idforge_events::{EventType, StoredEvent};

use crate::runtime::Projection;
use crate::store::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPolicyView {
    /// Org id for overrides, instance id for the default.
    pub owner: String,
    pub instance_id: InstanceId,
    pub is_default: bool,
    pub policy: LoginPolicy,
    #[serde(default)]
    pub second_factors: Vec<SecondFactorType>,
    #[serde(default)]
    pub multi_factors: Vec<MultiFactorType>,
    pub sequence: u64,
    pub changed_at: DateTime<Utc>,
}

pub struct LoginPoliciesProjection {
    store: Arc<dyn ReadStore<LoginPolicyView>>,
}

impl LoginPoliciesProjection {
    pub const NAME: &'static str = "login_policies";

    pub fn new(store: Arc<dyn ReadStore<LoginPolicyView>>) -> Self {
        Self { store }
    }

    fn is_default_event(event: &StoredEvent) -> bool {
        event.event_type.as_str().starts_with("instance.")
    }
}

#[async_trait]
impl Projection for LoginPoliciesProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn event_types(&self) -> Vec<EventType> {
        vec![
            policy_events::INSTANCE_LOGIN_POLICY_ADDED,
            policy_events::INSTANCE_LOGIN_POLICY_CHANGED,
            policy_events::INSTANCE_LOGIN_POLICY_SECOND_FACTOR_ADDED,
            policy_events::INSTANCE_LOGIN_POLICY_SECOND_FACTOR_REMOVED,
            policy_events::INSTANCE_LOGIN_POLICY_MULTI_FACTOR_ADDED,
            policy_events::INSTANCE_LOGIN_POLICY_MULTI_FACTOR_REMOVED,
            policy_events::ORG_LOGIN_POLICY_ADDED,
            policy_events::ORG_LOGIN_POLICY_CHANGED,
            policy_events::ORG_LOGIN_POLICY_REMOVED,
            policy_events::ORG_LOGIN_POLICY_SECOND_FACTOR_ADDED,
            policy_events::ORG_LOGIN_POLICY_SECOND_FACTOR_REMOVED,
            policy_events::ORG_LOGIN_POLICY_MULTI_FACTOR_ADDED,
            policy_events::ORG_LOGIN_POLICY_MULTI_FACTOR_REMOVED,
        ]
    }

    async fn reduce(&self, event: &StoredEvent) -> Result<()> {
        let instance_id = &event.instance_id;
        let key = event.aggregate_id.as_str();
        let ty = event.event_type.as_str();

        if ty.ends_with("policy.login.added") {
            let policy: LoginPolicy = event.payload_as()?;
            let view = LoginPolicyView {
                owner: event.aggregate_id.clone(),
                instance_id: instance_id.clone(),
                is_default: Self::is_default_event(event),
                policy,
                second_factors: Vec::new(),
                multi_factors: Vec::new(),
                sequence: event.version,
                changed_at: event.created_at,
            };
            return self.store.upsert(instance_id, key, view).await;
        }

        if ty.ends_with("policy.login.removed") {
            return self.store.remove(instance_id, key).await;
        }

        let Some(mut view) = self.store.get(instance_id, key).await? else {
            return Ok(());
        };
        if ty.ends_with("policy.login.changed") {
            view.policy = event.payload_as()?;
        } else if ty.ends_with("second_factor.added") {
            let payload: policy_events::SecondFactorPayload = event.payload_as()?;
            if !view.second_factors.contains(&payload.factor) {
                view.second_factors.push(payload.factor);
            }
        } else if ty.ends_with("second_factor.removed") {
            let payload: policy_events::SecondFactorPayload = event.payload_as()?;
            view.second_factors.retain(|f| *f != payload.factor);
        } else if ty.ends_with("multi_factor.added") {
            let payload: policy_events::MultiFactorPayload = event.payload_as()?;
            if !view.multi_factors.contains(&payload.factor) {
                view.multi_factors.push(payload.factor);
            }
        } else if ty.ends_with("multi_factor.removed") {
            let payload: policy_events::MultiFactorPayload = event.payload_as()?;
            view.multi_factors.retain(|f| *f != payload.factor);
        }
        view.sequence = event.version;
        view.changed_at = event.created_at;
        self.store.upsert(instance_id, key, view).await
    }
}
