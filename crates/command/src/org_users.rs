//! Org-wide username fold.
//!
//! Usernames are unique per org, case-insensitive. Instead of a global
//! secondary index, uniqueness is enforced by folding every username-
//! affecting event in the org and guarding the push on the folded range:
//! if another writer lands a matching event between our fold and our push,
//! the push fails with a concurrency conflict and the caller retries.

use std::collections::HashMap;

use idforge_core::{InstanceId, OrgId, Result, UserId};
use idforge_domain::events::user as user_events;
use idforge_domain::events::AGGREGATE_USER;
use idforge_events::{PositionGuard, SearchQuery, StoredEvent, WriteModel, WriteModelBase};

/// Folds `user.*` events of one org into a case-insensitive
/// username -> user id map. Deleted users release their name; deactivated
/// and locked users keep it.
#[derive(Debug, Default)]
pub struct OrgUsersWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    org_id: OrgId,
    taken: HashMap<String, UserId>,
}

impl OrgUsersWriteModel {
    pub fn new(instance_id: &InstanceId, org_id: &OrgId) -> Self {
        Self {
            base: WriteModelBase::new(org_id.as_str()),
            instance_id: instance_id.clone(),
            org_id: org_id.clone(),
            taken: HashMap::new(),
        }
    }

    pub fn user_for(&self, username: &str) -> Option<&UserId> {
        self.taken.get(&username.to_lowercase())
    }

    pub fn is_taken(&self, username: &str) -> bool {
        self.user_for(username).is_some()
    }

    /// Guard for a push that relies on this fold being current.
    pub fn guard(&self) -> PositionGuard {
        PositionGuard::new(self.query(), self.base.processed_position)
    }
}

impl WriteModel for OrgUsersWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_USER)
            .resource_owner(self.org_id.as_str())
            .event_types([
                user_events::USER_HUMAN_ADDED,
                user_events::USER_MACHINE_ADDED,
                user_events::USER_USERNAME_CHANGED,
                user_events::USER_REMOVED,
            ])
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        let user_id = UserId::new(event.aggregate_id.clone());
        if event.is(&user_events::USER_HUMAN_ADDED) {
            let payload: user_events::HumanAdded = event.payload_as()?;
            self.taken.insert(payload.username.to_lowercase(), user_id);
        } else if event.is(&user_events::USER_MACHINE_ADDED) {
            let payload: user_events::MachineAdded = event.payload_as()?;
            self.taken.insert(payload.username.to_lowercase(), user_id);
        } else if event.is(&user_events::USER_USERNAME_CHANGED) {
            let payload: user_events::UsernameChanged = event.payload_as()?;
            self.taken.retain(|_, id| id != &user_id);
            self.taken.insert(payload.username.to_lowercase(), user_id);
        } else if event.is(&user_events::USER_REMOVED) {
            let payload: user_events::UserRemoved = event.payload_as()?;
            self.taken.remove(&payload.username.to_lowercase());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use idforge_events::{AggregateType, EventType, StoredEvent};

    fn user_event(version: u64, user: &str, event_type: EventType, payload: serde_json::Value) -> StoredEvent {
        StoredEvent {
            instance_id: InstanceId::new("i1"),
            aggregate_type: AggregateType::from_static("user"),
            aggregate_id: user.to_string(),
            resource_owner: "o1".to_string(),
            event_type,
            creator: "system".to_string(),
            created_at: Utc::now(),
            version,
            position: version,
            payload,
        }
    }

    #[test]
    fn fold_is_case_insensitive_and_releases_on_removal() {
        let mut model = OrgUsersWriteModel::new(&InstanceId::new("i1"), &OrgId::new("o1"));
        model
            .reduce(&user_event(
                1,
                "u1",
                user_events::USER_HUMAN_ADDED,
                serde_json::json!({
                    "username": "Alice",
                    "profile": {"first_name": "A", "last_name": "L"},
                    "email": "alice@example.com"
                }),
            ))
            .unwrap();

        assert!(model.is_taken("alice"));
        assert!(model.is_taken("ALICE"));
        assert_eq!(model.user_for("alice").unwrap().as_str(), "u1");

        model
            .reduce(&user_event(
                2,
                "u1",
                user_events::USER_REMOVED,
                serde_json::json!({"username": "Alice"}),
            ))
            .unwrap();
        assert!(!model.is_taken("alice"));
    }

    #[test]
    fn username_change_moves_the_claim() {
        let mut model = OrgUsersWriteModel::new(&InstanceId::new("i1"), &OrgId::new("o1"));
        model
            .reduce(&user_event(
                1,
                "u1",
                user_events::USER_MACHINE_ADDED,
                serde_json::json!({"username": "bot", "name": "Bot"}),
            ))
            .unwrap();
        model
            .reduce(&user_event(
                2,
                "u1",
                user_events::USER_USERNAME_CHANGED,
                serde_json::json!({"username": "bot-renamed"}),
            ))
            .unwrap();

        assert!(!model.is_taken("bot"));
        assert!(model.is_taken("BOT-RENAMED"));
    }
}
