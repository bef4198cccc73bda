//! Users projection: the user directory per org, including IDP links.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_core::{IdpId, InstanceId, Result};
use idforge_domain::events::user as user_events;
use idforge_domain::{UserState, UserType};
use idforge_events::{EventType, StoredEvent};

use crate::runtime::Projection;
use crate::store::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpLinkView {
    pub idp_config_id: IdpId,
    pub external_user_id: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: String,
    pub instance_id: InstanceId,
    pub resource_owner: String,
    pub username: String,
    pub state: UserState,
    pub user_type: UserType,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub phone_verified: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub links: Vec<IdpLinkView>,
    pub sequence: u64,
    pub changed_at: DateTime<Utc>,
}

pub struct UsersProjection {
    store: Arc<dyn ReadStore<UserView>>,
}

impl UsersProjection {
    pub const NAME: &'static str = "users";

    pub fn new(store: Arc<dyn ReadStore<UserView>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Projection for UsersProjection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn event_types(&self) -> Vec<EventType> {
        vec![
            user_events::USER_HUMAN_ADDED,
            user_events::USER_MACHINE_ADDED,
            user_events::USER_MACHINE_CHANGED,
            user_events::USER_USERNAME_CHANGED,
            user_events::USER_PROFILE_CHANGED,
            user_events::USER_EMAIL_CHANGED,
            user_events::USER_EMAIL_VERIFIED,
            user_events::USER_PHONE_CHANGED,
            user_events::USER_PHONE_VERIFIED,
            user_events::USER_PHONE_REMOVED,
            user_events::USER_DEACTIVATED,
            user_events::USER_REACTIVATED,
            user_events::USER_LOCKED,
            user_events::USER_UNLOCKED,
            user_events::USER_REMOVED,
            user_events::USER_IDP_LINK_ADDED,
            user_events::USER_IDP_LINK_REMOVED,
            user_events::USER_IDP_EXTERNAL_ID_MIGRATED,
        ]
    }

    async fn reduce(&self, event: &StoredEvent) -> Result<()> {
        let instance_id = &event.instance_id;
        let key = event.aggregate_id.as_str();

        if event.is(&user_events::USER_HUMAN_ADDED) {
            let payload: user_events::HumanAdded = event.payload_as()?;
            let view = UserView {
                id: event.aggregate_id.clone(),
                instance_id: instance_id.clone(),
                resource_owner: event.resource_owner.clone(),
                username: payload.username,
                state: UserState::Active,
                user_type: UserType::Human,
                email: Some(payload.email.as_str().to_string()),
                email_verified: payload.email_verified,
                phone: payload.phone.map(|p| p.as_str().to_string()),
                phone_verified: payload.phone_verified,
                first_name: payload.profile.first_name.clone(),
                last_name: payload.profile.last_name.clone(),
                display_name: payload.profile.display_name_or_default(),
                links: Vec::new(),
                sequence: event.version,
                changed_at: event.created_at,
            };
            return self.store.upsert(instance_id, key, view).await;
        }

        if event.is(&user_events::USER_MACHINE_ADDED) {
            let payload: user_events::MachineAdded = event.payload_as()?;
            let view = UserView {
                id: event.aggregate_id.clone(),
                instance_id: instance_id.clone(),
                resource_owner: event.resource_owner.clone(),
                username: payload.username,
                state: UserState::Active,
                user_type: UserType::Machine,
                email: None,
                email_verified: false,
                phone: None,
                phone_verified: false,
                first_name: String::new(),
                last_name: String::new(),
                display_name: payload.name,
                links: Vec::new(),
                sequence: event.version,
                changed_at: event.created_at,
            };
            return self.store.upsert(instance_id, key, view).await;
        }

        if event.is(&user_events::USER_REMOVED) {
            return self.store.remove(instance_id, key).await;
        }

        let Some(mut view) = self.store.get(instance_id, key).await? else {
            return Ok(());
        };
        if event.is(&user_events::USER_USERNAME_CHANGED) {
            let payload: user_events::UsernameChanged = event.payload_as()?;
            view.username = payload.username;
        } else if event.is(&user_events::USER_PROFILE_CHANGED) {
            let payload: user_events::ProfileChanged = event.payload_as()?;
            view.first_name = payload.profile.first_name.clone();
            view.last_name = payload.profile.last_name.clone();
            view.display_name = payload.profile.display_name_or_default();
        } else if event.is(&user_events::USER_EMAIL_CHANGED) {
            let payload: user_events::EmailChanged = event.payload_as()?;
            view.email = Some(payload.email.as_str().to_string());
            view.email_verified = payload.verified;
        } else if event.is(&user_events::USER_EMAIL_VERIFIED) {
            view.email_verified = true;
        } else if event.is(&user_events::USER_PHONE_CHANGED) {
            let payload: user_events::PhoneChanged = event.payload_as()?;
            view.phone = Some(payload.phone.as_str().to_string());
            view.phone_verified = payload.verified;
        } else if event.is(&user_events::USER_PHONE_VERIFIED) {
            view.phone_verified = true;
        } else if event.is(&user_events::USER_PHONE_REMOVED) {
            view.phone = None;
            view.phone_verified = false;
        } else if event.is(&user_events::USER_MACHINE_CHANGED) {
            let payload: user_events::MachineChanged = event.payload_as()?;
            if let Some(name) = payload.name {
                view.display_name = name;
            }
        } else if event.is(&user_events::USER_DEACTIVATED) {
            view.state = UserState::Inactive;
        } else if event.is(&user_events::USER_REACTIVATED) || event.is(&user_events::USER_UNLOCKED) {
            view.state = UserState::Active;
        } else if event.is(&user_events::USER_LOCKED) {
            view.state = UserState::Locked;
        } else if event.is(&user_events::USER_IDP_LINK_ADDED) {
            let payload: user_events::IdpLinkAdded = event.payload_as()?;
            let link = IdpLinkView {
                idp_config_id: payload.idp_config_id,
                external_user_id: payload.external_user_id,
                display_name: payload.display_name,
            };
            if !view
                .links
                .iter()
                .any(|l| l.idp_config_id == link.idp_config_id && l.external_user_id == link.external_user_id)
            {
                view.links.push(link);
            }
        } else if event.is(&user_events::USER_IDP_LINK_REMOVED) {
            let payload: user_events::IdpLinkRemoved = event.payload_as()?;
            view.links.retain(|l| {
                !(l.idp_config_id == payload.idp_config_id
                    && l.external_user_id == payload.external_user_id)
            });
        } else if event.is(&user_events::USER_IDP_EXTERNAL_ID_MIGRATED) {
            let payload: user_events::IdpExternalIdMigrated = event.payload_as()?;
            for link in &mut view.links {
                if link.idp_config_id == payload.idp_config_id
                    && link.external_user_id == payload.previous_id
                {
                    link.external_user_id = payload.new_id.clone();
                }
            }
        }
        view.sequence = event.version;
        view.changed_at = event.created_at;
        self.store.upsert(instance_id, key, view).await
    }
}
