//! External identity links on users.

use idforge_core::{Context, Error, IdpId, ObjectDetails, Result, UserId};
use idforge_domain::events::user as user_events;
use idforge_events::{AggregateBatch, Push, WriteModel};
use idforge_eventstore::append_and_reduce;

use crate::permission::PERM_USER_WRITE;
use crate::{push_details, Commands};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddIdpLink {
    pub user_id: UserId,
    pub idp_config_id: IdpId,
    pub external_user_id: String,
    pub display_name: String,
}

impl Commands {
    pub async fn add_user_idp_link(&self, ctx: &Context, link: AddIdpLink) -> Result<ObjectDetails> {
        let pushed = self.add_user_idp_links(ctx, vec![link]).await?;
        Ok(pushed)
    }

    /// Validate all links, then write atomically: either every link lands
    /// or none does.
    pub async fn add_user_idp_links(
        &self,
        ctx: &Context,
        links: Vec<AddIdpLink>,
    ) -> Result<ObjectDetails> {
        if links.is_empty() {
            return Err(Error::invalid_argument("COMMAND-ul01", "no links provided"));
        }
        for link in &links {
            if link.external_user_id.is_empty() {
                return Err(Error::invalid_argument(
                    "COMMAND-ul02",
                    "externalUserId must not be empty",
                ));
            }
            if link.idp_config_id.is_empty() {
                return Err(Error::invalid_argument("COMMAND-ul03", "idpConfigId must not be empty"));
            }
        }

        // Group by user; each user's links become one batch on its aggregate.
        let mut push = Push::new();
        let mut user_ids: Vec<UserId> = Vec::new();
        for link in &links {
            if !user_ids.contains(&link.user_id) {
                user_ids.push(link.user_id.clone());
            }
        }
        for user_id in user_ids {
            let model = self.existing_user_model(ctx, &user_id).await?;
            self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;

            let mut batch = AggregateBatch::new(model.aggregate(), model.base().expected_version());
            for link in links.iter().filter(|l| l.user_id == user_id) {
                if model.has_link(&link.idp_config_id, &link.external_user_id) {
                    return Err(Error::already_exists(
                        "COMMAND-ul04",
                        "external identity is already linked",
                    )
                    .with_detail("external_user_id", link.external_user_id.clone()));
                }
                batch = batch.event(
                    user_events::USER_IDP_LINK_ADDED,
                    ctx.creator(),
                    &user_events::IdpLinkAdded {
                        idp_config_id: link.idp_config_id.clone(),
                        external_user_id: link.external_user_id.clone(),
                        display_name: link.display_name.clone(),
                    },
                )?;
            }
            push = push.with_batch(batch);
        }

        let pushed = self.push(ctx, push).await?;
        Ok(push_details(&pushed))
    }

    pub async fn remove_user_idp_link(
        &self,
        ctx: &Context,
        user_id: &UserId,
        idp_config_id: &IdpId,
        external_user_id: &str,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if !model.has_link(idp_config_id, external_user_id) {
            return Err(Error::not_found("COMMAND-ul05", "idp link not found"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_IDP_LINK_REMOVED,
            ctx.creator(),
            &user_events::IdpLinkRemoved {
                idp_config_id: idp_config_id.clone(),
                external_user_id: external_user_id.to_string(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Atomically change the external id while preserving the link.
    pub async fn migrate_user_idp_external_id(
        &self,
        ctx: &Context,
        user_id: &UserId,
        idp_config_id: &IdpId,
        previous_id: &str,
        new_id: &str,
    ) -> Result<ObjectDetails> {
        if new_id.is_empty() {
            return Err(Error::invalid_argument("COMMAND-ul06", "new external id must not be empty"));
        }
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if !model.has_link(idp_config_id, previous_id) {
            return Err(Error::not_found("COMMAND-ul07", "idp link not found"));
        }
        if previous_id == new_id {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_IDP_EXTERNAL_ID_MIGRATED,
            ctx.creator(),
            &user_events::IdpExternalIdMigrated {
                idp_config_id: idp_config_id.clone(),
                previous_id: previous_id.to_string(),
                new_id: new_id.to_string(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }
}
