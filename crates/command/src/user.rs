//! User commands: human and machine lifecycle, profile, email and phone.

use idforge_core::{
    Context, EmailAddress, Error, InstanceId, ObjectDetails, OrgId, PhoneNumber, Result, UserId,
};
use idforge_domain::events::user as user_events;
use idforge_domain::events::AGGREGATE_USER;
use idforge_domain::{Profile, UserState, UserType};
use idforge_events::{
    Aggregate, AggregateBatch, ExpectedVersion, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::org_users::OrgUsersWriteModel;
use crate::permission::PERM_USER_WRITE;
use crate::{push_details, Commands};

/// Write model over one user aggregate.
#[derive(Debug, Default)]
pub struct UserWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub state: UserState,
    pub user_type: Option<UserType>,
    pub username: String,
    pub profile: Option<Profile>,
    pub email: Option<EmailAddress>,
    pub email_verified: bool,
    pub phone: Option<PhoneNumber>,
    pub phone_verified: bool,
    pub machine_name: String,
    pub machine_description: String,
    /// `(idp_config_id, external_user_id)` pairs currently linked.
    pub links: Vec<(idforge_core::IdpId, String)>,
}

impl UserWriteModel {
    pub fn new(instance_id: &InstanceId, user_id: &UserId) -> Self {
        Self {
            base: WriteModelBase::new(user_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            AGGREGATE_USER,
            self.base.aggregate_id.clone(),
            &OrgId::new(self.base.resource_owner.clone()),
            &self.instance_id,
        )
    }

    pub fn exists(&self) -> bool {
        self.state.exists()
    }

    pub fn has_link(&self, idp_id: &idforge_core::IdpId, external_user_id: &str) -> bool {
        self.links
            .iter()
            .any(|(idp, ext)| idp == idp_id && ext == external_user_id)
    }
}

impl WriteModel for UserWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_USER)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&user_events::USER_HUMAN_ADDED) {
            let payload: user_events::HumanAdded = event.payload_as()?;
            self.state = UserState::Active;
            self.user_type = Some(UserType::Human);
            self.username = payload.username;
            self.profile = Some(payload.profile);
            self.email = Some(payload.email);
            self.email_verified = payload.email_verified;
            self.phone = payload.phone;
            self.phone_verified = payload.phone_verified;
        } else if event.is(&user_events::USER_MACHINE_ADDED) {
            let payload: user_events::MachineAdded = event.payload_as()?;
            self.state = UserState::Active;
            self.user_type = Some(UserType::Machine);
            self.username = payload.username;
            self.machine_name = payload.name;
            self.machine_description = payload.description;
        } else if event.is(&user_events::USER_MACHINE_CHANGED) {
            let payload: user_events::MachineChanged = event.payload_as()?;
            if let Some(name) = payload.name {
                self.machine_name = name;
            }
            if let Some(description) = payload.description {
                self.machine_description = description;
            }
        } else if event.is(&user_events::USER_USERNAME_CHANGED) {
            let payload: user_events::UsernameChanged = event.payload_as()?;
            self.username = payload.username;
        } else if event.is(&user_events::USER_PROFILE_CHANGED) {
            let payload: user_events::ProfileChanged = event.payload_as()?;
            self.profile = Some(payload.profile);
        } else if event.is(&user_events::USER_EMAIL_CHANGED) {
            let payload: user_events::EmailChanged = event.payload_as()?;
            self.email = Some(payload.email);
            self.email_verified = payload.verified;
        } else if event.is(&user_events::USER_EMAIL_VERIFIED) {
            self.email_verified = true;
        } else if event.is(&user_events::USER_PHONE_CHANGED) {
            let payload: user_events::PhoneChanged = event.payload_as()?;
            self.phone = Some(payload.phone);
            self.phone_verified = payload.verified;
        } else if event.is(&user_events::USER_PHONE_VERIFIED) {
            self.phone_verified = true;
        } else if event.is(&user_events::USER_PHONE_REMOVED) {
            self.phone = None;
            self.phone_verified = false;
        } else if event.is(&user_events::USER_DEACTIVATED) {
            self.state = UserState::Inactive;
        } else if event.is(&user_events::USER_REACTIVATED)
            || event.is(&user_events::USER_UNLOCKED)
        {
            self.state = UserState::Active;
        } else if event.is(&user_events::USER_LOCKED) {
            self.state = UserState::Locked;
        } else if event.is(&user_events::USER_REMOVED) {
            self.state = UserState::Deleted;
        } else if event.is(&user_events::USER_IDP_LINK_ADDED) {
            let payload: user_events::IdpLinkAdded = event.payload_as()?;
            self.links.push((payload.idp_config_id, payload.external_user_id));
        } else if event.is(&user_events::USER_IDP_LINK_REMOVED) {
            let payload: user_events::IdpLinkRemoved = event.payload_as()?;
            self.links.retain(|(idp, ext)| {
                !(idp == &payload.idp_config_id && ext == &payload.external_user_id)
            });
        } else if event.is(&user_events::USER_IDP_EXTERNAL_ID_MIGRATED) {
            let payload: user_events::IdpExternalIdMigrated = event.payload_as()?;
            for (idp, ext) in &mut self.links {
                if idp == &payload.idp_config_id && ext == &payload.previous_id {
                    *ext = payload.new_id.clone();
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AddHumanUser {
    pub user_id: Option<UserId>,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub email_verified: bool,
    pub phone: Option<String>,
    pub phone_verified: bool,
    pub preferred_language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AddMachineUser {
    pub user_id: Option<UserId>,
    pub username: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CreatedUser {
    pub user_id: UserId,
    pub details: ObjectDetails,
}

impl Commands {
    pub async fn add_human_user(&self, ctx: &Context, request: AddHumanUser) -> Result<CreatedUser> {
        let username = request.username.trim().to_string();
        if username.is_empty() {
            return Err(Error::invalid_argument("COMMAND-us01", "username must not be empty"));
        }
        if request.first_name.is_empty() || request.last_name.is_empty() {
            return Err(Error::invalid_argument(
                "COMMAND-us02",
                "first and last name are required",
            ));
        }
        let email = EmailAddress::parse(request.email)?;
        let phone = request.phone.map(PhoneNumber::parse).transpose()?;
        let preferred_language = request
            .preferred_language
            .map(idforge_core::Language::parse)
            .transpose()?
            .unwrap_or_default();
        self.check_permission(ctx, PERM_USER_WRITE, ctx.org_id.as_str())?;

        // Org must exist and be usable.
        self.existing_org_model(ctx, &ctx.org_id).await?;

        let profile = Profile {
            first_name: request.first_name,
            last_name: request.last_name,
            nick_name: String::new(),
            display_name: String::new(),
            preferred_language,
            gender: Default::default(),
        };

        let payload = user_events::HumanAdded {
            username,
            profile,
            email,
            email_verified: request.email_verified,
            phone,
            phone_verified: request.phone_verified,
        };
        self.create_user(ctx, request.user_id, user_events::USER_HUMAN_ADDED, &payload, &payload.username)
            .await
    }

    pub async fn add_machine_user(
        &self,
        ctx: &Context,
        request: AddMachineUser,
    ) -> Result<CreatedUser> {
        let username = request.username.trim().to_string();
        if username.is_empty() {
            return Err(Error::invalid_argument("COMMAND-us03", "username must not be empty"));
        }
        if request.name.is_empty() {
            return Err(Error::invalid_argument("COMMAND-us04", "machine name is required"));
        }
        self.check_permission(ctx, PERM_USER_WRITE, ctx.org_id.as_str())?;
        self.existing_org_model(ctx, &ctx.org_id).await?;

        let payload = user_events::MachineAdded {
            username,
            name: request.name,
            description: request.description,
        };
        self.create_user(ctx, request.user_id, user_events::USER_MACHINE_ADDED, &payload, &payload.username)
            .await
    }

    async fn create_user<E: serde::Serialize>(
        &self,
        ctx: &Context,
        user_id: Option<UserId>,
        event_type: idforge_events::EventType,
        payload: &E,
        username: &str,
    ) -> Result<CreatedUser> {
        let user_id = user_id.unwrap_or_else(UserId::generate);

        let mut existing = UserWriteModel::new(&ctx.instance_id, &user_id);
        self.load(ctx, &mut existing).await?;
        if existing.state != UserState::Unspecified {
            return Err(Error::already_exists("COMMAND-us05", "user id already in use")
                .with_detail("user_id", user_id.as_str()));
        }

        // Uniqueness fold, serialised with the append via the guard.
        let mut org_users = OrgUsersWriteModel::new(&ctx.instance_id, &ctx.org_id);
        self.load(ctx, &mut org_users).await?;
        if org_users.is_taken(username) {
            return Err(
                Error::already_exists("COMMAND-us06", "username is already taken in this org")
                    .with_detail("username", username),
            );
        }

        let aggregate = Aggregate::new(AGGREGATE_USER, user_id.as_str(), &ctx.org_id, &ctx.instance_id);
        let batch = AggregateBatch::new(aggregate, ExpectedVersion::NoStream).event(
            event_type,
            ctx.creator(),
            payload,
        )?;
        let push = Push::single(batch).with_guard(org_users.guard());
        let pushed = self.push(ctx, push).await?;
        Ok(CreatedUser {
            user_id,
            details: push_details(&pushed),
        })
    }

    pub async fn change_username(
        &self,
        ctx: &Context,
        user_id: &UserId,
        new_username: &str,
    ) -> Result<ObjectDetails> {
        let new_username = new_username.trim().to_string();
        if new_username.is_empty() {
            return Err(Error::invalid_argument("COMMAND-us07", "username must not be empty"));
        }

        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if model.username == new_username {
            return Ok(model.details());
        }

        let org_id = OrgId::new(model.base().resource_owner.clone());
        let mut org_users = OrgUsersWriteModel::new(&ctx.instance_id, &org_id);
        self.load(ctx, &mut org_users).await?;
        match org_users.user_for(&new_username) {
            Some(holder) if holder != user_id => {
                return Err(Error::already_exists(
                    "COMMAND-us08",
                    "username is already taken in this org",
                ));
            }
            _ => {}
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_USERNAME_CHANGED,
            ctx.creator(),
            &user_events::UsernameChanged {
                username: new_username,
            },
        )?;
        let push = Push::single(batch).with_guard(org_users.guard());
        let pushed = self.push(ctx, push).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn change_profile(
        &self,
        ctx: &Context,
        user_id: &UserId,
        profile: Profile,
    ) -> Result<ObjectDetails> {
        if profile.first_name.is_empty() || profile.last_name.is_empty() {
            return Err(Error::invalid_argument(
                "COMMAND-us09",
                "first and last name are required",
            ));
        }
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if model.user_type != Some(UserType::Human) {
            return Err(Error::precondition_failed("COMMAND-us10", "user is not human"));
        }
        if model.profile.as_ref() == Some(&profile) {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_PROFILE_CHANGED,
            ctx.creator(),
            &user_events::ProfileChanged { profile },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn change_email(
        &self,
        ctx: &Context,
        user_id: &UserId,
        email: &str,
        verified: bool,
    ) -> Result<ObjectDetails> {
        let email = EmailAddress::parse(email)?;
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if model.user_type != Some(UserType::Human) {
            return Err(Error::precondition_failed("COMMAND-us11", "user is not human"));
        }
        if model.email.as_ref() == Some(&email) && model.email_verified == verified {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_EMAIL_CHANGED,
            ctx.creator(),
            &user_events::EmailChanged { email, verified },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn verify_email(&self, ctx: &Context, user_id: &UserId) -> Result<ObjectDetails> {
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if model.email.is_none() {
            return Err(Error::precondition_failed("COMMAND-us12", "user has no email"));
        }
        if model.email_verified {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_EMAIL_VERIFIED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn change_phone(
        &self,
        ctx: &Context,
        user_id: &UserId,
        phone: &str,
        verified: bool,
    ) -> Result<ObjectDetails> {
        let phone = PhoneNumber::parse(phone)?;
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if model.phone.as_ref() == Some(&phone) && model.phone_verified == verified {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_PHONE_CHANGED,
            ctx.creator(),
            &user_events::PhoneChanged { phone, verified },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn verify_phone(&self, ctx: &Context, user_id: &UserId) -> Result<ObjectDetails> {
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if model.phone.is_none() {
            return Err(Error::precondition_failed("COMMAND-us20", "user has no phone"));
        }
        if model.phone_verified {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_PHONE_VERIFIED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn remove_phone(&self, ctx: &Context, user_id: &UserId) -> Result<ObjectDetails> {
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if model.phone.is_none() {
            return Err(Error::not_found("COMMAND-us13", "user has no phone"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_PHONE_REMOVED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn change_machine(
        &self,
        ctx: &Context,
        user_id: &UserId,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if model.user_type != Some(UserType::Machine) {
            return Err(Error::precondition_failed("COMMAND-us14", "user is not a machine"));
        }

        let name = name.filter(|n| n != &model.machine_name);
        let description = description.filter(|d| d != &model.machine_description);
        if name.is_none() && description.is_none() {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_MACHINE_CHANGED,
            ctx.creator(),
            &user_events::MachineChanged { name, description },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn deactivate_user(&self, ctx: &Context, user_id: &UserId) -> Result<ObjectDetails> {
        self.change_user_state(
            ctx,
            user_id,
            user_events::USER_DEACTIVATED,
            UserState::Inactive,
            &[UserState::Active],
            "COMMAND-us15",
        )
        .await
    }

    pub async fn reactivate_user(&self, ctx: &Context, user_id: &UserId) -> Result<ObjectDetails> {
        self.change_user_state(
            ctx,
            user_id,
            user_events::USER_REACTIVATED,
            UserState::Active,
            &[UserState::Inactive],
            "COMMAND-us16",
        )
        .await
    }

    pub async fn lock_user(&self, ctx: &Context, user_id: &UserId) -> Result<ObjectDetails> {
        self.change_user_state(
            ctx,
            user_id,
            user_events::USER_LOCKED,
            UserState::Locked,
            &[UserState::Active, UserState::Inactive],
            "COMMAND-us17",
        )
        .await
    }

    pub async fn unlock_user(&self, ctx: &Context, user_id: &UserId) -> Result<ObjectDetails> {
        self.change_user_state(
            ctx,
            user_id,
            user_events::USER_UNLOCKED,
            UserState::Active,
            &[UserState::Locked],
            "COMMAND-us18",
        )
        .await
    }

    async fn change_user_state(
        &self,
        ctx: &Context,
        user_id: &UserId,
        event_type: idforge_events::EventType,
        target: UserState,
        allowed_from: &[UserState],
        error_id: &'static str,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;
        if model.state == target {
            return Ok(model.details());
        }
        if !allowed_from.contains(&model.state) {
            return Err(Error::precondition_failed(
                error_id,
                format!("user state {:?} does not allow this transition", model.state),
            ));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            event_type,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Remove a user. The username is carried on the event so the org fold
    /// releases it.
    pub async fn remove_user(&self, ctx: &Context, user_id: &UserId) -> Result<ObjectDetails> {
        let mut model = self.existing_user_model(ctx, user_id).await?;
        self.check_permission(ctx, PERM_USER_WRITE, &model.base().resource_owner)?;

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            user_events::USER_REMOVED,
            ctx.creator(),
            &user_events::UserRemoved {
                username: model.username.clone(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Load a user write model and require it to exist.
    pub(crate) async fn existing_user_model(
        &self,
        ctx: &Context,
        user_id: &UserId,
    ) -> Result<UserWriteModel> {
        let mut model = UserWriteModel::new(&ctx.instance_id, user_id);
        self.load(ctx, &mut model).await?;
        if !model.exists() {
            return Err(Error::not_found("COMMAND-us19", "user not found")
                .with_detail("user_id", user_id.as_str()));
        }
        Ok(model)
    }
}
