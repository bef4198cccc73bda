//! Policy commands.
//!
//! Every policy follows the same two-level scheme: an instance default on
//! the instance aggregate and an optional org override on the org
//! aggregate. Changing a default that was never added fails with
//! `PreconditionFailed`, which pushes callers towards org-level overrides.
//! The login policy additionally owns its second/multi factor sets.

use serde::de::DeserializeOwned;
use serde::Serialize;

use idforge_core::{Context, Error, InstanceId, ObjectDetails, OrgId, Result};
use idforge_domain::events::policy as policy_events;
use idforge_domain::events::{AGGREGATE_INSTANCE, AGGREGATE_ORG};
use idforge_domain::{
    DomainPolicy, LabelPolicy, LockoutPolicy, LoginPolicy, MultiFactorType,
    PasswordAgePolicy, PasswordComplexityPolicy, PrivacyPolicy, SecondFactorType, SecurityPolicy,
};
use idforge_events::{
    Aggregate, AggregateBatch, EventType, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::permission::PERM_POLICY_WRITE;
use crate::Commands;

/// Which aggregate a policy operation addresses.
#[derive(Debug, Clone, Copy)]
pub enum PolicyScope<'a> {
    Instance,
    Org(&'a OrgId),
}

impl PolicyScope<'_> {
    fn aggregate(&self, instance_id: &InstanceId) -> Aggregate {
        match self {
            Self::Instance => {
                Aggregate::instance_scoped(AGGREGATE_INSTANCE, instance_id.as_str(), instance_id)
            }
            Self::Org(org_id) => {
                Aggregate::new(AGGREGATE_ORG, org_id.as_str(), org_id, instance_id)
            }
        }
    }

    fn owner(&self, ctx: &Context) -> String {
        match self {
            Self::Instance => ctx.instance_id.as_str().to_string(),
            Self::Org(org_id) => org_id.as_str().to_string(),
        }
    }
}

/// The three event types a policy level uses. `removed` is `None` at the
/// instance level (defaults cannot be dropped, only changed).
#[derive(Debug, Clone)]
pub(crate) struct PolicyEventTypes {
    added: EventType,
    changed: EventType,
    removed: Option<EventType>,
}

/// Generic fold of one policy on a shared aggregate. Folds the whole
/// aggregate stream so its sequence is the true head; reduces only its own
/// event types.
pub(crate) struct PolicyWriteModel<P> {
    base: WriteModelBase,
    instance_id: InstanceId,
    aggregate: Aggregate,
    events: PolicyEventTypes,
    pub policy: Option<P>,
}

impl<P: DeserializeOwned> PolicyWriteModel<P> {
    fn new(instance_id: &InstanceId, aggregate: Aggregate, events: PolicyEventTypes) -> Self {
        Self {
            base: WriteModelBase::new(aggregate.id.clone()),
            instance_id: instance_id.clone(),
            aggregate,
            events,
            policy: None,
        }
    }
}

impl<P: DeserializeOwned + Send> WriteModel for PolicyWriteModel<P> {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(self.aggregate.ty.clone())
            .aggregate_id(self.aggregate.id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&self.events.added) || event.is(&self.events.changed) {
            self.policy = Some(event.payload_as()?);
        } else if self.events.removed.as_ref().is_some_and(|t| event.is(t)) {
            self.policy = None;
        }
        Ok(())
    }
}

impl Commands {
    async fn policy_model<P: DeserializeOwned + PartialEq + Send>(
        &self,
        ctx: &Context,
        scope: PolicyScope<'_>,
        events: PolicyEventTypes,
    ) -> Result<PolicyWriteModel<P>> {
        match scope {
            PolicyScope::Instance => {
                self.existing_instance_model(ctx).await?;
            }
            PolicyScope::Org(org_id) => {
                self.existing_org_model(ctx, org_id).await?;
            }
        }
        let mut model = PolicyWriteModel::new(&ctx.instance_id, scope.aggregate(&ctx.instance_id), events);
        self.load(ctx, &mut model).await?;
        Ok(model)
    }

    async fn add_policy<P>(
        &self,
        ctx: &Context,
        scope: PolicyScope<'_>,
        events: PolicyEventTypes,
        policy: P,
    ) -> Result<ObjectDetails>
    where
        P: Serialize + DeserializeOwned + PartialEq + Send,
    {
        self.check_permission(ctx, PERM_POLICY_WRITE, &scope.owner(ctx))?;
        let added = events.added.clone();
        let mut model = self.policy_model::<P>(ctx, scope, events).await?;
        if model.policy.is_some() {
            return Err(Error::already_exists("COMMAND-pl01", "policy already exists"));
        }

        let batch = AggregateBatch::new(model.aggregate.clone(), model.base().expected_version())
            .event(added, ctx.creator(), &policy)?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    async fn change_policy<P>(
        &self,
        ctx: &Context,
        scope: PolicyScope<'_>,
        events: PolicyEventTypes,
        policy: P,
    ) -> Result<ObjectDetails>
    where
        P: Serialize + DeserializeOwned + PartialEq + Send,
    {
        self.check_permission(ctx, PERM_POLICY_WRITE, &scope.owner(ctx))?;
        let changed = events.changed.clone();
        let mut model = self.policy_model::<P>(ctx, scope, events).await?;
        let Some(current) = &model.policy else {
            return Err(Error::precondition_failed(
                "COMMAND-pl02",
                "policy does not exist on this level",
            ));
        };
        if current == &policy {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate.clone(), model.base().expected_version())
            .event(changed, ctx.creator(), &policy)?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    async fn remove_org_policy<P>(
        &self,
        ctx: &Context,
        org_id: &OrgId,
        events: PolicyEventTypes,
    ) -> Result<ObjectDetails>
    where
        P: Serialize + DeserializeOwned + PartialEq + Send,
    {
        self.check_permission(ctx, PERM_POLICY_WRITE, org_id.as_str())?;
        let removed = events
            .removed
            .clone()
            .expect("org policies always carry a removed event type");
        let mut model = self
            .policy_model::<P>(ctx, PolicyScope::Org(org_id), events)
            .await?;
        if model.policy.is_none() {
            return Err(Error::not_found("COMMAND-pl03", "policy override not found"));
        }

        let batch = AggregateBatch::new(model.aggregate.clone(), model.base().expected_version())
            .event(removed, ctx.creator(), &policy_events::PolicyRemoved {})?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }
}

macro_rules! policy_commands {
    (
        $policy:ty,
        $add_default:ident, $change_default:ident,
        $add_org:ident, $change_org:ident, $remove_org:ident,
        $default_added:expr, $default_changed:expr,
        $org_added:expr, $org_changed:expr, $org_removed:expr
    ) => {
        impl Commands {
            pub async fn $add_default(&self, ctx: &Context, policy: $policy) -> Result<ObjectDetails> {
                self.add_policy(
                    ctx,
                    PolicyScope::Instance,
                    PolicyEventTypes {
                        added: $default_added,
                        changed: $default_changed,
                        removed: None,
                    },
                    policy,
                )
                .await
            }

            pub async fn $change_default(
                &self,
                ctx: &Context,
                policy: $policy,
            ) -> Result<ObjectDetails> {
                self.change_policy(
                    ctx,
                    PolicyScope::Instance,
                    PolicyEventTypes {
                        added: $default_added,
                        changed: $default_changed,
                        removed: None,
                    },
                    policy,
                )
                .await
            }

            pub async fn $add_org(
                &self,
                ctx: &Context,
                org_id: &OrgId,
                policy: $policy,
            ) -> Result<ObjectDetails> {
                self.add_policy(
                    ctx,
                    PolicyScope::Org(org_id),
                    PolicyEventTypes {
                        added: $org_added,
                        changed: $org_changed,
                        removed: Some($org_removed),
                    },
                    policy,
                )
                .await
            }

            pub async fn $change_org(
                &self,
                ctx: &Context,
                org_id: &OrgId,
                policy: $policy,
            ) -> Result<ObjectDetails> {
                self.change_policy(
                    ctx,
                    PolicyScope::Org(org_id),
                    PolicyEventTypes {
                        added: $org_added,
                        changed: $org_changed,
                        removed: Some($org_removed),
                    },
                    policy,
                )
                .await
            }

            pub async fn $remove_org(&self, ctx: &Context, org_id: &OrgId) -> Result<ObjectDetails> {
                self.remove_org_policy::<$policy>(
                    ctx,
                    org_id,
                    PolicyEventTypes {
                        added: $org_added,
                        changed: $org_changed,
                        removed: Some($org_removed),
                    },
                )
                .await
            }
        }
    };
}

policy_commands!(
    LoginPolicy,
    add_default_login_policy,
    change_default_login_policy,
    add_org_login_policy,
    change_org_login_policy,
    remove_org_login_policy,
    policy_events::INSTANCE_LOGIN_POLICY_ADDED,
    policy_events::INSTANCE_LOGIN_POLICY_CHANGED,
    policy_events::ORG_LOGIN_POLICY_ADDED,
    policy_events::ORG_LOGIN_POLICY_CHANGED,
    policy_events::ORG_LOGIN_POLICY_REMOVED
);

policy_commands!(
    PasswordComplexityPolicy,
    add_default_password_complexity_policy,
    change_default_password_complexity_policy,
    add_org_password_complexity_policy,
    change_org_password_complexity_policy,
    remove_org_password_complexity_policy,
    policy_events::INSTANCE_PASSWORD_COMPLEXITY_POLICY_ADDED,
    policy_events::INSTANCE_PASSWORD_COMPLEXITY_POLICY_CHANGED,
    policy_events::ORG_PASSWORD_COMPLEXITY_POLICY_ADDED,
    policy_events::ORG_PASSWORD_COMPLEXITY_POLICY_CHANGED,
    policy_events::ORG_PASSWORD_COMPLEXITY_POLICY_REMOVED
);

policy_commands!(
    PasswordAgePolicy,
    add_default_password_age_policy,
    change_default_password_age_policy,
    add_org_password_age_policy,
    change_org_password_age_policy,
    remove_org_password_age_policy,
    policy_events::INSTANCE_PASSWORD_AGE_POLICY_ADDED,
    policy_events::INSTANCE_PASSWORD_AGE_POLICY_CHANGED,
    policy_events::ORG_PASSWORD_AGE_POLICY_ADDED,
    policy_events::ORG_PASSWORD_AGE_POLICY_CHANGED,
    policy_events::ORG_PASSWORD_AGE_POLICY_REMOVED
);

policy_commands!(
    LockoutPolicy,
    add_default_lockout_policy,
    change_default_lockout_policy,
    add_org_lockout_policy,
    change_org_lockout_policy,
    remove_org_lockout_policy,
    policy_events::INSTANCE_LOCKOUT_POLICY_ADDED,
    policy_events::INSTANCE_LOCKOUT_POLICY_CHANGED,
    policy_events::ORG_LOCKOUT_POLICY_ADDED,
    policy_events::ORG_LOCKOUT_POLICY_CHANGED,
    policy_events::ORG_LOCKOUT_POLICY_REMOVED
);

policy_commands!(
    PrivacyPolicy,
    add_default_privacy_policy,
    change_default_privacy_policy,
    add_org_privacy_policy,
    change_org_privacy_policy,
    remove_org_privacy_policy,
    policy_events::INSTANCE_PRIVACY_POLICY_ADDED,
    policy_events::INSTANCE_PRIVACY_POLICY_CHANGED,
    policy_events::ORG_PRIVACY_POLICY_ADDED,
    policy_events::ORG_PRIVACY_POLICY_CHANGED,
    policy_events::ORG_PRIVACY_POLICY_REMOVED
);

policy_commands!(
    LabelPolicy,
    add_default_label_policy,
    change_default_label_policy,
    add_org_label_policy,
    change_org_label_policy,
    remove_org_label_policy,
    policy_events::INSTANCE_LABEL_POLICY_ADDED,
    policy_events::INSTANCE_LABEL_POLICY_CHANGED,
    policy_events::ORG_LABEL_POLICY_ADDED,
    policy_events::ORG_LABEL_POLICY_CHANGED,
    policy_events::ORG_LABEL_POLICY_REMOVED
);

policy_commands!(
    DomainPolicy,
    add_default_domain_policy,
    change_default_domain_policy,
    add_org_domain_policy,
    change_org_domain_policy,
    remove_org_domain_policy,
    policy_events::INSTANCE_DOMAIN_POLICY_ADDED,
    policy_events::INSTANCE_DOMAIN_POLICY_CHANGED,
    policy_events::ORG_DOMAIN_POLICY_ADDED,
    policy_events::ORG_DOMAIN_POLICY_CHANGED,
    policy_events::ORG_DOMAIN_POLICY_REMOVED
);

/// Login-policy factor fold: the factor sets of one level.
struct LoginFactorsWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    aggregate: Aggregate,
    prefix: &'static str,
    second_factors: Vec<SecondFactorType>,
    multi_factors: Vec<MultiFactorType>,
    policy_exists: bool,
}

impl LoginFactorsWriteModel {
    fn new(instance_id: &InstanceId, scope: PolicyScope<'_>) -> Self {
        let aggregate = scope.aggregate(instance_id);
        let prefix = match scope {
            PolicyScope::Instance => "instance.policy.login",
            PolicyScope::Org(_) => "org.policy.login",
        };
        Self {
            base: WriteModelBase::new(aggregate.id.clone()),
            instance_id: instance_id.clone(),
            aggregate,
            prefix,
            second_factors: Vec::new(),
            multi_factors: Vec::new(),
            policy_exists: false,
        }
    }
}

impl WriteModel for LoginFactorsWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(self.aggregate.ty.clone())
            .aggregate_id(self.aggregate.id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        let ty = event.event_type.as_str();
        let Some(suffix) = ty.strip_prefix(self.prefix) else {
            return Ok(());
        };
        match suffix {
            ".added" => self.policy_exists = true,
            ".removed" => {
                self.policy_exists = false;
                self.second_factors.clear();
                self.multi_factors.clear();
            }
            ".second_factor.added" => {
                let payload: policy_events::SecondFactorPayload = event.payload_as()?;
                if !self.second_factors.contains(&payload.factor) {
                    self.second_factors.push(payload.factor);
                }
            }
            ".second_factor.removed" => {
                let payload: policy_events::SecondFactorPayload = event.payload_as()?;
                self.second_factors.retain(|f| *f != payload.factor);
            }
            ".multi_factor.added" => {
                let payload: policy_events::MultiFactorPayload = event.payload_as()?;
                if !self.multi_factors.contains(&payload.factor) {
                    self.multi_factors.push(payload.factor);
                }
            }
            ".multi_factor.removed" => {
                let payload: policy_events::MultiFactorPayload = event.payload_as()?;
                self.multi_factors.retain(|f| *f != payload.factor);
            }
            _ => {}
        }
        Ok(())
    }
}

impl Commands {
    async fn change_login_factor(
        &self,
        ctx: &Context,
        scope: PolicyScope<'_>,
        event_suffix: &str,
        apply: impl FnOnce(&mut LoginFactorsWriteModel) -> Result<Option<serde_json::Value>>,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_POLICY_WRITE, &scope.owner(ctx))?;
        let mut model = LoginFactorsWriteModel::new(&ctx.instance_id, scope);
        self.load(ctx, &mut model).await?;
        if !model.policy_exists {
            return Err(Error::precondition_failed(
                "COMMAND-pl04",
                "login policy does not exist on this level",
            ));
        }

        let Some(payload) = apply(&mut model)? else {
            return Ok(model.details());
        };
        let event_type = EventType::new(format!("{}{}", model.prefix, event_suffix));
        let batch = AggregateBatch::new(model.aggregate.clone(), model.base().expected_version())
            .event(event_type, ctx.creator(), &payload)?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn add_second_factor_to_login_policy(
        &self,
        ctx: &Context,
        scope: PolicyScope<'_>,
        factor: SecondFactorType,
    ) -> Result<ObjectDetails> {
        self.change_login_factor(ctx, scope, ".second_factor.added", move |model| {
            if model.second_factors.contains(&factor) {
                return Ok(None);
            }
            to_payload(&policy_events::SecondFactorPayload { factor }).map(Some)
        })
        .await
    }

    pub async fn remove_second_factor_from_login_policy(
        &self,
        ctx: &Context,
        scope: PolicyScope<'_>,
        factor: SecondFactorType,
    ) -> Result<ObjectDetails> {
        self.change_login_factor(ctx, scope, ".second_factor.removed", move |model| {
            if !model.second_factors.contains(&factor) {
                return Err(Error::not_found("COMMAND-pl05", "second factor not enabled"));
            }
            to_payload(&policy_events::SecondFactorPayload { factor }).map(Some)
        })
        .await
    }

    pub async fn add_multi_factor_to_login_policy(
        &self,
        ctx: &Context,
        scope: PolicyScope<'_>,
        factor: MultiFactorType,
    ) -> Result<ObjectDetails> {
        self.change_login_factor(ctx, scope, ".multi_factor.added", move |model| {
            if model.multi_factors.contains(&factor) {
                return Ok(None);
            }
            to_payload(&policy_events::MultiFactorPayload { factor }).map(Some)
        })
        .await
    }

    pub async fn remove_multi_factor_from_login_policy(
        &self,
        ctx: &Context,
        scope: PolicyScope<'_>,
        factor: MultiFactorType,
    ) -> Result<ObjectDetails> {
        self.change_login_factor(ctx, scope, ".multi_factor.removed", move |model| {
            if !model.multi_factors.contains(&factor) {
                return Err(Error::not_found("COMMAND-pl06", "multi factor not enabled"));
            }
            to_payload(&policy_events::MultiFactorPayload { factor }).map(Some)
        })
        .await
    }

    /// Security policy exists only at the instance level; set is an upsert.
    pub async fn set_security_policy(
        &self,
        ctx: &Context,
        policy: SecurityPolicy,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_POLICY_WRITE, ctx.instance_id.as_str())?;
        let mut model = self
            .policy_model::<SecurityPolicy>(
                ctx,
                PolicyScope::Instance,
                PolicyEventTypes {
                    added: policy_events::INSTANCE_SECURITY_POLICY_SET,
                    changed: policy_events::INSTANCE_SECURITY_POLICY_SET,
                    removed: None,
                },
            )
            .await?;
        if model.policy.as_ref() == Some(&policy) {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate.clone(), model.base().expected_version())
            .event(policy_events::INSTANCE_SECURITY_POLICY_SET, ctx.creator(), &policy)?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }
}

fn to_payload<T: serde::Serialize>(payload: &T) -> Result<serde_json::Value> {
    serde_json::to_value(payload)
        .map_err(|e| Error::internal("COMMAND-pl07", format!("payload serialization failed: {e}")))
}
