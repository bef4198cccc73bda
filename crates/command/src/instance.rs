//! Instance commands: setup, defaults, domains, features.

use idforge_core::{Context, DomainName, Error, InstanceId, Language, ObjectDetails, OrgId, Result};
use idforge_domain::events::instance as instance_events;
use idforge_domain::events::policy as policy_events;
use idforge_domain::events::AGGREGATE_INSTANCE;
use idforge_domain::{
    DomainPolicy, FeatureFlags, LockoutPolicy, LoginPolicy, PasswordComplexityPolicy, PrivacyPolicy,
};
use idforge_events::{
    Aggregate, AggregateBatch, ExpectedVersion, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::org::OrgWriteModel;
use crate::permission::PERM_INSTANCE_WRITE;
use crate::{push_details, Commands};

/// Write model over the instance aggregate.
///
/// Policy events also live on this aggregate; they are folded by the policy
/// write models and ignored here.
#[derive(Debug, Default)]
pub struct InstanceWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub exists: bool,
    pub removed: bool,
    pub name: String,
    pub default_language: Language,
    pub default_org: Option<OrgId>,
    /// `(domain, generated)` pairs.
    pub domains: Vec<(DomainName, bool)>,
    pub primary_domain: Option<DomainName>,
    pub trusted_domains: Vec<DomainName>,
    pub features: FeatureFlags,
}

impl InstanceWriteModel {
    pub fn new(instance_id: &InstanceId) -> Self {
        Self {
            base: WriteModelBase::new(instance_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::instance_scoped(AGGREGATE_INSTANCE, self.instance_id.as_str(), &self.instance_id)
    }

    pub fn has_domain(&self, domain: &DomainName) -> bool {
        self.domains.iter().any(|(d, _)| d == domain)
    }
}

impl WriteModel for InstanceWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_INSTANCE)
            .aggregate_id(self.instance_id.as_str())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&instance_events::INSTANCE_ADDED) {
            let payload: instance_events::InstanceAdded = event.payload_as()?;
            self.exists = true;
            self.name = payload.name;
            self.default_language = payload.default_language;
        } else if event.is(&instance_events::INSTANCE_CHANGED) {
            let payload: instance_events::InstanceChanged = event.payload_as()?;
            self.name = payload.name;
        } else if event.is(&instance_events::INSTANCE_REMOVED) {
            self.exists = false;
            self.removed = true;
        } else if event.is(&instance_events::INSTANCE_DEFAULT_ORG_SET) {
            let payload: instance_events::DefaultOrgSet = event.payload_as()?;
            self.default_org = Some(payload.org_id);
        } else if event.is(&instance_events::INSTANCE_DEFAULT_LANGUAGE_SET) {
            let payload: instance_events::DefaultLanguageSet = event.payload_as()?;
            self.default_language = payload.language;
        } else if event.is(&instance_events::INSTANCE_DOMAIN_ADDED) {
            let payload: instance_events::InstanceDomainAdded = event.payload_as()?;
            if !self.has_domain(&payload.domain) {
                self.domains.push((payload.domain, payload.generated));
            }
        } else if event.is(&instance_events::INSTANCE_DOMAIN_PRIMARY_SET) {
            let payload: instance_events::InstanceDomainPrimarySet = event.payload_as()?;
            self.primary_domain = Some(payload.domain);
        } else if event.is(&instance_events::INSTANCE_DOMAIN_REMOVED) {
            let payload: instance_events::InstanceDomainRemoved = event.payload_as()?;
            self.domains.retain(|(d, _)| d != &payload.domain);
            if self.primary_domain.as_ref() == Some(&payload.domain) {
                self.primary_domain = None;
            }
        } else if event.is(&instance_events::INSTANCE_TRUSTED_DOMAIN_ADDED) {
            let payload: instance_events::TrustedDomainAdded = event.payload_as()?;
            if !self.trusted_domains.contains(&payload.domain) {
                self.trusted_domains.push(payload.domain);
            }
        } else if event.is(&instance_events::INSTANCE_TRUSTED_DOMAIN_REMOVED) {
            let payload: instance_events::TrustedDomainRemoved = event.payload_as()?;
            self.trusted_domains.retain(|d| d != &payload.domain);
        } else if event.is(&instance_events::INSTANCE_FEATURES_SET) {
            let payload: instance_events::FeaturesSet = event.payload_as()?;
            self.features = payload.features;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SetupInstance {
    pub name: String,
    pub default_language: Option<String>,
    /// Instance defaults appended with the setup; unset fields use the
    /// built-in defaults.
    pub login_policy: Option<LoginPolicy>,
    pub password_complexity_policy: Option<PasswordComplexityPolicy>,
    pub lockout_policy: Option<LockoutPolicy>,
    pub privacy_policy: Option<PrivacyPolicy>,
    pub domain_policy: Option<DomainPolicy>,
}

impl Commands {
    /// Create an instance with its default policies in one atomic push.
    pub async fn setup_instance(&self, ctx: &Context, request: SetupInstance) -> Result<ObjectDetails> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::invalid_argument("COMMAND-in01", "instance name must not be empty"));
        }
        let default_language = request
            .default_language
            .map(Language::parse)
            .transpose()?
            .unwrap_or_default();
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;

        let mut model = InstanceWriteModel::new(&ctx.instance_id);
        self.load(ctx, &mut model).await?;
        if model.exists {
            return Err(Error::already_exists("COMMAND-in02", "instance already set up"));
        }

        let creator = ctx.creator();
        let batch = AggregateBatch::new(model.aggregate(), ExpectedVersion::NoStream)
            .event(
                instance_events::INSTANCE_ADDED,
                creator.clone(),
                &instance_events::InstanceAdded {
                    name,
                    default_language,
                },
            )?
            .event(
                policy_events::INSTANCE_LOGIN_POLICY_ADDED,
                creator.clone(),
                &request.login_policy.unwrap_or_default(),
            )?
            .event(
                policy_events::INSTANCE_PASSWORD_COMPLEXITY_POLICY_ADDED,
                creator.clone(),
                &request.password_complexity_policy.unwrap_or_default(),
            )?
            .event(
                policy_events::INSTANCE_LOCKOUT_POLICY_ADDED,
                creator.clone(),
                &request.lockout_policy.unwrap_or_default(),
            )?
            .event(
                policy_events::INSTANCE_PRIVACY_POLICY_ADDED,
                creator.clone(),
                &request.privacy_policy.unwrap_or_default(),
            )?
            .event(
                policy_events::INSTANCE_DOMAIN_POLICY_ADDED,
                creator,
                &request.domain_policy.unwrap_or_default(),
            )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(push_details(&pushed))
    }

    pub async fn change_instance(&self, ctx: &Context, name: &str) -> Result<ObjectDetails> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::invalid_argument("COMMAND-in03", "instance name must not be empty"));
        }
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_instance_model(ctx).await?;
        if model.name == name {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            instance_events::INSTANCE_CHANGED,
            ctx.creator(),
            &instance_events::InstanceChanged { name },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Designate the default org. It must exist and not be removed.
    pub async fn set_default_org(&self, ctx: &Context, org_id: &OrgId) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_instance_model(ctx).await?;
        if model.default_org.as_ref() == Some(org_id) {
            return Ok(model.details());
        }

        let mut org = OrgWriteModel::new(&ctx.instance_id, org_id);
        self.load(ctx, &mut org).await?;
        if !org.exists() {
            return Err(Error::precondition_failed(
                "COMMAND-in04",
                "default org must be an existing org of this instance",
            )
            .with_detail("org_id", org_id.as_str()));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            instance_events::INSTANCE_DEFAULT_ORG_SET,
            ctx.creator(),
            &instance_events::DefaultOrgSet {
                org_id: org_id.clone(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn set_default_language(&self, ctx: &Context, language: &str) -> Result<ObjectDetails> {
        let language = Language::parse(language)?;
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_instance_model(ctx).await?;
        if model.default_language == language {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            instance_events::INSTANCE_DEFAULT_LANGUAGE_SET,
            ctx.creator(),
            &instance_events::DefaultLanguageSet { language },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn add_instance_domain(
        &self,
        ctx: &Context,
        domain: &str,
        generated: bool,
    ) -> Result<ObjectDetails> {
        let domain = DomainName::parse(domain)?;
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_instance_model(ctx).await?;
        if model.has_domain(&domain) {
            return Ok(model.details());
        }

        let is_first = model.domains.is_empty();
        let creator = ctx.creator();
        let mut batch = AggregateBatch::new(model.aggregate(), model.base().expected_version())
            .event(
                instance_events::INSTANCE_DOMAIN_ADDED,
                creator.clone(),
                &instance_events::InstanceDomainAdded {
                    domain: domain.clone(),
                    generated,
                },
            )?;
        // The first domain becomes primary implicitly.
        if is_first {
            batch = batch.event(
                instance_events::INSTANCE_DOMAIN_PRIMARY_SET,
                creator,
                &instance_events::InstanceDomainPrimarySet { domain },
            )?;
        }
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn set_primary_instance_domain(
        &self,
        ctx: &Context,
        domain: &str,
    ) -> Result<ObjectDetails> {
        let domain = DomainName::parse(domain)?;
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_instance_model(ctx).await?;
        if !model.has_domain(&domain) {
            return Err(Error::not_found("COMMAND-in05", "domain not found on instance"));
        }
        if model.primary_domain.as_ref() == Some(&domain) {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            instance_events::INSTANCE_DOMAIN_PRIMARY_SET,
            ctx.creator(),
            &instance_events::InstanceDomainPrimarySet { domain },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn remove_instance_domain(&self, ctx: &Context, domain: &str) -> Result<ObjectDetails> {
        let domain = DomainName::parse(domain)?;
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_instance_model(ctx).await?;
        let Some((_, generated)) = model.domains.iter().find(|(d, _)| d == &domain) else {
            return Err(Error::not_found("COMMAND-in06", "domain not found on instance"));
        };
        if *generated {
            return Err(Error::precondition_failed(
                "COMMAND-in07",
                "generated domains cannot be removed",
            ));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            instance_events::INSTANCE_DOMAIN_REMOVED,
            ctx.creator(),
            &instance_events::InstanceDomainRemoved { domain },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn add_trusted_domain(&self, ctx: &Context, domain: &str) -> Result<ObjectDetails> {
        let domain = DomainName::parse(domain)?;
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_instance_model(ctx).await?;
        if model.trusted_domains.contains(&domain) {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            instance_events::INSTANCE_TRUSTED_DOMAIN_ADDED,
            ctx.creator(),
            &instance_events::TrustedDomainAdded { domain },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn remove_trusted_domain(&self, ctx: &Context, domain: &str) -> Result<ObjectDetails> {
        let domain = DomainName::parse(domain)?;
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_instance_model(ctx).await?;
        if !model.trusted_domains.contains(&domain) {
            return Err(Error::not_found("COMMAND-in08", "trusted domain not found"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            instance_events::INSTANCE_TRUSTED_DOMAIN_REMOVED,
            ctx.creator(),
            &instance_events::TrustedDomainRemoved { domain },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn set_instance_features(
        &self,
        ctx: &Context,
        features: FeatureFlags,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_instance_model(ctx).await?;
        if model.features == features {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            instance_events::INSTANCE_FEATURES_SET,
            ctx.creator(),
            &instance_events::FeaturesSet { features },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn remove_instance(&self, ctx: &Context) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_INSTANCE_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_instance_model(ctx).await?;

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            instance_events::INSTANCE_REMOVED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub(crate) async fn existing_instance_model(&self, ctx: &Context) -> Result<InstanceWriteModel> {
        let mut model = InstanceWriteModel::new(&ctx.instance_id);
        self.load(ctx, &mut model).await?;
        if !model.exists {
            return Err(Error::not_found("COMMAND-in09", "instance not found"));
        }
        Ok(model)
    }
}
