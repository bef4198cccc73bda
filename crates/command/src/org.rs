//! Org commands: lifecycle and domains.

use idforge_core::{Context, DomainName, Error, InstanceId, ObjectDetails, OrgId, Result};
use idforge_domain::events::org as org_events;
use idforge_domain::events::AGGREGATE_ORG;
use idforge_events::{
    Aggregate, AggregateBatch, ExpectedVersion, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::permission::PERM_ORG_WRITE;
use crate::{push_details, Commands};

pub use idforge_domain::OrgState;

/// Write model over one org aggregate.
///
/// The org aggregate also carries policy and flow events; this model folds
/// the whole stream (so its sequence is the aggregate head) and ignores
/// everything that is not org lifecycle or domain state.
#[derive(Debug, Default)]
pub struct OrgWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub state: OrgState,
    pub name: String,
    pub domains: Vec<DomainName>,
    pub verified_domains: Vec<DomainName>,
    pub primary_domain: Option<DomainName>,
}

impl OrgWriteModel {
    pub fn new(instance_id: &InstanceId, org_id: &OrgId) -> Self {
        Self {
            base: WriteModelBase::new(org_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        let org_id = OrgId::new(self.base.aggregate_id.clone());
        Aggregate::new(AGGREGATE_ORG, org_id.as_str(), &org_id, &self.instance_id)
    }

    pub fn exists(&self) -> bool {
        self.state.exists()
    }

    pub fn has_domain(&self, domain: &DomainName) -> bool {
        self.domains.contains(domain)
    }

    pub fn is_verified(&self, domain: &DomainName) -> bool {
        self.verified_domains.contains(domain)
    }
}

impl WriteModel for OrgWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_ORG)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&org_events::ORG_ADDED) {
            let payload: org_events::OrgAdded = event.payload_as()?;
            self.name = payload.name;
            self.state = OrgState::Active;
        } else if event.is(&org_events::ORG_CHANGED) {
            let payload: org_events::OrgChanged = event.payload_as()?;
            self.name = payload.name;
        } else if event.is(&org_events::ORG_DEACTIVATED) {
            self.state = OrgState::Inactive;
        } else if event.is(&org_events::ORG_REACTIVATED) {
            self.state = OrgState::Active;
        } else if event.is(&org_events::ORG_REMOVED) {
            self.state = OrgState::Removed;
        } else if event.is(&org_events::ORG_DOMAIN_ADDED) {
            let payload: org_events::OrgDomainAdded = event.payload_as()?;
            if !self.domains.contains(&payload.domain) {
                self.domains.push(payload.domain);
            }
        } else if event.is(&org_events::ORG_DOMAIN_VERIFIED) {
            let payload: org_events::OrgDomainVerified = event.payload_as()?;
            if !self.verified_domains.contains(&payload.domain) {
                self.verified_domains.push(payload.domain);
            }
        } else if event.is(&org_events::ORG_DOMAIN_PRIMARY_SET) {
            let payload: org_events::OrgDomainPrimarySet = event.payload_as()?;
            self.primary_domain = Some(payload.domain);
        } else if event.is(&org_events::ORG_DOMAIN_REMOVED) {
            let payload: org_events::OrgDomainRemoved = event.payload_as()?;
            self.domains.retain(|d| d != &payload.domain);
            self.verified_domains.retain(|d| d != &payload.domain);
            if self.primary_domain.as_ref() == Some(&payload.domain) {
                self.primary_domain = None;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AddOrg {
    pub org_id: Option<OrgId>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct CreatedOrg {
    pub org_id: OrgId,
    pub details: ObjectDetails,
}

impl Commands {
    pub async fn add_org(&self, ctx: &Context, request: AddOrg) -> Result<CreatedOrg> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::invalid_argument("COMMAND-or01", "org name must not be empty"));
        }
        self.check_permission(ctx, PERM_ORG_WRITE, ctx.instance_id.as_str())?;

        let org_id = request.org_id.unwrap_or_else(OrgId::generate);
        let mut model = OrgWriteModel::new(&ctx.instance_id, &org_id);
        self.load(ctx, &mut model).await?;
        if model.state != OrgState::Unspecified {
            return Err(Error::already_exists("COMMAND-or02", "org already exists")
                .with_detail("org_id", org_id.as_str()));
        }

        let batch = AggregateBatch::new(model.aggregate(), ExpectedVersion::NoStream).event(
            org_events::ORG_ADDED,
            ctx.creator(),
            &org_events::OrgAdded { name },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(CreatedOrg {
            org_id,
            details: push_details(&pushed),
        })
    }

    pub async fn change_org(&self, ctx: &Context, org_id: &OrgId, name: &str) -> Result<ObjectDetails> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::invalid_argument("COMMAND-or03", "org name must not be empty"));
        }
        self.check_permission(ctx, PERM_ORG_WRITE, org_id.as_str())?;

        let mut model = self.existing_org_model(ctx, org_id).await?;
        if model.name == name {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            org_events::ORG_CHANGED,
            ctx.creator(),
            &org_events::OrgChanged { name },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn deactivate_org(&self, ctx: &Context, org_id: &OrgId) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_ORG_WRITE, org_id.as_str())?;
        let mut model = self.existing_org_model(ctx, org_id).await?;
        if model.state == OrgState::Inactive {
            return Err(Error::precondition_failed("COMMAND-or04", "org is already inactive"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            org_events::ORG_DEACTIVATED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn reactivate_org(&self, ctx: &Context, org_id: &OrgId) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_ORG_WRITE, org_id.as_str())?;
        let mut model = self.existing_org_model(ctx, org_id).await?;
        if model.state == OrgState::Active {
            return Err(Error::precondition_failed("COMMAND-or05", "org is already active"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            org_events::ORG_REACTIVATED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Remove an org. Usernames and domains owned by the org are released
    /// by virtue of the removal event: the org-scoped folds treat the org
    /// as gone.
    pub async fn remove_org(&self, ctx: &Context, org_id: &OrgId) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_ORG_WRITE, ctx.instance_id.as_str())?;
        let mut model = self.existing_org_model(ctx, org_id).await?;

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            org_events::ORG_REMOVED,
            ctx.creator(),
            &org_events::OrgRemoved {
                name: model.name.clone(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn add_org_domain(
        &self,
        ctx: &Context,
        org_id: &OrgId,
        domain: &str,
    ) -> Result<ObjectDetails> {
        let domain = DomainName::parse(domain)?;
        self.check_permission(ctx, PERM_ORG_WRITE, org_id.as_str())?;
        let mut model = self.existing_org_model(ctx, org_id).await?;
        if model.has_domain(&domain) {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            org_events::ORG_DOMAIN_ADDED,
            ctx.creator(),
            &org_events::OrgDomainAdded { domain },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn verify_org_domain(
        &self,
        ctx: &Context,
        org_id: &OrgId,
        domain: &str,
    ) -> Result<ObjectDetails> {
        let domain = DomainName::parse(domain)?;
        self.check_permission(ctx, PERM_ORG_WRITE, org_id.as_str())?;
        let mut model = self.existing_org_model(ctx, org_id).await?;
        if !model.has_domain(&domain) {
            return Err(Error::not_found("COMMAND-or06", "domain not found on org")
                .with_detail("domain", domain.as_str()));
        }
        if model.is_verified(&domain) {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            org_events::ORG_DOMAIN_VERIFIED,
            ctx.creator(),
            &org_events::OrgDomainVerified { domain },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn set_primary_org_domain(
        &self,
        ctx: &Context,
        org_id: &OrgId,
        domain: &str,
    ) -> Result<ObjectDetails> {
        let domain = DomainName::parse(domain)?;
        self.check_permission(ctx, PERM_ORG_WRITE, org_id.as_str())?;
        let mut model = self.existing_org_model(ctx, org_id).await?;
        if !model.is_verified(&domain) {
            return Err(Error::precondition_failed(
                "COMMAND-or07",
                "only verified domains can be primary",
            ));
        }
        if model.primary_domain.as_ref() == Some(&domain) {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            org_events::ORG_DOMAIN_PRIMARY_SET,
            ctx.creator(),
            &org_events::OrgDomainPrimarySet { domain },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn remove_org_domain(
        &self,
        ctx: &Context,
        org_id: &OrgId,
        domain: &str,
    ) -> Result<ObjectDetails> {
        let domain = DomainName::parse(domain)?;
        self.check_permission(ctx, PERM_ORG_WRITE, org_id.as_str())?;
        let mut model = self.existing_org_model(ctx, org_id).await?;
        if !model.has_domain(&domain) {
            return Err(Error::not_found("COMMAND-or08", "domain not found on org")
                .with_detail("domain", domain.as_str()));
        }
        if model.primary_domain.as_ref() == Some(&domain) {
            return Err(Error::precondition_failed(
                "COMMAND-or09",
                "the primary domain cannot be removed",
            ));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            org_events::ORG_DOMAIN_REMOVED,
            ctx.creator(),
            &org_events::OrgDomainRemoved { domain },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Load an org write model and require it to exist (not removed).
    pub(crate) async fn existing_org_model(
        &self,
        ctx: &Context,
        org_id: &OrgId,
    ) -> Result<OrgWriteModel> {
        let mut model = OrgWriteModel::new(&ctx.instance_id, org_id);
        self.load(ctx, &mut model).await?;
        if !model.exists() {
            return Err(Error::not_found("COMMAND-or10", "org not found")
                .with_detail("org_id", org_id.as_str()));
        }
        Ok(model)
    }
}
