//! IDP configuration commands. Each provider is its own aggregate, owned
//! by an org or by the instance (org scope equals the instance id).

use idforge_core::{Context, Error, IdpId, InstanceId, ObjectDetails, OrgId, Result};
use idforge_domain::events::idp as idp_events;
use idforge_domain::events::AGGREGATE_IDP;
use idforge_domain::{IdpConfig, IdpState, ProvisioningOptions};
use idforge_events::{
    Aggregate, AggregateBatch, ExpectedVersion, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_eventstore::append_and_reduce;
use idforge_idp::saml::parse_metadata;

use crate::permission::PERM_IDP_WRITE;
use crate::{push_details, Commands};

#[derive(Debug, Default)]
pub struct IdpWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub state: IdpState,
    pub name: String,
    pub options: ProvisioningOptions,
    pub config: Option<IdpConfig>,
}

impl IdpWriteModel {
    pub fn new(instance_id: &InstanceId, idp_id: &IdpId) -> Self {
        Self {
            base: WriteModelBase::new(idp_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            AGGREGATE_IDP,
            self.base.aggregate_id.clone(),
            &OrgId::new(self.base.resource_owner.clone()),
            &self.instance_id,
        )
    }
}

impl WriteModel for IdpWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_IDP)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&idp_events::IDP_ADDED) {
            let payload: idp_events::IdpAdded = event.payload_as()?;
            self.state = IdpState::Active;
            self.name = payload.name;
            self.options = payload.options;
            self.config = Some(payload.config);
        } else if event.is(&idp_events::IDP_CHANGED) {
            let payload: idp_events::IdpChanged = event.payload_as()?;
            if let Some(name) = payload.name {
                self.name = name;
            }
            if let Some(options) = payload.options {
                self.options = options;
            }
        } else if event.is(&idp_events::IDP_CONFIG_CHANGED) {
            let payload: idp_events::IdpConfigChanged = event.payload_as()?;
            self.config = Some(payload.config);
        } else if event.is(&idp_events::IDP_REMOVED) {
            self.state = IdpState::Removed;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AddIdp {
    pub idp_id: Option<IdpId>,
    pub name: String,
    pub config: IdpConfig,
    pub options: ProvisioningOptions,
}

#[derive(Debug, Clone)]
pub struct CreatedIdp {
    pub idp_id: IdpId,
    pub details: ObjectDetails,
}

/// Validation beyond the per-variant field checks: inline SAML metadata
/// must carry an `EntityDescriptor`.
fn validate_config(config: &IdpConfig) -> Result<()> {
    config.validate()?;
    if let IdpConfig::Saml(saml) = config {
        if !saml.metadata_xml.is_empty() {
            parse_metadata(&saml.metadata_xml)?;
        }
    }
    Ok(())
}

impl Commands {
    pub async fn add_idp(&self, ctx: &Context, request: AddIdp) -> Result<CreatedIdp> {
        if request.name.trim().is_empty() {
            return Err(Error::invalid_argument("COMMAND-ip01", "idp name must not be empty"));
        }
        validate_config(&request.config)?;
        self.check_permission(ctx, PERM_IDP_WRITE, ctx.org_id.as_str())?;
        if ctx.org_id.as_str() != ctx.instance_id.as_str() {
            self.existing_org_model(ctx, &ctx.org_id).await?;
        }

        let idp_id = request.idp_id.unwrap_or_else(IdpId::generate);
        let mut model = IdpWriteModel::new(&ctx.instance_id, &idp_id);
        self.load(ctx, &mut model).await?;
        if model.state != IdpState::Unspecified {
            return Err(Error::already_exists("COMMAND-ip02", "idp already exists")
                .with_detail("idp_id", idp_id.as_str()));
        }

        let aggregate = Aggregate::new(AGGREGATE_IDP, idp_id.as_str(), &ctx.org_id, &ctx.instance_id);
        let batch = AggregateBatch::new(aggregate, ExpectedVersion::NoStream).event(
            idp_events::IDP_ADDED,
            ctx.creator(),
            &idp_events::IdpAdded {
                name: request.name.trim().to_string(),
                config: request.config,
                options: request.options,
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(CreatedIdp {
            idp_id,
            details: push_details(&pushed),
        })
    }

    pub async fn change_idp(
        &self,
        ctx: &Context,
        idp_id: &IdpId,
        name: Option<String>,
        options: Option<ProvisioningOptions>,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_idp_model(ctx, idp_id).await?;
        self.check_permission(ctx, PERM_IDP_WRITE, &model.base().resource_owner)?;

        let payload = idp_events::IdpChanged {
            name: name.filter(|n| n != &model.name),
            options: options.filter(|o| o != &model.options),
        };
        if payload.name.is_none() && payload.options.is_none() {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            idp_events::IDP_CHANGED,
            ctx.creator(),
            &payload,
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Replace the type-specific configuration. The variant may not change
    /// type (an OIDC idp stays OIDC).
    pub async fn change_idp_config(
        &self,
        ctx: &Context,
        idp_id: &IdpId,
        config: IdpConfig,
    ) -> Result<ObjectDetails> {
        validate_config(&config)?;
        let mut model = self.existing_idp_model(ctx, idp_id).await?;
        self.check_permission(ctx, PERM_IDP_WRITE, &model.base().resource_owner)?;

        match &model.config {
            Some(current) if current.idp_type() != config.idp_type() => {
                return Err(Error::precondition_failed(
                    "COMMAND-ip03",
                    "idp type cannot be changed",
                ));
            }
            Some(current) if current == &config => return Ok(model.details()),
            _ => {}
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            idp_events::IDP_CONFIG_CHANGED,
            ctx.creator(),
            &idp_events::IdpConfigChanged { config },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Remove an idp. Removing an already-removed or unknown idp returns
    /// the current details (idempotent).
    pub async fn remove_idp(&self, ctx: &Context, idp_id: &IdpId) -> Result<ObjectDetails> {
        let mut model = IdpWriteModel::new(&ctx.instance_id, idp_id);
        self.load(ctx, &mut model).await?;
        if model.state != IdpState::Active {
            return Ok(model.details());
        }
        self.check_permission(ctx, PERM_IDP_WRITE, &model.base().resource_owner)?;

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            idp_events::IDP_REMOVED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub(crate) async fn existing_idp_model(
        &self,
        ctx: &Context,
        idp_id: &IdpId,
    ) -> Result<IdpWriteModel> {
        let mut model = IdpWriteModel::new(&ctx.instance_id, idp_id);
        self.load(ctx, &mut model).await?;
        if model.state != IdpState::Active {
            return Err(Error::not_found("COMMAND-ip04", "idp not found")
                .with_detail("idp_id", idp_id.as_str()));
        }
        Ok(model)
    }
}
