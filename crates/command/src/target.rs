//! Webhook target commands.
//!
//! Targets carry a 32-byte signing key. The plaintext key is returned once
//! at creation; `rotate_signing_key` on change issues a fresh one and
//! returns it once more.

use idforge_core::{Context, Error, InstanceId, ObjectDetails, OrgId, Result, TargetId};
use idforge_crypto::generate_signing_key;
use idforge_domain::events::target as target_events;
use idforge_domain::events::AGGREGATE_TARGET;
use idforge_domain::target::validate_target;
use idforge_domain::TargetType;
use idforge_events::{
    Aggregate, AggregateBatch, ExpectedVersion, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::permission::PERM_TARGET_WRITE;
use crate::{push_details, Commands};

#[derive(Debug, Default)]
pub struct TargetWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub exists: bool,
    pub removed: bool,
    pub name: String,
    pub target_type: Option<TargetType>,
    pub endpoint: String,
    pub timeout_ms: u64,
    pub interrupt_on_error: bool,
    pub signing_key: Vec<u8>,
}

impl TargetWriteModel {
    pub fn new(instance_id: &InstanceId, target_id: &TargetId) -> Self {
        Self {
            base: WriteModelBase::new(target_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            AGGREGATE_TARGET,
            self.base.aggregate_id.clone(),
            &OrgId::new(self.base.resource_owner.clone()),
            &self.instance_id,
        )
    }
}

impl WriteModel for TargetWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_TARGET)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&target_events::TARGET_ADDED) {
            let payload: target_events::TargetAdded = event.payload_as()?;
            self.exists = true;
            self.name = payload.name;
            self.target_type = Some(payload.target_type);
            self.endpoint = payload.endpoint;
            self.timeout_ms = payload.timeout_ms;
            self.interrupt_on_error = payload.interrupt_on_error;
            self.signing_key = payload.signing_key;
        } else if event.is(&target_events::TARGET_CHANGED) {
            let payload: target_events::TargetChanged = event.payload_as()?;
            if let Some(name) = payload.name {
                self.name = name;
            }
            if let Some(target_type) = payload.target_type {
                self.target_type = Some(target_type);
            }
            if let Some(endpoint) = payload.endpoint {
                self.endpoint = endpoint;
            }
            if let Some(timeout_ms) = payload.timeout_ms {
                self.timeout_ms = timeout_ms;
            }
            if let Some(interrupt_on_error) = payload.interrupt_on_error {
                self.interrupt_on_error = interrupt_on_error;
            }
        } else if event.is(&target_events::TARGET_SIGNING_KEY_SET) {
            let payload: target_events::TargetSigningKeySet = event.payload_as()?;
            self.signing_key = payload.signing_key;
        } else if event.is(&target_events::TARGET_REMOVED) {
            self.exists = false;
            self.removed = true;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AddTarget {
    pub target_id: Option<TargetId>,
    pub name: String,
    pub target_type: TargetType,
    pub endpoint: String,
    pub timeout_ms: u64,
    pub interrupt_on_error: bool,
}

#[derive(Debug, Clone)]
pub struct ChangeTarget {
    pub name: Option<String>,
    pub target_type: Option<TargetType>,
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub interrupt_on_error: Option<bool>,
    pub rotate_signing_key: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedTarget {
    pub target_id: TargetId,
    /// Plaintext signing key; visible only here.
    pub signing_key: Vec<u8>,
    pub details: ObjectDetails,
}

#[derive(Debug, Clone)]
pub struct ChangedTarget {
    /// Present when the key was rotated; visible only here.
    pub signing_key: Option<Vec<u8>>,
    pub details: ObjectDetails,
}

impl Commands {
    pub async fn add_target(&self, ctx: &Context, request: AddTarget) -> Result<CreatedTarget> {
        if request.name.trim().is_empty() {
            return Err(Error::invalid_argument("COMMAND-tg01", "target name must not be empty"));
        }
        validate_target(&request.endpoint, request.timeout_ms)?;
        self.check_permission(ctx, PERM_TARGET_WRITE, ctx.org_id.as_str())?;

        let target_id = request.target_id.unwrap_or_else(TargetId::generate);
        let mut model = TargetWriteModel::new(&ctx.instance_id, &target_id);
        self.load(ctx, &mut model).await?;
        if model.exists || model.removed {
            return Err(Error::already_exists("COMMAND-tg02", "target already exists"));
        }

        let signing_key = generate_signing_key();
        let aggregate = Aggregate::new(
            AGGREGATE_TARGET,
            target_id.as_str(),
            &ctx.org_id,
            &ctx.instance_id,
        );
        let batch = AggregateBatch::new(aggregate, ExpectedVersion::NoStream).event(
            target_events::TARGET_ADDED,
            ctx.creator(),
            &target_events::TargetAdded {
                name: request.name.trim().to_string(),
                target_type: request.target_type,
                endpoint: request.endpoint,
                timeout_ms: request.timeout_ms,
                interrupt_on_error: request.interrupt_on_error,
                signing_key: signing_key.clone(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(CreatedTarget {
            target_id,
            signing_key,
            details: push_details(&pushed),
        })
    }

    pub async fn change_target(
        &self,
        ctx: &Context,
        target_id: &TargetId,
        request: ChangeTarget,
    ) -> Result<ChangedTarget> {
        let mut model = self.existing_target_model(ctx, target_id).await?;
        self.check_permission(ctx, PERM_TARGET_WRITE, &model.base().resource_owner)?;

        if let Some(endpoint) = &request.endpoint {
            validate_target(endpoint, request.timeout_ms.unwrap_or(model.timeout_ms))?;
        } else if let Some(timeout_ms) = request.timeout_ms {
            validate_target(&model.endpoint, timeout_ms)?;
        }

        let payload = target_events::TargetChanged {
            name: request.name.filter(|n| n != &model.name),
            target_type: request.target_type.filter(|t| Some(*t) != model.target_type),
            endpoint: request.endpoint.filter(|e| e != &model.endpoint),
            timeout_ms: request.timeout_ms.filter(|t| *t != model.timeout_ms),
            interrupt_on_error: request
                .interrupt_on_error
                .filter(|i| *i != model.interrupt_on_error),
        };
        let config_unchanged = payload.name.is_none()
            && payload.target_type.is_none()
            && payload.endpoint.is_none()
            && payload.timeout_ms.is_none()
            && payload.interrupt_on_error.is_none();
        if config_unchanged && !request.rotate_signing_key {
            return Ok(ChangedTarget {
                signing_key: None,
                details: model.details(),
            });
        }

        let creator = ctx.creator();
        let mut batch = AggregateBatch::new(model.aggregate(), model.base().expected_version());
        if !config_unchanged {
            batch = batch.event(target_events::TARGET_CHANGED, creator.clone(), &payload)?;
        }
        let new_key = if request.rotate_signing_key {
            let key = generate_signing_key();
            batch = batch.event(
                target_events::TARGET_SIGNING_KEY_SET,
                creator,
                &target_events::TargetSigningKeySet {
                    signing_key: key.clone(),
                },
            )?;
            Some(key)
        } else {
            None
        };

        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(ChangedTarget {
            signing_key: new_key,
            details: model.details(),
        })
    }

    pub async fn remove_target(&self, ctx: &Context, target_id: &TargetId) -> Result<ObjectDetails> {
        let mut model = self.existing_target_model(ctx, target_id).await?;
        self.check_permission(ctx, PERM_TARGET_WRITE, &model.base().resource_owner)?;

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            target_events::TARGET_REMOVED,
            ctx.creator(),
            &target_events::TargetRemoved {
                name: model.name.clone(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub(crate) async fn existing_target_model(
        &self,
        ctx: &Context,
        target_id: &TargetId,
    ) -> Result<TargetWriteModel> {
        let mut model = TargetWriteModel::new(&ctx.instance_id, target_id);
        self.load(ctx, &mut model).await?;
        if !model.exists {
            return Err(Error::not_found("COMMAND-tg03", "target not found")
                .with_detail("target_id", target_id.as_str()));
        }
        Ok(model)
    }
}
