//! Action commands. Removal cascades into every flow trigger referencing
//! the action, atomically.

use idforge_core::{ActionId, Context, Error, InstanceId, ObjectDetails, OrgId, Result};
use idforge_domain::events::action as action_events;
use idforge_domain::events::AGGREGATE_ACTION;
use idforge_domain::ActionState;
use idforge_events::{
    Aggregate, AggregateBatch, ExpectedVersion, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::org_flow::OrgFlowsWriteModel;
use crate::permission::PERM_ACTION_WRITE;
use crate::{push_details, Commands};

#[derive(Debug, Default)]
pub struct ActionWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub state: ActionState,
    pub name: String,
    pub script: String,
    pub timeout_ms: u64,
    pub allowed_to_fail: bool,
}

impl ActionWriteModel {
    pub fn new(instance_id: &InstanceId, action_id: &ActionId) -> Self {
        Self {
            base: WriteModelBase::new(action_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            AGGREGATE_ACTION,
            self.base.aggregate_id.clone(),
            &OrgId::new(self.base.resource_owner.clone()),
            &self.instance_id,
        )
    }
}

impl WriteModel for ActionWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_ACTION)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&action_events::ACTION_ADDED) {
            let payload: action_events::ActionAdded = event.payload_as()?;
            self.state = ActionState::Active;
            self.name = payload.name;
            self.script = payload.script;
            self.timeout_ms = payload.timeout_ms;
            self.allowed_to_fail = payload.allowed_to_fail;
        } else if event.is(&action_events::ACTION_CHANGED) {
            let payload: action_events::ActionChanged = event.payload_as()?;
            if let Some(name) = payload.name {
                self.name = name;
            }
            if let Some(script) = payload.script {
                self.script = script;
            }
            if let Some(timeout_ms) = payload.timeout_ms {
                self.timeout_ms = timeout_ms;
            }
            if let Some(allowed_to_fail) = payload.allowed_to_fail {
                self.allowed_to_fail = allowed_to_fail;
            }
        } else if event.is(&action_events::ACTION_DEACTIVATED) {
            self.state = ActionState::Inactive;
        } else if event.is(&action_events::ACTION_REACTIVATED) {
            self.state = ActionState::Active;
        } else if event.is(&action_events::ACTION_REMOVED) {
            self.state = ActionState::Removed;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AddAction {
    pub action_id: Option<ActionId>,
    pub name: String,
    pub script: String,
    pub timeout_ms: u64,
    pub allowed_to_fail: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedAction {
    pub action_id: ActionId,
    pub details: ObjectDetails,
}

impl Commands {
    pub async fn add_action(&self, ctx: &Context, request: AddAction) -> Result<CreatedAction> {
        if request.name.trim().is_empty() {
            return Err(Error::invalid_argument("COMMAND-ac01", "action name must not be empty"));
        }
        if request.script.trim().is_empty() {
            return Err(Error::invalid_argument("COMMAND-ac02", "action script must not be empty"));
        }
        self.check_permission(ctx, PERM_ACTION_WRITE, ctx.org_id.as_str())?;
        self.existing_org_model(ctx, &ctx.org_id).await?;

        let action_id = request.action_id.unwrap_or_else(ActionId::generate);
        let mut model = ActionWriteModel::new(&ctx.instance_id, &action_id);
        self.load(ctx, &mut model).await?;
        if model.state != ActionState::Unspecified {
            return Err(Error::already_exists("COMMAND-ac03", "action already exists"));
        }

        let aggregate = Aggregate::new(
            AGGREGATE_ACTION,
            action_id.as_str(),
            &ctx.org_id,
            &ctx.instance_id,
        );
        let batch = AggregateBatch::new(aggregate, ExpectedVersion::NoStream).event(
            action_events::ACTION_ADDED,
            ctx.creator(),
            &action_events::ActionAdded {
                name: request.name.trim().to_string(),
                script: request.script,
                timeout_ms: request.timeout_ms,
                allowed_to_fail: request.allowed_to_fail,
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(CreatedAction {
            action_id,
            details: push_details(&pushed),
        })
    }

    pub async fn change_action(
        &self,
        ctx: &Context,
        action_id: &ActionId,
        name: Option<String>,
        script: Option<String>,
        timeout_ms: Option<u64>,
        allowed_to_fail: Option<bool>,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_action_model(ctx, action_id).await?;
        self.check_permission(ctx, PERM_ACTION_WRITE, &model.base().resource_owner)?;

        let payload = action_events::ActionChanged {
            name: name.filter(|n| n != &model.name),
            script: script.filter(|s| s != &model.script),
            timeout_ms: timeout_ms.filter(|t| *t != model.timeout_ms),
            allowed_to_fail: allowed_to_fail.filter(|a| *a != model.allowed_to_fail),
        };
        if payload.name.is_none()
            && payload.script.is_none()
            && payload.timeout_ms.is_none()
            && payload.allowed_to_fail.is_none()
        {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            action_events::ACTION_CHANGED,
            ctx.creator(),
            &payload,
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn deactivate_action(&self, ctx: &Context, action_id: &ActionId) -> Result<ObjectDetails> {
        let mut model = self.existing_action_model(ctx, action_id).await?;
        self.check_permission(ctx, PERM_ACTION_WRITE, &model.base().resource_owner)?;
        if model.state != ActionState::Active {
            return Err(Error::precondition_failed("COMMAND-ac04", "action is not active"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            action_events::ACTION_DEACTIVATED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn reactivate_action(&self, ctx: &Context, action_id: &ActionId) -> Result<ObjectDetails> {
        let mut model = self.existing_action_model(ctx, action_id).await?;
        self.check_permission(ctx, PERM_ACTION_WRITE, &model.base().resource_owner)?;
        if model.state != ActionState::Inactive {
            return Err(Error::precondition_failed("COMMAND-ac05", "action is not inactive"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            action_events::ACTION_REACTIVATED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Remove an action and, in the same push, drop it from every flow
    /// trigger of the owning org that references it.
    pub async fn remove_action(&self, ctx: &Context, action_id: &ActionId) -> Result<ObjectDetails> {
        let mut model = self.existing_action_model(ctx, action_id).await?;
        self.check_permission(ctx, PERM_ACTION_WRITE, &model.base().resource_owner)?;

        let org_id = OrgId::new(model.base().resource_owner.clone());
        let mut flows = OrgFlowsWriteModel::new(&ctx.instance_id, &org_id);
        self.load(ctx, &mut flows).await?;

        let action_batch = AggregateBatch::new(model.aggregate(), model.base().expected_version())
            .event(
                action_events::ACTION_REMOVED,
                ctx.creator(),
                &action_events::ActionRemoved {
                    name: model.name.clone(),
                },
            )?;
        let mut push = Push::single(action_batch);

        let cascades = self.flow_cascade_events(ctx, &flows, action_id)?;
        if !cascades.is_empty() {
            let mut flow_batch =
                AggregateBatch::new(flows.aggregate(), flows.base().expected_version());
            flow_batch.events = cascades;
            push = push.with_batch(flow_batch);
        }

        let pushed = self.push(ctx, push).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub(crate) async fn existing_action_model(
        &self,
        ctx: &Context,
        action_id: &ActionId,
    ) -> Result<ActionWriteModel> {
        let mut model = ActionWriteModel::new(&ctx.instance_id, action_id);
        self.load(ctx, &mut model).await?;
        if !model.state.exists() {
            return Err(Error::not_found("COMMAND-ac06", "action not found")
                .with_detail("action_id", action_id.as_str()));
        }
        Ok(model)
    }
}
