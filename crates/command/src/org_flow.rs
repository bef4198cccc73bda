//! Action flows on the org aggregate.

use std::collections::HashMap;

use idforge_core::{ActionId, Context, Error, InstanceId, ObjectDetails, OrgId, Result};
use idforge_domain::events::org as org_events;
use idforge_domain::events::AGGREGATE_ORG;
use idforge_domain::{FlowType, TriggerType};
use idforge_events::{
    Aggregate, AggregateBatch, PendingEvent, SearchQuery, StoredEvent, WriteModel, WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::permission::PERM_ACTION_WRITE;
use crate::Commands;

/// Folds the flow configuration of one org: which actions run on which
/// trigger.
#[derive(Debug, Default)]
pub struct OrgFlowsWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub triggers: HashMap<(FlowType, TriggerType), Vec<ActionId>>,
}

impl OrgFlowsWriteModel {
    pub fn new(instance_id: &InstanceId, org_id: &OrgId) -> Self {
        Self {
            base: WriteModelBase::new(org_id.as_str()),
            instance_id: instance_id.clone(),
            triggers: HashMap::new(),
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        let org_id = OrgId::new(self.base.aggregate_id.clone());
        Aggregate::new(AGGREGATE_ORG, org_id.as_str(), &org_id, &self.instance_id)
    }

    /// Triggers referencing an action, for removal cascades.
    pub fn triggers_referencing(&self, action_id: &ActionId) -> Vec<(FlowType, TriggerType)> {
        let mut hits: Vec<(FlowType, TriggerType)> = self
            .triggers
            .iter()
            .filter(|(_, actions)| actions.contains(action_id))
            .map(|(key, _)| *key)
            .collect();
        hits.sort_by_key(|(f, t)| (format!("{f:?}"), format!("{t:?}")));
        hits
    }
}

impl WriteModel for OrgFlowsWriteModel {
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
        if event.is(&org_events::ORG_FLOW_TRIGGER_ACTIONS_SET) {
            let payload: org_events::TriggerActionsSet = event.payload_as()?;
            self.triggers
                .insert((payload.flow_type, payload.trigger_type), payload.action_ids);
        } else if event.is(&org_events::ORG_FLOW_TRIGGER_ACTIONS_CASCADE_REMOVED) {
            let payload: org_events::TriggerActionsCascadeRemoved = event.payload_as()?;
            if let Some(actions) = self
                .triggers
                .get_mut(&(payload.flow_type, payload.trigger_type))
            {
                actions.retain(|a| a != &payload.action_id);
            }
        } else if event.is(&org_events::ORG_FLOW_CLEARED) {
            let payload: org_events::FlowCleared = event.payload_as()?;
            self.triggers.retain(|(flow, _), _| *flow != payload.flow_type);
        }
        Ok(())
    }
}

impl Commands {
    /// Replace the ordered action list of one trigger. Every referenced
    /// action must exist.
    pub async fn set_trigger_actions(
        &self,
        ctx: &Context,
        org_id: &OrgId,
        flow_type: FlowType,
        trigger_type: TriggerType,
        action_ids: Vec<ActionId>,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_ACTION_WRITE, org_id.as_str())?;
        self.existing_org_model(ctx, org_id).await?;
        for action_id in &action_ids {
            self.existing_action_model(ctx, action_id).await?;
        }

        let mut model = OrgFlowsWriteModel::new(&ctx.instance_id, org_id);
        self.load(ctx, &mut model).await?;
        if model.triggers.get(&(flow_type, trigger_type)) == Some(&action_ids) {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            org_events::ORG_FLOW_TRIGGER_ACTIONS_SET,
            ctx.creator(),
            &org_events::TriggerActionsSet {
                flow_type,
                trigger_type,
                action_ids,
            },
        )?;
        let pushed = self.push(ctx, idforge_events::Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn clear_flow(
        &self,
        ctx: &Context,
        org_id: &OrgId,
        flow_type: FlowType,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_ACTION_WRITE, org_id.as_str())?;
        self.existing_org_model(ctx, org_id).await?;

        let mut model = OrgFlowsWriteModel::new(&ctx.instance_id, org_id);
        self.load(ctx, &mut model).await?;
        if !model.triggers.keys().any(|(flow, _)| *flow == flow_type) {
            return Err(Error::not_found("COMMAND-fl01", "flow is not configured"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            org_events::ORG_FLOW_CLEARED,
            ctx.creator(),
            &org_events::FlowCleared { flow_type },
        )?;
        let pushed = self.push(ctx, idforge_events::Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Cascade events for an action removal: one per trigger that still
    /// references the action. Pushed in the same transaction as the
    /// removal.
    pub(crate) fn flow_cascade_events(
        &self,
        ctx: &Context,
        flows: &OrgFlowsWriteModel,
        action_id: &ActionId,
    ) -> Result<Vec<PendingEvent>> {
        let mut events = Vec::new();
        for (flow_type, trigger_type) in flows.triggers_referencing(action_id) {
            let payload = serde_json::to_value(org_events::TriggerActionsCascadeRemoved {
                flow_type,
                trigger_type,
                action_id: action_id.clone(),
            })
            .map_err(|e| Error::internal("COMMAND-fl02", format!("payload serialization failed: {e}")))?;
            events.push(PendingEvent {
                event_type: org_events::ORG_FLOW_TRIGGER_ACTIONS_CASCADE_REMOVED,
                creator: ctx.creator(),
                payload,
            });
        }
        Ok(events)
    }
}
