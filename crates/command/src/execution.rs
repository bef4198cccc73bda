//! Execution commands.
//!
//! An execution's aggregate id is derived from its condition, so `set` is
//! an upsert. Includes form a directed graph over executions; a bounded
//! depth-first search at write time rejects cycles and chains deeper than
//! the include limit.

use std::collections::HashSet;

use idforge_core::{Context, Error, ExecutionId, InstanceId, ObjectDetails, OrgId, Result};
use idforge_domain::events::execution as execution_events;
use idforge_domain::events::AGGREGATE_EXECUTION;
use idforge_domain::execution::{ExecutionCondition, ExecutionTargetRef};
use idforge_events::{
    Aggregate, AggregateBatch, Push, SearchQuery, StoredEvent, WriteModel, WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::permission::PERM_EXECUTION_WRITE;
use crate::Commands;

/// Maximum include chain depth.
pub const MAX_INCLUDE_DEPTH: usize = 3;

#[derive(Debug, Default)]
pub struct ExecutionWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub exists: bool,
    pub condition: Option<ExecutionCondition>,
    pub targets: Vec<ExecutionTargetRef>,
}

impl ExecutionWriteModel {
    pub fn new(instance_id: &InstanceId, execution_id: &ExecutionId) -> Self {
        Self {
            base: WriteModelBase::new(execution_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self, ctx: &Context) -> Aggregate {
        if self.base.resource_owner.is_empty() {
            Aggregate::new(
                AGGREGATE_EXECUTION,
                self.base.aggregate_id.clone(),
                &ctx.org_id,
                &ctx.instance_id,
            )
        } else {
            Aggregate::new(
                AGGREGATE_EXECUTION,
                self.base.aggregate_id.clone(),
                &OrgId::new(self.base.resource_owner.clone()),
                &self.instance_id,
            )
        }
    }

    fn includes(&self) -> Vec<ExecutionId> {
        self.targets
            .iter()
            .filter_map(|t| match t {
                ExecutionTargetRef::Include { id } => Some(id.clone()),
                ExecutionTargetRef::Target { .. } => None,
            })
            .collect()
    }
}

impl WriteModel for ExecutionWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_EXECUTION)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&execution_events::EXECUTION_SET) {
            let payload: execution_events::ExecutionSet = event.payload_as()?;
            self.exists = true;
            self.condition = Some(payload.condition);
            self.targets = payload.targets;
        } else if event.is(&execution_events::EXECUTION_REMOVED) {
            self.exists = false;
            self.targets.clear();
        }
        Ok(())
    }
}

impl Commands {
    /// Upsert the execution for a condition.
    pub async fn set_execution(
        &self,
        ctx: &Context,
        condition: ExecutionCondition,
        targets: Vec<ExecutionTargetRef>,
    ) -> Result<ObjectDetails> {
        condition.validate()?;
        if targets.is_empty() {
            return Err(Error::invalid_argument(
                "COMMAND-ex01",
                "at least one target or include is required",
            ));
        }
        self.check_permission(ctx, PERM_EXECUTION_WRITE, ctx.instance_id.as_str())?;

        let execution_id = condition.execution_id();

        // Referenced targets must exist; includes must exist, stay within
        // the depth bound, and not loop back to this execution.
        for target in &targets {
            match target {
                ExecutionTargetRef::Target { id } => {
                    self.existing_target_model(ctx, id).await?;
                }
                ExecutionTargetRef::Include { id } => {
                    if id == &execution_id {
                        return Err(Error::precondition_failed(
                            "COMMAND-ex04",
                            "circular include detected",
                        ));
                    }
                    let mut included = ExecutionWriteModel::new(&ctx.instance_id, id);
                    self.load(ctx, &mut included).await?;
                    if !included.exists {
                        return Err(Error::not_found("COMMAND-ex02", "included execution not found")
                            .with_detail("execution_id", id.as_str()));
                    }
                    self.check_include_chain(ctx, &execution_id, id, &included).await?;
                }
            }
        }

        let mut model = ExecutionWriteModel::new(&ctx.instance_id, &execution_id);
        self.load(ctx, &mut model).await?;
        if model.exists && model.targets == targets {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(ctx), model.base().expected_version())
            .event(
                execution_events::EXECUTION_SET,
                ctx.creator(),
                &execution_events::ExecutionSet { condition, targets },
            )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn remove_execution(
        &self,
        ctx: &Context,
        condition: &ExecutionCondition,
    ) -> Result<ObjectDetails> {
        self.check_permission(ctx, PERM_EXECUTION_WRITE, ctx.instance_id.as_str())?;
        let execution_id = condition.execution_id();
        let mut model = ExecutionWriteModel::new(&ctx.instance_id, &execution_id);
        self.load(ctx, &mut model).await?;
        if !model.exists {
            return Err(Error::not_found("COMMAND-ex03", "execution not found"));
        }

        let batch = AggregateBatch::new(model.aggregate(ctx), model.base().expected_version())
            .event(
                execution_events::EXECUTION_REMOVED,
                ctx.creator(),
                &serde_json::json!({}),
            )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    /// Bounded DFS over the include graph as loaded in this command.
    ///
    /// `root` is the execution being written; reaching it again is a cycle.
    /// The check starts at the directly-included execution itself, so a
    /// self-include is the depth-1 cycle. Depth counts include hops.
    async fn check_include_chain(
        &self,
        ctx: &Context,
        root: &ExecutionId,
        include_id: &ExecutionId,
        included: &ExecutionWriteModel,
    ) -> Result<()> {
        if include_id == root {
            return Err(Error::precondition_failed(
                "COMMAND-ex04",
                "circular include detected",
            ));
        }

        let mut stack: Vec<(ExecutionId, usize)> = included
            .includes()
            .into_iter()
            .map(|id| (id, 2))
            .collect();
        let mut visited: HashSet<ExecutionId> = HashSet::from([include_id.clone()]);

        while let Some((id, depth)) = stack.pop() {
            if &id == root {
                return Err(Error::precondition_failed(
                    "COMMAND-ex04",
                    "circular include detected",
                ));
            }
            if depth > MAX_INCLUDE_DEPTH {
                return Err(Error::precondition_failed(
                    "COMMAND-ex05",
                    format!("include depth exceeds {MAX_INCLUDE_DEPTH}"),
                ));
            }
            if !visited.insert(id.clone()) {
                continue;
            }
            let mut model = ExecutionWriteModel::new(&ctx.instance_id, &id);
            self.load(ctx, &mut model).await?;
            for next in model.includes() {
                stack.push((next, depth + 1));
            }
        }
        Ok(())
    }
}
