//! Project commands: lifecycle and roles.

use idforge_core::{Context, Error, InstanceId, ObjectDetails, OrgId, ProjectId, Result};
use idforge_domain::events::project as project_events;
use idforge_domain::events::AGGREGATE_PROJECT;
use idforge_domain::{PrivateLabelingSetting, ProjectState};
use idforge_events::{
    Aggregate, AggregateBatch, ExpectedVersion, Push, SearchQuery, StoredEvent, WriteModel,
    WriteModelBase,
};
use idforge_eventstore::append_and_reduce;

use crate::permission::PERM_PROJECT_WRITE;
use crate::{push_details, Commands};

/// Write model over one project aggregate. Applications are folded by their
/// own sub-entity model; this one tracks lifecycle, settings, and roles.
#[derive(Debug, Default)]
pub struct ProjectWriteModel {
    base: WriteModelBase,
    instance_id: InstanceId,
    pub state: ProjectState,
    pub name: String,
    pub project_role_assertion: bool,
    pub project_role_check: bool,
    pub has_project_check: bool,
    pub private_labeling_setting: PrivateLabelingSetting,
    pub role_keys: Vec<String>,
}

impl ProjectWriteModel {
    pub fn new(instance_id: &InstanceId, project_id: &ProjectId) -> Self {
        Self {
            base: WriteModelBase::new(project_id.as_str()),
            instance_id: instance_id.clone(),
            ..Default::default()
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            AGGREGATE_PROJECT,
            self.base.aggregate_id.clone(),
            &OrgId::new(self.base.resource_owner.clone()),
            &self.instance_id,
        )
    }

    pub fn exists(&self) -> bool {
        self.state.exists()
    }
}

impl WriteModel for ProjectWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::instance(&self.instance_id)
            .aggregate_type(AGGREGATE_PROJECT)
            .aggregate_id(self.base.aggregate_id.clone())
    }

    fn reduce(&mut self, event: &StoredEvent) -> Result<()> {
        if event.is(&project_events::PROJECT_ADDED) {
            let payload: project_events::ProjectAdded = event.payload_as()?;
            self.state = ProjectState::Active;
            self.name = payload.name;
            self.project_role_assertion = payload.project_role_assertion;
            self.project_role_check = payload.project_role_check;
            self.has_project_check = payload.has_project_check;
            self.private_labeling_setting = payload.private_labeling_setting;
        } else if event.is(&project_events::PROJECT_CHANGED) {
            let payload: project_events::ProjectChanged = event.payload_as()?;
            if let Some(name) = payload.name {
                self.name = name;
            }
            if let Some(v) = payload.project_role_assertion {
                self.project_role_assertion = v;
            }
            if let Some(v) = payload.project_role_check {
                self.project_role_check = v;
            }
            if let Some(v) = payload.has_project_check {
                self.has_project_check = v;
            }
            if let Some(v) = payload.private_labeling_setting {
                self.private_labeling_setting = v;
            }
        } else if event.is(&project_events::PROJECT_DEACTIVATED) {
            self.state = ProjectState::Inactive;
        } else if event.is(&project_events::PROJECT_REACTIVATED) {
            self.state = ProjectState::Active;
        } else if event.is(&project_events::PROJECT_REMOVED) {
            self.state = ProjectState::Removed;
        } else if event.is(&project_events::PROJECT_ROLE_ADDED) {
            let payload: project_events::ProjectRoleAdded = event.payload_as()?;
            if !self.role_keys.contains(&payload.key) {
                self.role_keys.push(payload.key);
            }
        } else if event.is(&project_events::PROJECT_ROLE_REMOVED) {
            let payload: project_events::ProjectRoleRemoved = event.payload_as()?;
            self.role_keys.retain(|k| k != &payload.key);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AddProject {
    pub project_id: Option<ProjectId>,
    pub name: String,
    pub project_role_assertion: bool,
    pub project_role_check: bool,
    pub has_project_check: bool,
    pub private_labeling_setting: PrivateLabelingSetting,
}

#[derive(Debug, Clone)]
pub struct ChangeProject {
    pub name: Option<String>,
    pub project_role_assertion: Option<bool>,
    pub project_role_check: Option<bool>,
    pub has_project_check: Option<bool>,
    pub private_labeling_setting: Option<PrivateLabelingSetting>,
}

#[derive(Debug, Clone)]
pub struct CreatedProject {
    pub project_id: ProjectId,
    pub details: ObjectDetails,
}

impl Commands {
    pub async fn add_project(&self, ctx: &Context, request: AddProject) -> Result<CreatedProject> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::invalid_argument("COMMAND-pj01", "project name must not be empty"));
        }
        self.check_permission(ctx, PERM_PROJECT_WRITE, ctx.org_id.as_str())?;
        self.existing_org_model(ctx, &ctx.org_id).await?;

        let project_id = request.project_id.unwrap_or_else(ProjectId::generate);
        let mut model = ProjectWriteModel::new(&ctx.instance_id, &project_id);
        self.load(ctx, &mut model).await?;
        if model.state != ProjectState::Unspecified {
            return Err(Error::already_exists("COMMAND-pj02", "project already exists"));
        }

        let aggregate = Aggregate::new(
            AGGREGATE_PROJECT,
            project_id.as_str(),
            &ctx.org_id,
            &ctx.instance_id,
        );
        let batch = AggregateBatch::new(aggregate, ExpectedVersion::NoStream).event(
            project_events::PROJECT_ADDED,
            ctx.creator(),
            &project_events::ProjectAdded {
                name,
                project_role_assertion: request.project_role_assertion,
                project_role_check: request.project_role_check,
                has_project_check: request.has_project_check,
                private_labeling_setting: request.private_labeling_setting,
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        Ok(CreatedProject {
            project_id,
            details: push_details(&pushed),
        })
    }

    pub async fn change_project(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        request: ChangeProject,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_project_model(ctx, project_id).await?;
        self.check_permission(ctx, PERM_PROJECT_WRITE, &model.base().resource_owner)?;

        let payload = project_events::ProjectChanged {
            name: request.name.filter(|n| n != &model.name),
            project_role_assertion: request
                .project_role_assertion
                .filter(|v| *v != model.project_role_assertion),
            project_role_check: request
                .project_role_check
                .filter(|v| *v != model.project_role_check),
            has_project_check: request.has_project_check.filter(|v| *v != model.has_project_check),
            private_labeling_setting: request
                .private_labeling_setting
                .filter(|v| *v != model.private_labeling_setting),
        };
        let no_change = payload.name.is_none()
            && payload.project_role_assertion.is_none()
            && payload.project_role_check.is_none()
            && payload.has_project_check.is_none()
            && payload.private_labeling_setting.is_none();
        if no_change {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            project_events::PROJECT_CHANGED,
            ctx.creator(),
            &payload,
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn deactivate_project(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_project_model(ctx, project_id).await?;
        self.check_permission(ctx, PERM_PROJECT_WRITE, &model.base().resource_owner)?;
        if model.state == ProjectState::Inactive {
            return Err(Error::precondition_failed("COMMAND-pj03", "project is already inactive"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            project_events::PROJECT_DEACTIVATED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn reactivate_project(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_project_model(ctx, project_id).await?;
        self.check_permission(ctx, PERM_PROJECT_WRITE, &model.base().resource_owner)?;
        if model.state == ProjectState::Active {
            return Err(Error::precondition_failed("COMMAND-pj04", "project is already active"));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            project_events::PROJECT_REACTIVATED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn remove_project(&self, ctx: &Context, project_id: &ProjectId) -> Result<ObjectDetails> {
        let mut model = self.existing_project_model(ctx, project_id).await?;
        self.check_permission(ctx, PERM_PROJECT_WRITE, &model.base().resource_owner)?;

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            project_events::PROJECT_REMOVED,
            ctx.creator(),
            &serde_json::json!({}),
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn add_project_role(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        key: &str,
        display_name: &str,
        group: &str,
    ) -> Result<ObjectDetails> {
        if key.is_empty() {
            return Err(Error::invalid_argument("COMMAND-pj05", "role key must not be empty"));
        }
        let mut model = self.existing_project_model(ctx, project_id).await?;
        self.check_permission(ctx, PERM_PROJECT_WRITE, &model.base().resource_owner)?;
        if model.role_keys.iter().any(|k| k == key) {
            return Err(Error::already_exists("COMMAND-pj06", "role key already exists")
                .with_detail("key", key));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            project_events::PROJECT_ROLE_ADDED,
            ctx.creator(),
            &project_events::ProjectRoleAdded {
                key: key.to_string(),
                display_name: display_name.to_string(),
                group: group.to_string(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn change_project_role(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        key: &str,
        display_name: Option<String>,
        group: Option<String>,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_project_model(ctx, project_id).await?;
        self.check_permission(ctx, PERM_PROJECT_WRITE, &model.base().resource_owner)?;
        if !model.role_keys.iter().any(|k| k == key) {
            return Err(Error::not_found("COMMAND-pj07", "role not found").with_detail("key", key));
        }
        if display_name.is_none() && group.is_none() {
            return Ok(model.details());
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            project_events::PROJECT_ROLE_CHANGED,
            ctx.creator(),
            &project_events::ProjectRoleChanged {
                key: key.to_string(),
                display_name,
                group,
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub async fn remove_project_role(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
        key: &str,
    ) -> Result<ObjectDetails> {
        let mut model = self.existing_project_model(ctx, project_id).await?;
        self.check_permission(ctx, PERM_PROJECT_WRITE, &model.base().resource_owner)?;
        if !model.role_keys.iter().any(|k| k == key) {
            return Err(Error::not_found("COMMAND-pj08", "role not found").with_detail("key", key));
        }

        let batch = AggregateBatch::new(model.aggregate(), model.base().expected_version()).event(
            project_events::PROJECT_ROLE_REMOVED,
            ctx.creator(),
            &project_events::ProjectRoleRemoved {
                key: key.to_string(),
            },
        )?;
        let pushed = self.push(ctx, Push::single(batch)).await?;
        append_and_reduce(&mut model, &pushed)?;
        Ok(model.details())
    }

    pub(crate) async fn existing_project_model(
        &self,
        ctx: &Context,
        project_id: &ProjectId,
    ) -> Result<ProjectWriteModel> {
        let mut model = ProjectWriteModel::new(&ctx.instance_id, project_id);
        self.load(ctx, &mut model).await?;
        if !model.exists() {
            return Err(Error::not_found("COMMAND-pj09", "project not found")
                .with_detail("project_id", project_id.as_str()));
        }
        Ok(model)
    }
}
