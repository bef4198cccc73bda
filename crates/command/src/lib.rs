//! The command engine: every mutation of the write side goes through the
//! [`Commands`] facade.
//!
//! Each command follows the same pipeline: validate input, check the
//! caller's permission, load the relevant write models, enforce the state
//! machine, compute the delta (an empty delta returns current details
//! unchanged), push atomically, fold the pushed events back in, and return
//! [`ObjectDetails`].

pub mod action;
pub mod application;
pub mod auth_request;
pub mod dcr;
pub mod execution;
pub mod idp;
pub mod idp_intent;
pub mod instance;
pub mod keys;
pub mod org;
pub mod org_flow;
pub mod org_users;
pub mod permission;
pub mod policy;
pub mod project;
pub mod saml;
pub mod target;
pub mod user;
pub mod user_idp_link;
pub mod user_pat;

use std::sync::Arc;

use chrono::Utc;

use idforge_core::{Context, ObjectDetails, Result};
use idforge_crypto::EncryptionKeyStore;
use idforge_events::{Push, StoredEvent, WriteModel};
use idforge_eventstore::{load_write_model, EventStore};
use idforge_idp::ProviderFactory;
use idforge_query::Queries;

pub use permission::{PermissionChecker, RolePermissionChecker};

/// The command side. Construct once, share via `Arc`.
pub struct Commands {
    store: Arc<dyn EventStore>,
    queries: Arc<Queries>,
    keys: Arc<dyn EncryptionKeyStore>,
    permissions: Arc<dyn PermissionChecker>,
    providers: Arc<dyn ProviderFactory>,
}

impl Commands {
    pub fn new(
        store: Arc<dyn EventStore>,
        queries: Arc<Queries>,
        keys: Arc<dyn EncryptionKeyStore>,
        permissions: Arc<dyn PermissionChecker>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            store,
            queries,
            keys,
            permissions,
            providers,
        }
    }

    pub(crate) fn store(&self) -> &dyn EventStore {
        self.store.as_ref()
    }

    pub(crate) fn queries(&self) -> &Queries {
        &self.queries
    }

    pub(crate) fn key_store(&self) -> &dyn EncryptionKeyStore {
        self.keys.as_ref()
    }

    pub(crate) fn providers(&self) -> &dyn ProviderFactory {
        self.providers.as_ref()
    }

    /// Permission check; must pass before any write model is loaded.
    pub(crate) fn check_permission(
        &self,
        ctx: &Context,
        permission: &str,
        resource_owner: &str,
    ) -> Result<()> {
        self.permissions.check(ctx, permission, resource_owner)
    }

    /// Load a write model, deadline-checked.
    pub(crate) async fn load<W: WriteModel + Send>(&self, ctx: &Context, model: &mut W) -> Result<()> {
        ctx.check_deadline(Utc::now())?;
        load_write_model(self.store.as_ref(), model).await
    }

    /// Push, deadline-checked.
    pub(crate) async fn push(&self, ctx: &Context, push: Push) -> Result<Vec<StoredEvent>> {
        ctx.check_deadline(Utc::now())?;
        self.store.push(push).await
    }
}

/// Details of the last event in a push.
pub(crate) fn push_details(pushed: &[StoredEvent]) -> ObjectDetails {
    match pushed.last() {
        Some(event) => ObjectDetails::new(event.version, event.created_at, event.resource_owner.clone()),
        None => ObjectDetails::new(0, chrono::DateTime::<Utc>::UNIX_EPOCH, String::new()),
    }
}
