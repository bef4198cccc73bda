//! Core types shared by every idforge crate: identifiers, the command
//! context, the error taxonomy, and validated value objects.

pub mod context;
pub mod details;
pub mod error;
pub mod id;
pub mod values;

pub use context::Context;
pub use details::ObjectDetails;
pub use error::{Error, ErrorKind, Result};
pub use id::{
    ActionId, AppId, ExecutionId, IdpId, InstanceId, IntentId, OrgId, ProjectId, RequestId,
    SessionId, TargetId, TokenId, UserId,
};
pub use values::{DomainName, EmailAddress, Language, PhoneNumber};
