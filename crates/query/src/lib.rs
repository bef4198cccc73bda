//! Query side: projection runtime, materialized views, and the read API the
//! command engine validates against.

pub mod cursor;
pub mod projections;
pub mod queries;
pub mod runtime;
pub mod store;

pub use cursor::{CursorState, CursorStore, InMemoryCursorStore, PostgresCursorStore};
pub use queries::Queries;
pub use runtime::{Projection, ProjectionRunner, RunnerHandle};
pub use store::{InMemoryReadStore, PostgresReadStore, ReadStore};
