//! Pipeline reference resolution against the target workspace
//!
//! The only component of the engine that performs I/O. Lookups go through
//! the [`WorkspaceClient`] contract; results are cached per
//! `(workspace_id, pipeline_name)` in a store owned by the resolver
//! instance, cleared explicitly between independent migration runs.

pub mod client;
pub mod resolver;

pub use client::{ClientError, HttpWorkspaceClient, WorkspaceClient, WorkspaceItem};
pub use resolver::{CacheStats, ExistenceCheck, PipelineResolver};
