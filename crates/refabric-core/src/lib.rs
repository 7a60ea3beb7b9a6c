//! Core data model and error taxonomy for the refabric migration engine

pub mod activity;
pub mod component;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod report;

pub use activity::{Activity, ActivityBody};
pub use component::{Component, ComponentKind, GlobalParameterSpec};
pub use dataset::{DatasetReference, DatasetSettings, ResolvedDataset};
pub use error::CoreError;
pub use pipeline::Pipeline;
pub use report::{Severity, ValidationFinding, ValidationReport};
