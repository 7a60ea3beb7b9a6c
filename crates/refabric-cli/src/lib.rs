//! Library interface for the refabric CLI: migration orchestration

pub mod migrate;

pub use migrate::{
    run_migration, write_outputs, MigrationOptions, MigrationSummary, PipelineOutcome,
};
