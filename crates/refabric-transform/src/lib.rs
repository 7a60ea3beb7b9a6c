//! Activity transformation, reference resolution, and validation
//!
//! The synchronous core of the migration engine: everything here is pure
//! tree recursion over the immutable template index. The only I/O in the
//! system lives in `refabric-resolver`; its results are handed in through
//! [`TransformOptions`].

pub mod activity;
pub mod dataset;
pub mod error;
pub mod expression;
pub mod globals;
pub mod validate;

pub use activity::{
    collect_pipeline_references, transform_activity, transform_pipeline, TransformContext,
    TransformOptions, DEFERRED_REFERENCE_KEY,
};
pub use dataset::resolve_dataset;
pub use error::{DatasetResolveError, TransformError};
pub use globals::{
    build_variable_library, extract_global_parameters, AdfParameterType, DeploymentBlocker,
    FabricVariableType, LibraryVariable, ParameterReference, VariableLibrary, SECRET_PLACEHOLDER,
};
pub use validate::validate_pipeline;
