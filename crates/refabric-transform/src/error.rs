use refabric_core::CoreError;
use thiserror::Error;

/// A dataset lookup that could not be completed against the template
/// index. Always fatal for the pipeline being transformed: an
/// inlined-but-empty Copy activity is worse than no output.
#[derive(Error, Debug)]
pub enum DatasetResolveError {
    #[error("dataset `{0}` does not exist in the template")]
    UnknownDataset(String),

    #[error("linked service `{linked_service}` referenced by dataset `{dataset}` does not exist in the template")]
    UnknownLinkedService {
        dataset: String,
        linked_service: String,
    },

    #[error("dataset `{dataset}` is malformed: {message}")]
    MalformedDataset { dataset: String, message: String },
}

#[derive(Error, Debug)]
pub enum TransformError {
    /// Names both the failing activity and the reference, so a failed
    /// pipeline never reports a generic "migration failed".
    #[error("activity `{activity}`: {source}")]
    UnresolvedReference {
        activity: String,
        #[source]
        source: DatasetResolveError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl TransformError {
    pub fn unresolved(activity: impl Into<String>, source: DatasetResolveError) -> Self {
        Self::UnresolvedReference {
            activity: activity.into(),
            source,
        }
    }
}
