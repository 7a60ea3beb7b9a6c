use refabric_core::ComponentKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("template root is not a JSON object")]
    NotAnObject,

    #[error("template has no `resources` array")]
    MissingResources,

    #[error("resource #{index} is missing `{field}`")]
    MissingResourceField { index: usize, field: &'static str },

    #[error("duplicate {kind} `{name}` in template")]
    DuplicateComponent { kind: ComponentKind, name: String },

    #[error("global parameter `{name}` is malformed: {message}")]
    MalformedGlobalParameter { name: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
