use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("activity node is not a JSON object")]
    NotAnObject,

    #[error("activity is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("activity `{activity}`: {message}")]
    InvalidActivity { activity: String, message: String },

    #[error("pipeline `{pipeline}`: {message}")]
    InvalidPipeline { pipeline: String, message: String },
}

impl CoreError {
    pub fn invalid_activity(activity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidActivity {
            activity: activity.into(),
            message: message.into(),
        }
    }

    pub fn invalid_pipeline(pipeline: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPipeline {
            pipeline: pipeline.into(),
            message: message.into(),
        }
    }
}
