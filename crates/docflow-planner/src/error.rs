use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid pipeline: {0}")]
    Invalid(String),

    #[error("stage {index}: $text is only allowed in the first $match stage")]
    TextNotFirst { index: usize },
}

impl From<docflow_core::error::Error> for PlanError {
    fn from(e: docflow_core::error::Error) -> Self {
        PlanError::Invalid(e.to_string())
    }
}
