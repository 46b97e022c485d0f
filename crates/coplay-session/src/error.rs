use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("unsupported action name: {0}")]
    UnsupportedActionName(String),
    #[error("invalid arguments for action {name}: {source}")]
    InvalidArgs {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}
