use thiserror::Error;

/// Error kinds raised by the URI engine.
#[derive(Error, Debug)]
pub enum UriError {
    #[error("Invalid URI: {0}")]
    InvalidUri(#[source] anyhow::Error),

    #[error("Missing value for parameter: {0}")]
    MissingParameterValue(String),

    #[error("Value for parameter {name} does not match expected pattern: {value}")]
    ParameterValueMismatch { name: String, value: String },

    #[error("Incompatible builder option: {0}")]
    IncompatibleBuilderOption(String),
}
