//! Generation engine errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine rejected the request or could not be reached.
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// A reply line or body could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The engine subprocess failed to start or exited unsuccessfully.
    #[error("process error: {0}")]
    Process(String),

    #[error("timeout")]
    Timeout,

    /// The output stream ended before the engine signalled completion.
    #[error("disconnected: {0}")]
    Disconnected(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_model_not_found() {
        let err = EngineError::ModelNotFound("codellama".into());
        assert_eq!(err.to_string(), "model not found: codellama");
    }

    #[test]
    fn display_disconnected() {
        let err = EngineError::Disconnected("connection reset".into());
        assert_eq!(err.to_string(), "disconnected: connection reset");
    }

    #[test]
    fn json_error_from_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: EngineError = serde_err.into();
        assert!(err.to_string().starts_with("json error:"));
    }
}
