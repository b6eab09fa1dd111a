use localqa_engine::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Generation could not start; no stream was opened.
    #[error("Error running model: {source}")]
    GenerationFailure {
        model: String,
        #[source]
        source: EngineError,
    },

    #[error("invalid document name: {0:?}")]
    InvalidDocumentName(String),

    #[error("index error: {0}")]
    Index(#[source] localqa_core::Error),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl From<localqa_core::Error> for ServiceError {
    fn from(e: localqa_core::Error) -> Self {
        match e {
            localqa_core::Error::InvalidName(name) => ServiceError::InvalidDocumentName(name),
            other => ServiceError::Index(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_failure_reads_like_relay_error() {
        let err = ServiceError::GenerationFailure {
            model: "llama3".into(),
            source: EngineError::ModelNotFound("llama3".into()),
        };
        assert_eq!(err.to_string(), "Error running model: model not found: llama3");
    }

    #[test]
    fn invalid_name_maps_to_document_error() {
        let err: ServiceError = localqa_core::Error::InvalidName("../x".into()).into();
        assert!(matches!(err, ServiceError::InvalidDocumentName(n) if n == "../x"));
    }
}
