//! Errors surfaced to the host and their translation from engine failures.

use gpu_column::{InvalidArgument, UnknownTypeName};
use std::io;
use thiserror::Error;

/// Every failure a host caller can observe.
///
/// Engine errors never cross the boundary as-is: they are translated into one
/// of these variants with their message preserved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The type name is not in the registry.
    #[error("invalid dtype: '{name}'")]
    InvalidType { name: String },

    /// Wrong argument count or shape, or an out-of-range value.
    #[error("{0}")]
    InvalidArgument(String),

    /// The column's native resource has already been released.
    #[error("{op}: column has been released")]
    UseAfterRelease { op: &'static str },

    /// Failure reported by the engine, message passed through verbatim.
    #[error("{0}")]
    Engine(String),

    /// A text source does not exist.
    #[error("{0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, BindingError>;

impl BindingError {
    /// Name of the error class raised on the host side.
    pub fn kind(&self) -> &'static str {
        match self {
            BindingError::InvalidType { .. } => "InvalidTypeError",
            BindingError::InvalidArgument(_) => "InvalidArgumentError",
            BindingError::UseAfterRelease { .. } => "UseAfterReleaseError",
            BindingError::Engine(_) => "EngineError",
            BindingError::FileNotFound(_) => "FileNotFoundError",
        }
    }

    /// Translate an engine failure at the call boundary.
    pub fn from_engine(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        if let Some(InvalidArgument(msg)) = err.downcast_ref::<InvalidArgument>() {
            return BindingError::InvalidArgument(msg.clone());
        }
        let missing = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<io::Error>())
            .any(|io| io.kind() == io::ErrorKind::NotFound);
        if missing {
            BindingError::FileNotFound(message)
        } else {
            BindingError::Engine(message)
        }
    }
}

impl From<UnknownTypeName> for BindingError {
    fn from(err: UnknownTypeName) -> Self {
        BindingError::InvalidType { name: err.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn invalid_argument_is_preserved() {
        let err = anyhow::Error::new(InvalidArgument("bad length".into())).context("while building");
        assert_eq!(
            BindingError::from_engine(err),
            BindingError::InvalidArgument("bad length".into())
        );
    }

    #[test]
    fn missing_file_is_detected_through_context() {
        let io = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err = Err::<(), _>(io).context("Failed to open file: missing.txt").unwrap_err();
        let translated = BindingError::from_engine(err);
        assert_eq!(translated.kind(), "FileNotFoundError");
        assert!(translated.to_string().contains("missing.txt"));
    }

    #[test]
    fn other_failures_become_engine_errors() {
        let err = anyhow::anyhow!("kernel launch failed");
        let translated = BindingError::from_engine(err);
        assert_eq!(translated, BindingError::Engine("kernel launch failed".into()));
        assert_eq!(translated.kind(), "EngineError");
    }

    #[test]
    fn unknown_type_name_maps_to_invalid_type() {
        let err: BindingError = UnknownTypeName("int128".into()).into();
        assert_eq!(err.to_string(), "invalid dtype: 'int128'");
    }
}
