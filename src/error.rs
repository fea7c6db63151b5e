//! Custom error types and result handling for Hako operations.
//!
//! Every fallible operation returns a [`Result<T>`], a type alias for
//! `std::result::Result<T, Error>`. The variants follow the conversion engine's
//! failure taxonomy, so callers can tell a missing input from a missing external
//! tool without parsing messages. [`Error::kind`] gives a fieldless view of the
//! same taxonomy.
//!
use std::path::PathBuf;

/// Type alias for Results with Hako errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all Hako operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O errors while writing output or staging files
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// ZIP writer errors while building zip-based containers
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    HakoBuilder(#[from] crate::hako::HakoConfigBuilderError),
    /// The input path does not exist
    #[error("Not found: {0:?}")]
    NotFound(PathBuf),
    /// There were no images to pack, or none were extracted
    #[error("No images: {0}")]
    EmptyInput(String),
    /// Extension or format that no dispatch table knows about
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// A write path the engine declines to implement
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    /// A required external tool could not be located on this host
    #[error("{capability} is unavailable: none of [{}] was found", .tools.join(", "))]
    CapabilityUnavailable {
        capability: String,
        tools: Vec<String>,
    },
    /// The underlying decoder rejected the container bytes
    #[error("Corrupt container '{path:?}': {reason}")]
    CorruptContainer { path: PathBuf, reason: String },
    /// An external tool was found but exited unsuccessfully
    #[error("'{tool}' exited with {status}: {stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },
    /// Configuration rejected by validation or preflight checks
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Error for failed asynchronous tasks (e.g., Tokio JoinError)
    #[error("Asynchronous task failed: {0}")]
    AsyncTaskError(String),
}

/// Fieldless classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "specta", derive(specta::Type))]
pub enum ErrorKind {
    NotFound,
    EmptyInput,
    UnsupportedFormat,
    NotImplemented,
    CapabilityUnavailable,
    CorruptContainer,
    IoFailure,
    InvalidConfig,
}

impl Error {
    /// Builds a [`Error::CorruptContainer`] from any decoder error.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::CorruptContainer {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::EmptyInput(_) => ErrorKind::EmptyInput,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::NotImplemented(_) => ErrorKind::NotImplemented,
            Error::CapabilityUnavailable { .. } => ErrorKind::CapabilityUnavailable,
            Error::CorruptContainer { .. } => ErrorKind::CorruptContainer,
            Error::Io(_)
            | Error::Zip(_)
            | Error::ExternalTool { .. }
            | Error::AsyncTaskError(_) => ErrorKind::IoFailure,
            Error::HakoBuilder(_) | Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(error: tokio::task::JoinError) -> Self {
        Error::AsyncTaskError(error.to_string())
    }
}

impl From<tokio::sync::AcquireError> for Error {
    fn from(error: tokio::sync::AcquireError) -> Self {
        Error::AsyncTaskError(error.to_string())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_message_names_every_tool() {
        let err = Error::CapabilityUnavailable {
            capability: "RAR extraction".to_string(),
            tools: vec!["unrar".to_string(), "unar".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("unrar, unar"));
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
    }

    #[test]
    fn io_errors_are_io_failures() {
        let err: Error = std::io::Error::other("disk full").into();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }
}
