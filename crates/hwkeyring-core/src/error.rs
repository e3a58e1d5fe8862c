//! Error types shared by every hwkeyring crate

use thiserror::Error;

/// Result type alias for keyring operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fieldless tag for each [`Error`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AccountNotFound,
    UnsupportedVersion,
    OperationAborted,
    OperationFailed,
    Unsupported,
    MalformedDeviceResponse,
    InvalidAddress,
    InvalidDerivationPath,
    Channel,
    Surface,
    Serialization,
    Io,
    Config,
}

/// Errors that can occur anywhere in the keyring, the bridge or the CLI
#[derive(Debug, Error)]
pub enum Error {
    /// Address is not tracked by the keyring
    #[error("Address {0} not found in this keyring")]
    AccountNotFound(String),

    /// Typed data version other than the one the device signs
    #[error("Typed data signing {0} is not supported. Use V4")]
    UnsupportedVersion(String),

    /// The user dismissed the signing surface, or the request timed out
    #[error("{0}")]
    OperationAborted(String),

    /// The signing surface reported an internal error
    #[error("{0}")]
    OperationFailed(String),

    /// Operation is never available on a hardware device
    #[error("{0}")]
    Unsupported(String),

    /// Data returned by the device could not be decoded
    #[error("Malformed device response: {0}")]
    MalformedDeviceResponse(String),

    /// Address string is not 20 hex-encoded bytes
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Derivation path could not be used
    #[error("Invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    /// Message channel failure
    #[error("Channel error: {0}")]
    Channel(String),

    /// Host window manager failure
    #[error("Surface error: {0}")]
    Surface(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The variant tag, for callers that branch on the failure class
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AccountNotFound(_) => ErrorKind::AccountNotFound,
            Error::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
            Error::OperationAborted(_) => ErrorKind::OperationAborted,
            Error::OperationFailed(_) => ErrorKind::OperationFailed,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::MalformedDeviceResponse(_) => ErrorKind::MalformedDeviceResponse,
            Error::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Error::InvalidDerivationPath(_) => ErrorKind::InvalidDerivationPath,
            Error::Channel(_) => ErrorKind::Channel,
            Error::Surface(_) => ErrorKind::Surface,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Io(_) => ErrorKind::Io,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Human-readable detail without the variant prefix
    pub fn detail(&self) -> String {
        match self {
            Error::AccountNotFound(d)
            | Error::UnsupportedVersion(d)
            | Error::OperationAborted(d)
            | Error::OperationFailed(d)
            | Error::Unsupported(d)
            | Error::MalformedDeviceResponse(d)
            | Error::InvalidAddress(d)
            | Error::InvalidDerivationPath(d)
            | Error::Channel(d)
            | Error::Surface(d)
            | Error::Serialization(d)
            | Error::Config(d) => d.clone(),
            Error::Io(e) => e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
