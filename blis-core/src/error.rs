use std::fmt;

/// Result type alias for BLIS core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for BLIS core operations
#[derive(Debug)]
pub enum Error {
    /// I/O errors reading specs, traces or data directories
    Io(std::io::Error),

    /// Invalid workload specification (message carries the field path)
    Spec(String),

    /// Malformed trace header or data file
    Trace(String),

    /// Malformed external data (ServeGen chunks, legacy CSV traces)
    Data(String),

    /// Calibration input errors
    Calibration(String),

    /// Other errors
    Other(String),
}

impl Error {
    pub(crate) fn spec(msg: impl Into<String>) -> Self {
        Error::Spec(msg.into())
    }

    pub(crate) fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    pub(crate) fn trace(msg: impl Into<String>) -> Self {
        Error::Trace(msg.into())
    }

    pub(crate) fn calibration(msg: impl Into<String>) -> Self {
        Error::Calibration(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Spec(msg) => write!(f, "Invalid workload spec: {msg}"),
            Error::Trace(msg) => write!(f, "Trace error: {msg}"),
            Error::Data(msg) => write!(f, "Data error: {msg}"),
            Error::Calibration(msg) => write!(f, "Calibration error: {msg}"),
            Error::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(format!("{err:#}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Spec(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Data(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Data(err.to_string())
    }
}
