use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Missing credentials or an invalid configuration value.
    Config(String),
    /// A single completion request failed.
    Provider {
        index: usize,
        provider: String,
        details: String,
        retryable: bool,
    },
    /// Model listing failed. Recovered by the catalog, never fatal.
    Discovery(String),
    /// A prompt template could not be rendered.
    Template(String),
    /// Serializing generated documents failed.
    Export(String),
    /// An error occurred during file system operations.
    FileSystem(String),
    /// A generic system or unknown error.
    System(String),
}

impl Error {
    /// Tags an arbitrary failure of request `index` as a provider error.
    /// Provider errors keep their own index and details.
    pub fn for_request(self, index: usize, provider: &str) -> Self {
        match self {
            err @ Error::Provider { .. } => err,
            other => Error::Provider {
                index,
                provider: provider.to_string(),
                details: other.to_string(),
                retryable: false,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Provider { retryable: true, .. })
    }

    pub fn request_index(&self) -> Option<usize> {
        match self {
            Error::Provider { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {msg}"),
            Error::Provider {
                index,
                provider,
                details,
                ..
            } => {
                write!(f, "Error generating document {index} ({provider}): {details}")
            }
            Error::Discovery(msg) => write!(f, "Model discovery error: {msg}"),
            Error::Template(msg) => write!(f, "Template error: {msg}"),
            Error::Export(msg) => write!(f, "Export error: {msg}"),
            Error::FileSystem(msg) => write!(f, "File system error: {msg}"),
            Error::System(msg) => write!(f, "System error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
