use std::fmt;
use std::io;

pub(crate) type AlberoResult<T> = Result<T, Error>;

/// Errors that can occur during albero usage
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred when reading a grammar file
    Io(io::Error),

    /// JSON parsing failed when loading a grammar.
    Json(serde_json::Error),

    /// A regex source in a grammar does not compile.
    /// Only reported by explicit validation; tokenization never fails on
    /// these, the owning rule simply stops matching.
    #[allow(missing_docs)]
    InvalidRegex { pattern: String, error: onig::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
            Error::InvalidRegex { pattern, error } => {
                write!(f, "invalid regex '{}': {}", pattern, error)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::InvalidRegex { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
