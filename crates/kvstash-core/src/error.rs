//! Error types for kvstash.

use std::fmt;

/// The main error type for kvstash operations.
#[derive(Debug)]
pub enum Error {
    /// A parameter had the wrong type or shape (detected before any I/O)
    Parameter(String),

    /// An object store with the given name already exists
    StoreExists(String),

    /// No object store with the given name exists
    StoreNotFound(String),

    /// Opening or upgrading a database connection failed
    Connection(String),

    /// A single storage operation failed
    Request(String),

    /// The worker reported an error outside the request/response protocol;
    /// the service instance is no longer usable
    Channel(String),

    /// The client was torn down while requests were still pending
    ClientClosed,

    /// I/O error
    Io(std::io::Error),

    /// Serialization/deserialization error
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parameter(msg) => write!(f, "Invalid parameter: {}", msg),
            Error::StoreExists(name) => {
                write!(f, "Object store named \"{}\" already exists", name)
            }
            Error::StoreNotFound(name) => {
                write!(f, "Object store named \"{}\" does not exist", name)
            }
            Error::Connection(msg) => write!(f, "Connection error: {}", msg),
            Error::Request(msg) => write!(f, "Request error: {}", msg),
            Error::Channel(msg) => write!(f, "Channel error: {}", msg),
            Error::ClientClosed => write!(f, "Client closed"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
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

/// A specialized `Result` type for kvstash operations.
pub type Result<T> = std::result::Result<T, Error>;
