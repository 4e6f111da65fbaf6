//! Wire envelopes crossing the worker boundary.
//!
//! A request carries a correlation id, an operation name, and explicit
//! optional `key`/`value`/`query` fields. Presence is encoded with `Option`
//! so that empty strings and other falsy payloads survive the wire intact.
//! The matching response echoes the id and carries either a result value or
//! a serializable error payload.

use crate::error::Error;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Correlation token stamped on a request and echoed on its response.
pub type RequestId = Uuid;

/// The fixed registry of operations a store worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Open (or reuse) the store connection
    Connect,
    /// Close the store connection
    Close,
    /// Remove every record from the store
    Clear,
    /// Remove one record by key
    Delete,
    /// Fetch one record by key
    Get,
    /// Fetch all records, optionally filtered by a query
    GetAll,
    /// Insert or update one record
    Set,
    /// Destroy all state for the database
    DeleteDatabase,
}

impl Operation {
    /// Every supported operation, in registry order.
    pub const ALL: [Operation; 8] = [
        Operation::Connect,
        Operation::Close,
        Operation::Clear,
        Operation::Delete,
        Operation::Get,
        Operation::GetAll,
        Operation::Set,
        Operation::DeleteDatabase,
    ];

    /// The wire name of this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Close => "close",
            Operation::Clear => "clear",
            Operation::Delete => "delete",
            Operation::Get => "get",
            Operation::GetAll => "getAll",
            Operation::Set => "set",
            Operation::DeleteDatabase => "deleteDatabase",
        }
    }

    /// Looks a wire name up in the registry.
    pub fn parse(name: &str) -> Option<Operation> {
        Operation::ALL.iter().copied().find(|op| op.as_str() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key filter for `getAll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    /// Exactly one key
    Key(String),
    /// A set of keys
    Keys(Vec<String>),
}

/// A request envelope sent to a store worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id, unique among in-flight requests
    pub id: RequestId,
    /// Operation name, validated against the registry by the dispatcher
    pub name: String,
    /// Primary key argument, when the operation takes one
    pub key: Option<String>,
    /// Value argument, for `set`
    pub value: Option<Value>,
    /// Key filter, for `getAll`
    pub query: Option<Query>,
}

impl RequestEnvelope {
    /// Builds an envelope for `op` with a fresh correlation id.
    pub fn new(op: Operation) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: op.as_str().to_string(),
            key: None,
            value: None,
            query: None,
        }
    }

    /// Attaches a key argument.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a value argument.
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Attaches a key filter.
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }
}

/// Coarse classification of a wire-transported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad input shape or type
    Parameter,
    /// Object store already exists
    StoreExists,
    /// Object store does not exist
    StoreNotFound,
    /// Open or upgrade failure
    Connection,
    /// A single storage operation failed
    Request,
    /// Worker-level fault outside the request/response protocol
    Channel,
    /// Client torn down with the request still pending
    ClientClosed,
    /// I/O failure
    Io,
    /// Encoding/decoding failure
    Serialization,
}

/// Serializable projection of [`Error`] for response envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error class
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

impl From<&Error> for ErrorPayload {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::Parameter(_) => ErrorKind::Parameter,
            Error::StoreExists(_) => ErrorKind::StoreExists,
            Error::StoreNotFound(_) => ErrorKind::StoreNotFound,
            Error::Connection(_) => ErrorKind::Connection,
            Error::Request(_) => ErrorKind::Request,
            Error::Channel(_) => ErrorKind::Channel,
            Error::ClientClosed => ErrorKind::ClientClosed,
            Error::Io(_) => ErrorKind::Io,
            Error::Serialization(_) => ErrorKind::Serialization,
        };
        ErrorPayload {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<ErrorPayload> for Error {
    fn from(payload: ErrorPayload) -> Self {
        match payload.kind {
            ErrorKind::Parameter => Error::Parameter(payload.message),
            ErrorKind::StoreExists => Error::StoreExists(payload.message),
            ErrorKind::StoreNotFound => Error::StoreNotFound(payload.message),
            ErrorKind::Connection => Error::Connection(payload.message),
            ErrorKind::Request => Error::Request(payload.message),
            ErrorKind::Channel => Error::Channel(payload.message),
            ErrorKind::ClientClosed => Error::ClientClosed,
            ErrorKind::Io => Error::Io(std::io::Error::other(payload.message)),
            ErrorKind::Serialization => Error::Serialization(payload.message),
        }
    }
}

/// A response envelope emitted by a store worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation id echoed from the request
    pub id: RequestId,
    /// Operation name echoed from the request
    pub name: String,
    /// The operation's result, or the error that failed it
    pub detail: std::result::Result<Option<Value>, ErrorPayload>,
}
