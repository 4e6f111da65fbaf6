//! # kvstash Core
//!
//! Shared types for the kvstash embedded key-value stash: the error
//! taxonomy, the opaque [`Value`] model, the wire envelopes that cross the
//! worker boundary, and the [`StoreFacade`] trait implemented by the
//! concrete stores.
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of kvstash.**
//!
//! Users should depend on the main `kvstash` crate instead, which provides
//! the stable public API. This crate's API may change without notice
//! between minor versions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod facade;
pub mod value;

pub use envelope::{
    ErrorKind, ErrorPayload, Operation, Query, RequestEnvelope, RequestId, ResponseEnvelope,
};
pub use error::{Error, Result};
pub use facade::StoreFacade;
pub use value::Value;
