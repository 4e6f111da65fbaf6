//! # kvstash Remote Layer
//!
//! Moves storage work off the caller's thread. A [`StoreWorker`] owns one
//! store facade on a private thread and services request envelopes from a
//! FIFO channel; a [`RemoteStoreClient`] presents the same verbs to the
//! foreground and matches responses to callers by correlation id.
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

pub mod client;
pub mod worker;

pub use client::{PendingReply, RemoteStoreClient};
pub use worker::{StoreWorker, WorkerEvent};

use kvstash_core::{Error, StoreFacade};

/// Wires `facade` into a freshly spawned worker and returns a connected
/// client. The facade moves onto the worker thread; the client only ever
/// holds channel endpoints.
pub fn spawn_service<F: StoreFacade + 'static>(facade: F) -> RemoteStoreClient {
    let (worker, requests, events) = StoreWorker::spawn(facade);
    RemoteStoreClient::with_worker(requests, events, worker, None)
}

/// Like [`spawn_service`], with a callback invoked when the worker reports
/// a fault outside the request/response protocol. The callback runs on the
/// client's router thread; the instance is unusable after a fault.
pub fn spawn_service_with_error_handler<F: StoreFacade + 'static>(
    facade: F,
    on_error: Box<dyn Fn(&Error) + Send>,
) -> RemoteStoreClient {
    let (worker, requests, events) = StoreWorker::spawn(facade);
    RemoteStoreClient::with_worker(requests, events, worker, Some(on_error))
}
