//! The foreground side: request building, correlation, blocking verbs.

use crate::worker::{StoreWorker, WorkerEvent};
use kvstash_core::{
    Error, Operation, Query, RequestEnvelope, RequestId, ResponseEnvelope, Result, Value,
};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error};

type Resolver = Sender<Result<Option<Value>>>;

/// The pending-request table: correlation id -> resolver. Instance-scoped;
/// entries live from send to resolve.
type PendingTable = Arc<Mutex<HashMap<RequestId, Resolver>>>;

/// A not-yet-resolved reply to one request.
///
/// Dropping it abandons the reply; the router discards the late response as
/// unmatched.
#[derive(Debug)]
pub struct PendingReply {
    rx: Receiver<Result<Option<Value>>>,
}

impl PendingReply {
    /// Blocks until the correlated response arrives.
    pub fn wait(self) -> Result<Option<Value>> {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            // Resolver dropped without resolving: the client was torn down.
            Err(_) => Err(Error::ClientClosed),
        }
    }
}

/// Foreground handle to a store worker.
///
/// Presents the eight verbs while transparently delegating every operation
/// to the worker. Requests leave in FIFO order; responses are matched by
/// correlation id, so out-of-order completion cannot mis-deliver a result.
pub struct RemoteStoreClient {
    requests: Option<Sender<RequestEnvelope>>,
    pending: PendingTable,
    poisoned: Arc<Mutex<Option<String>>>,
    router: Option<JoinHandle<()>>,
    worker: Option<StoreWorker>,
}

impl RemoteStoreClient {
    /// Builds a client over raw channel endpoints. Prefer
    /// [`spawn_service`](crate::spawn_service) unless you are supplying the
    /// worker side yourself (tests do).
    pub fn new(requests: Sender<RequestEnvelope>, events: Receiver<WorkerEvent>) -> Self {
        Self::build(requests, events, None, None)
    }

    /// Like [`new`](Self::new), with an error callback invoked on worker
    /// faults. The callback runs on the router thread.
    pub fn with_error_handler(
        requests: Sender<RequestEnvelope>,
        events: Receiver<WorkerEvent>,
        on_error: Box<dyn Fn(&Error) + Send>,
    ) -> Self {
        Self::build(requests, events, None, Some(on_error))
    }

    pub(crate) fn with_worker(
        requests: Sender<RequestEnvelope>,
        events: Receiver<WorkerEvent>,
        worker: StoreWorker,
        on_error: Option<Box<dyn Fn(&Error) + Send>>,
    ) -> Self {
        Self::build(requests, events, Some(worker), on_error)
    }

    fn build(
        requests: Sender<RequestEnvelope>,
        events: Receiver<WorkerEvent>,
        worker: Option<StoreWorker>,
        on_error: Option<Box<dyn Fn(&Error) + Send>>,
    ) -> Self {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let poisoned = Arc::new(Mutex::new(None));

        let router = {
            let pending = Arc::clone(&pending);
            let poisoned = Arc::clone(&poisoned);
            std::thread::spawn(move || route(events, pending, poisoned, on_error))
        };

        RemoteStoreClient {
            requests: Some(requests),
            pending,
            poisoned,
            router: Some(router),
            worker,
        }
    }

    /// Builds and dispatches a request envelope, registering its resolver
    /// before the send so the response can never race past it.
    pub fn send(
        &self,
        op: Operation,
        key: Option<String>,
        value: Option<Value>,
        query: Option<Query>,
    ) -> Result<PendingReply> {
        if let Some(message) = self.fault_message()? {
            return Err(Error::Channel(message));
        }
        let requests = self.requests.as_ref().ok_or(Error::ClientClosed)?;

        let mut envelope = RequestEnvelope::new(op);
        envelope.key = key;
        envelope.value = value;
        envelope.query = query;
        let id = envelope.id;

        let (tx, rx) = channel();
        self.lock_pending()?.insert(id, tx);

        if requests.send(envelope).is_err() {
            self.lock_pending()?.remove(&id);
            return Err(Error::Channel("Worker is no longer running".to_string()));
        }

        Ok(PendingReply { rx })
    }

    /// Opens (or reuses) the store connection.
    pub fn connect(&self) -> Result<bool> {
        expect_bool(self.send(Operation::Connect, None, None, None)?.wait()?)
    }

    /// Fetches the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.send(Operation::Get, Some(key.to_string()), None, None)?
            .wait()
    }

    /// Inserts or updates the value for `key`; returns the primary key.
    pub fn set(&self, key: &str, value: Value) -> Result<String> {
        let detail = self
            .send(Operation::Set, Some(key.to_string()), Some(value), None)?
            .wait()?;
        match detail {
            Some(Value::Text(k)) => Ok(k),
            other => Err(Error::Channel(format!(
                "Unexpected reply to \"set\": {:?}",
                other
            ))),
        }
    }

    /// Removes the value for `key`; absent keys are a quiet success.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.send(Operation::Delete, Some(key.to_string()), None, None)?
            .wait()?;
        Ok(())
    }

    /// Fetches all records, optionally filtered; empty means `vec![]`.
    pub fn get_all(&self, query: Option<Query>) -> Result<Vec<Value>> {
        let detail = self.send(Operation::GetAll, None, None, query)?.wait()?;
        match detail {
            Some(Value::List(records)) => Ok(records),
            None => Ok(Vec::new()),
            other => Err(Error::Channel(format!(
                "Unexpected reply to \"getAll\": {:?}",
                other
            ))),
        }
    }

    /// Removes every record from the store.
    pub fn clear(&self) -> Result<()> {
        self.send(Operation::Clear, None, None, None)?.wait()?;
        Ok(())
    }

    /// Closes the store connection.
    pub fn close(&self) -> Result<()> {
        self.send(Operation::Close, None, None, None)?.wait()?;
        Ok(())
    }

    /// Destroys all state for the backing database.
    pub fn delete_database(&self) -> Result<bool> {
        expect_bool(
            self.send(Operation::DeleteDatabase, None, None, None)?
                .wait()?,
        )
    }

    /// Tears the client down: stops accepting requests, rejects everything
    /// still pending, and joins the router and worker threads.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        // Dropping the sender lets the worker loop finish; the router then
        // drains, rejects any survivors, and exits.
        self.requests = None;
        if let Some(worker) = self.worker.take() {
            worker.join();
        }
        if let Some(router) = self.router.take() {
            let _ = router.join();
        }
    }

    fn fault_message(&self) -> Result<Option<String>> {
        Ok(self
            .poisoned
            .lock()
            .map_err(|_| Error::Channel("Fault flag lock poisoned".to_string()))?
            .clone())
    }

    fn lock_pending(&self) -> Result<std::sync::MutexGuard<'_, HashMap<RequestId, Resolver>>> {
        self.pending
            .lock()
            .map_err(|_| Error::Channel("Pending table lock poisoned".to_string()))
    }
}

impl Drop for RemoteStoreClient {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn expect_bool(detail: Option<Value>) -> Result<bool> {
    match detail {
        Some(Value::Bool(ok)) => Ok(ok),
        other => Err(Error::Channel(format!("Unexpected reply: {:?}", other))),
    }
}

/// Unwraps a response detail the way callers expect: a map holding a
/// `"value"` field resolves to that field, anything else resolves as-is.
fn unwrap_detail(detail: Option<Value>) -> Option<Value> {
    match detail {
        Some(record) => match record.get("value") {
            Some(value) => Some(value.clone()),
            None => Some(record),
        },
        None => None,
    }
}

fn route(
    events: Receiver<WorkerEvent>,
    pending: PendingTable,
    poisoned: Arc<Mutex<Option<String>>>,
    on_error: Option<Box<dyn Fn(&Error) + Send>>,
) {
    for event in events {
        match event {
            WorkerEvent::Response(ResponseEnvelope { id, name, detail }) => {
                let resolver = match pending.lock() {
                    Ok(mut table) => table.remove(&id),
                    Err(_) => return,
                };
                match resolver {
                    Some(tx) => {
                        let outcome = detail.map(unwrap_detail).map_err(Error::from);
                        let _ = tx.send(outcome);
                    }
                    // Duplicate delivery or a stale client; tolerated but
                    // worth a diagnostic.
                    None => debug!(%id, %name, "response with no pending request"),
                }
            }
            WorkerEvent::Fault(payload) => {
                let fault = Error::from(payload);
                error!(%fault, "worker fault; abandoning pending requests");
                if let Ok(mut flag) = poisoned.lock() {
                    *flag = Some(fault.to_string());
                }
                if let Some(callback) = &on_error {
                    callback(&fault);
                }
                reject_all(&pending, Error::Channel);
                return;
            }
        }
    }

    // Worker channel closed: reject whatever is still pending.
    reject_all(&pending, |_| Error::ClientClosed);
}

fn reject_all(pending: &PendingTable, make_error: impl Fn(String) -> Error) {
    if let Ok(mut table) = pending.lock() {
        for (_, tx) in table.drain() {
            let _ = tx.send(Err(make_error("Worker fault".to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvstash_core::{ErrorKind, ErrorPayload};
    fn new_response(id: RequestId, name: &str, detail: Option<Value>) -> WorkerEvent {
        WorkerEvent::Response(ResponseEnvelope {
            id,
            name: name.to_string(),
            detail: Ok(detail),
        })
    }

    /// A client over hand-held channels, so tests control the worker side.
    fn manual_client() -> (
        RemoteStoreClient,
        Receiver<RequestEnvelope>,
        Sender<WorkerEvent>,
    ) {
        let (request_tx, request_rx) = channel();
        let (event_tx, event_rx) = channel();
        let client = RemoteStoreClient::new(request_tx, event_rx);
        (client, request_rx, event_tx)
    }

    #[test]
    fn test_out_of_order_responses_resolve_correctly() {
        let (client, requests, events) = manual_client();

        let reply_a = client
            .send(Operation::Get, Some("a".to_string()), None, None)
            .unwrap();
        let reply_b = client
            .send(Operation::Get, Some("b".to_string()), None, None)
            .unwrap();

        let env_a = requests.recv().unwrap();
        let env_b = requests.recv().unwrap();
        assert_eq!(env_a.key.as_deref(), Some("a"));
        assert_eq!(env_b.key.as_deref(), Some("b"));

        // B completes before A; correlation must still route each reply
        // to its own caller.
        events
            .send(new_response(env_b.id, "get", Some(Value::from("value-b"))))
            .unwrap();
        events
            .send(new_response(env_a.id, "get", Some(Value::from("value-a"))))
            .unwrap();

        assert_eq!(reply_a.wait().unwrap(), Some(Value::from("value-a")));
        assert_eq!(reply_b.wait().unwrap(), Some(Value::from("value-b")));
    }

    #[test]
    fn test_detail_value_field_is_unwrapped() {
        let (client, requests, events) = manual_client();

        let reply = client
            .send(Operation::Get, Some("theme".to_string()), None, None)
            .unwrap();
        let env = requests.recv().unwrap();

        let record = Value::map([
            ("key".to_string(), Value::from("theme")),
            ("value".to_string(), Value::from("dark")),
        ]);
        events.send(new_response(env.id, "get", Some(record))).unwrap();

        assert_eq!(reply.wait().unwrap(), Some(Value::from("dark")));
    }

    #[test]
    fn test_unmatched_response_is_ignored() {
        let (client, requests, events) = manual_client();

        // A response nobody asked for.
        events
            .send(new_response(
                RequestEnvelope::new(Operation::Get).id,
                "get",
                Some(Value::from("stale")),
            ))
            .unwrap();

        // The client still works afterwards.
        let reply = client
            .send(Operation::Get, Some("k".to_string()), None, None)
            .unwrap();
        let env = requests.recv().unwrap();
        events
            .send(new_response(env.id, "get", Some(Value::from("fresh"))))
            .unwrap();
        assert_eq!(reply.wait().unwrap(), Some(Value::from("fresh")));
    }

    #[test]
    fn test_fault_rejects_pending_and_poisons() {
        let (request_tx, _request_rx) = channel();
        let (event_tx, event_rx) = channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_cb = Arc::clone(&seen);
        let client = RemoteStoreClient::with_error_handler(
            request_tx,
            event_rx,
            Box::new(move |err| {
                seen_in_cb.lock().unwrap().push(err.to_string());
            }),
        );

        let reply = client
            .send(Operation::Get, Some("k".to_string()), None, None)
            .unwrap();

        event_tx
            .send(WorkerEvent::Fault(ErrorPayload {
                kind: ErrorKind::Channel,
                message: "dispatcher blew up".to_string(),
            }))
            .unwrap();

        // The pending request is rejected, not left hanging.
        assert!(matches!(reply.wait().unwrap_err(), Error::Channel(_)));

        // The instance is poisoned for every later request.
        let err = loop {
            match client.send(Operation::Get, Some("k".to_string()), None, None) {
                Err(e) => break e,
                // The router may not have processed the fault yet.
                Ok(_) => std::thread::yield_now(),
            }
        };
        assert!(matches!(err, Error::Channel(_)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_teardown_rejects_pending() {
        let (client, _requests, events) = manual_client();

        let reply = client
            .send(Operation::Get, Some("k".to_string()), None, None)
            .unwrap();

        drop(events);
        client.shutdown();

        assert!(matches!(reply.wait().unwrap_err(), Error::ClientClosed));
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let (request_tx, request_rx) = channel();
        let (event_tx, event_rx) = channel();
        let mut client = RemoteStoreClient::new(request_tx, event_rx);

        drop(event_tx);
        drop(request_rx);
        client.teardown();

        assert!(matches!(
            client
                .send(Operation::Connect, None, None, None)
                .unwrap_err(),
            Error::ClientClosed
        ));
    }
}
