//! The isolated-context side: one thread, one facade, one dispatch loop.

use kvstash_core::{
    Error, ErrorPayload, Operation, Query, RequestEnvelope, ResponseEnvelope, Result, StoreFacade,
    Value,
};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;
use tracing::{debug, error};

/// Everything a worker sends back to its client.
#[derive(Debug)]
pub enum WorkerEvent {
    /// The correlated reply to one request
    Response(ResponseEnvelope),
    /// A dispatcher-level fault outside the request/response protocol;
    /// the service instance is unusable afterwards
    Fault(ErrorPayload),
}

/// Handle to a spawned store worker thread.
///
/// The worker exits when every request sender has been dropped, or
/// immediately after emitting a fault.
pub struct StoreWorker {
    handle: Option<JoinHandle<()>>,
}

impl StoreWorker {
    /// Spawns a worker thread owning `facade`. Returns the worker handle,
    /// the request sender, and the event receiver.
    pub fn spawn<F: StoreFacade + 'static>(
        facade: F,
    ) -> (StoreWorker, Sender<RequestEnvelope>, Receiver<WorkerEvent>) {
        let (request_tx, request_rx) = channel::<RequestEnvelope>();
        let (event_tx, event_rx) = channel::<WorkerEvent>();

        let handle = std::thread::spawn(move || run(facade, request_rx, event_tx));

        (
            StoreWorker {
                handle: Some(handle),
            },
            request_tx,
            event_rx,
        )
    }

    /// Waits for the worker thread to exit. Call after dropping every
    /// request sender, or this blocks forever.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StoreWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run<F: StoreFacade>(mut facade: F, requests: Receiver<RequestEnvelope>, events: Sender<WorkerEvent>) {
    while let Ok(request) = requests.recv() {
        let Some(op) = Operation::parse(&request.name) else {
            // Unknown names are fatal for the instance; they can only mean
            // a protocol mismatch between client and worker.
            error!(name = %request.name, "unknown operation");
            let fault = ErrorPayload::from(&Error::Channel(format!(
                "Unknown operation \"{}\"",
                request.name
            )));
            let _ = events.send(WorkerEvent::Fault(fault));
            return;
        };

        debug!(id = %request.id, op = %op, "dispatching request");
        let detail = dispatch(&mut facade, op, request.key, request.value, request.query);
        let response = ResponseEnvelope {
            id: request.id,
            name: request.name,
            detail: detail.map_err(|e| ErrorPayload::from(&e)),
        };

        if events.send(WorkerEvent::Response(response)).is_err() {
            // Client went away; nothing left to serve.
            return;
        }
    }
}

/// Routes one validated operation to the facade. The primary argument is
/// `key` falling back to a single-key `query`, matching the envelope
/// contract.
fn dispatch<F: StoreFacade>(
    facade: &mut F,
    op: Operation,
    key: Option<String>,
    value: Option<Value>,
    query: Option<Query>,
) -> Result<Option<Value>> {
    let key_or_query = |key: Option<String>, query: &Option<Query>| {
        key.or_else(|| match query {
            Some(Query::Key(k)) => Some(k.clone()),
            _ => None,
        })
    };

    match op {
        Operation::Connect => facade.connect().map(|ok| Some(Value::Bool(ok))),
        Operation::Close => facade.close().map(|ok| Some(Value::Bool(ok))),
        Operation::Clear => facade.clear().map(|_| None),
        Operation::DeleteDatabase => facade.delete_database().map(|ok| Some(Value::Bool(ok))),
        Operation::Get => {
            let key = key_or_query(key, &query)
                .ok_or_else(|| Error::Parameter("\"get\" requires a key".to_string()))?;
            facade.get(&key)
        }
        Operation::Delete => {
            let key = key_or_query(key, &query)
                .ok_or_else(|| Error::Parameter("\"delete\" requires a key".to_string()))?;
            facade.delete(&key).map(|_| None)
        }
        Operation::Set => {
            let key = key
                .ok_or_else(|| Error::Parameter("\"set\" requires a key".to_string()))?;
            let value = value
                .ok_or_else(|| Error::Parameter("\"set\" requires a value".to_string()))?;
            facade.set(&key, value).map(|k| Some(Value::Text(k)))
        }
        Operation::GetAll => {
            let query = query.or(key.map(Query::Key));
            facade.get_all(query).map(|records| Some(Value::List(records)))
        }
    }
}
