//! Session routing - inbound commands to dispatchers, outbound events back.
//!
//! One `Session` owns one connection's dispatcher tree. Inbound `Request`
//! envelopes are routed by guid and method; the result (or structured error)
//! is correlated back by request id. Dispatchers announce lifecycle to the
//! client through `__create__` and `__dispose__` events, and no event is
//! emitted for a guid after its disposal.
//!
//! Every dispatched call is wrapped by the instrumentation bus - exactly one
//! before/after pair per call, even on failure - and user-visible calls wait
//! on the pause controller at the call boundary.

use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use drover_protocol::{CallMetadata, Event, Message, Request, Response, Validator};

use crate::dispatcher::{DispatcherHandler, DispatcherNode};
use crate::error::{Error, Result};
use crate::instrumentation::InstrumentationBus;
use crate::object_store::ObjectStore;
use crate::pause::PauseController;
use crate::transport::TransportParts;

/// Server side of one client connection.
pub struct Session {
    store: ObjectStore,
    validator: Validator,
    instrumentation: Arc<InstrumentationBus>,
    pause: Arc<PauseController>,
    /// Dropped at teardown so the writer can drain and exit.
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    next_guid: AtomicU64,
    next_call_id: AtomicU64,
    /// In-flight calls keyed by call token; entries are removed on
    /// completion, failed ones retained separately for display.
    inflight: Mutex<HashMap<u64, CallMetadata>>,
    failed: Mutex<Vec<CallMetadata>>,
}

impl Session {
    /// Creates a session plus the receiver for its outbound messages.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Value>) {
        Self::with_validator(Validator::with_defaults())
    }

    pub fn with_validator(validator: Validator) -> (Arc<Self>, mpsc::UnboundedReceiver<Value>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            store: ObjectStore::new(),
            validator,
            instrumentation: Arc::new(InstrumentationBus::new()),
            pause: Arc::new(PauseController::new()),
            outbound_tx: Mutex::new(Some(outbound_tx)),
            next_guid: AtomicU64::new(1),
            next_call_id: AtomicU64::new(1),
            inflight: Mutex::new(HashMap::new()),
            failed: Mutex::new(Vec::new()),
        });
        (session, outbound_rx)
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn instrumentation(&self) -> &Arc<InstrumentationBus> {
        &self.instrumentation
    }

    pub fn pause_controller(&self) -> &Arc<PauseController> {
        &self.pause
    }

    /// Allocates a unique call token for synthetic (recorder-made) calls.
    pub fn next_call_id(&self) -> u64 {
        self.next_call_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Calls currently in flight, e.g. what a paused UI is waiting on.
    pub fn inflight_calls(&self) -> Vec<CallMetadata> {
        self.inflight.lock().values().cloned().collect()
    }

    /// Completed calls that failed, retained for inspection and rerun.
    pub fn failed_calls(&self) -> Vec<CallMetadata> {
        self.failed.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Dispatcher lifecycle
    // -----------------------------------------------------------------------

    /// Creates a dispatcher node under `parent` and announces it to the
    /// client. Fails only if the parent has begun disposal.
    pub fn create_dispatcher(
        &self,
        parent: Option<&Arc<DispatcherNode>>,
        handler: Arc<dyn DispatcherHandler>,
        initializer: Value,
    ) -> Result<Arc<DispatcherNode>> {
        if let Some(parent) = parent {
            if !parent.is_active() {
                return Err(Error::DisposedParent {
                    guid: parent.guid().to_string(),
                });
            }
        }

        let ordinal = self.next_guid.fetch_add(1, Ordering::SeqCst);
        let guid: Arc<str> = Arc::from(format!("{}@{ordinal:08x}", handler.type_tag()).as_str());
        let node = DispatcherNode::new(Arc::clone(&guid), parent, handler, initializer.clone());

        if let Some(parent) = parent {
            parent.add_child(Arc::clone(&node));
        }
        self.store.insert(guid, Arc::clone(&node));

        let parent_guid: Arc<str> = parent.map(|p| p.guid_arc()).unwrap_or_else(|| Arc::from(""));
        self.send_raw_event(Event {
            guid: parent_guid,
            method: "__create__".to_string(),
            params: json!({
                "type": node.type_tag(),
                "guid": node.guid(),
                "initializer": initializer,
            }),
        });

        tracing::debug!(guid = node.guid(), "created dispatcher");
        Ok(node)
    }

    /// Disposes the node and its subtree, children before parents.
    /// Idempotent: disposing an unknown or already-disposed guid is a no-op.
    pub fn dispose(&self, guid: &str) {
        let Some(node) = self.store.try_get(guid) else {
            return;
        };
        let parent = node.parent();
        self.dispose_subtree(&node);
        if let Some(parent) = parent {
            parent.remove_child(node.guid());
        }
    }

    fn dispose_subtree(&self, node: &Arc<DispatcherNode>) {
        if !node.begin_dispose() {
            return;
        }
        for child in node.take_children() {
            self.dispose_subtree(&child);
        }
        node.handler().on_dispose();
        self.store.remove(node.guid());
        self.send_raw_event(Event {
            guid: node.guid_arc(),
            method: "__dispose__".to_string(),
            params: json!({}),
        });
        node.finish_dispose();
        tracing::debug!(guid = node.guid(), "disposed dispatcher");
    }

    /// Emits a domain event from a live dispatcher. Events for disposed or
    /// unknown guids are dropped.
    pub fn emit_event(&self, node: &DispatcherNode, method: &str, params: Value) {
        if !node.is_active() || !self.store.contains(node.guid()) {
            tracing::debug!(
                guid = node.guid(),
                method,
                "event after disposal (dropped)"
            );
            return;
        }
        self.send_raw_event(Event {
            guid: node.guid_arc(),
            method: method.to_string(),
            params,
        });
    }

    fn send_raw_event(&self, event: Event) {
        self.send_value(&event);
    }

    fn send_value<T: serde::Serialize>(&self, message: &T) {
        match serde_json::to_value(message) {
            Ok(value) => {
                if let Some(tx) = self.outbound_tx.lock().as_ref() {
                    let _ = tx.send(value);
                }
            }
            Err(e) => tracing::error!("failed to serialize outbound message: {e}"),
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Routes one command to its dispatcher and produces the response.
    ///
    /// Never panics and never hangs on a disposed guid: an absent or
    /// disposing node resolves with `UnknownObject`, which callers treat as
    /// benign.
    pub async fn dispatch(self: &Arc<Self>, request: Request) -> Response {
        self.pause.admit().await;

        let Some(node) = self.store.try_get(&request.guid) else {
            let err = Error::UnknownObject {
                guid: request.guid.to_string(),
            };
            tracing::debug!(guid = %request.guid, "dispatch to unknown object (benign)");
            return Response::err(request.id, err.to_payload());
        };
        if !node.is_active() {
            // Caught mid-disposal: still resolvable, but no longer usable.
            let err = Error::TargetClosed {
                target_type: node.type_tag().to_string(),
                context: request.method.clone(),
            };
            return Response::err(request.id, err.to_payload());
        }

        let params = match self
            .validator
            .validate_params(node.type_tag(), &request.method, &request.params)
        {
            Ok(params) => params,
            Err(e) => return Response::err(request.id, Error::from(e).to_payload()),
        };

        let call_id = self.next_call_id();
        let mut metadata = CallMetadata::new(
            call_id,
            request.guid.clone(),
            &request.method,
            params.clone(),
        );

        self.inflight.lock().insert(call_id, metadata.clone());
        self.instrumentation.on_before_call(&metadata);

        let result = node.handler().handle(&request.method, params, &metadata).await;

        self.inflight.lock().remove(&call_id);
        metadata.complete(result.as_ref().err().map(ToString::to_string));
        self.instrumentation.on_after_call(&metadata);

        match result {
            Ok(value) => {
                if let Err(e) =
                    self.validator
                        .validate_result(node.type_tag(), &request.method, &value)
                {
                    return Response::err(request.id, Error::from(e).to_payload());
                }
                Response::ok(request.id, value)
            }
            Err(err) => {
                self.failed.lock().push(metadata);
                tracing::debug!(
                    guid = %request.guid,
                    method = %request.method,
                    error = %err,
                    "dispatch failed"
                );
                Response::err(request.id, err.to_payload())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Connection loop
    // -----------------------------------------------------------------------

    /// Runs the session against a transport until the peer disconnects,
    /// then tears down the dispatcher tree.
    pub async fn run(
        self: Arc<Self>,
        parts: TransportParts,
        mut outbound_rx: mpsc::UnboundedReceiver<Value>,
    ) {
        let TransportParts {
            mut sender,
            receiver,
            mut message_rx,
        } = parts;

        let reader = tokio::spawn(async move {
            if let Err(e) = receiver.run().await {
                tracing::error!("transport read error: {e}");
            }
        });

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sender.send(message).await {
                    tracing::error!("transport write error: {e}");
                    break;
                }
            }
            let _ = sender.close().await;
        });

        while let Some(value) = message_rx.recv().await {
            match serde_json::from_value::<Message>(value) {
                Ok(Message::Request(request)) => {
                    let session = Arc::clone(&self);
                    tokio::spawn(async move {
                        let response = session.dispatch(request).await;
                        session.send_value(&response);
                    });
                }
                Ok(other) => {
                    tracing::debug!("ignoring non-command message: {other:?}");
                }
                Err(e) => {
                    tracing::error!("failed to parse inbound message: {e}");
                }
            }
        }

        // Peer gone: dispose every remaining root so pending work resolves.
        for root in self.store.roots() {
            self.dispose(root.guid());
        }

        // Dropping the sender closes the channel once the final dispose
        // events are drained, letting the writer finish.
        self.outbound_tx.lock().take();

        let _ = reader.await;
        let _ = writer.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::NoopHandler;
    use crate::instrumentation::InstrumentationListener;
    use futures_util::future::BoxFuture;

    fn noop(tag: &'static str) -> Arc<dyn DispatcherHandler> {
        Arc::new(NoopHandler::new(tag))
    }

    fn request(guid: &str, method: &str, params: Value) -> Request {
        Request {
            id: 1,
            guid: Arc::from(guid),
            method: method.to_string(),
            params,
            metadata: Value::Null,
        }
    }

    fn drain_events(rx: &mut mpsc::UnboundedReceiver<Value>) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(value) = rx.try_recv() {
            events.push(value);
        }
        events
    }

    #[tokio::test]
    async fn create_announces_to_client() {
        let (session, mut rx) = Session::new();
        let browser = session
            .create_dispatcher(None, noop("browser"), json!({"version": "1.0"}))
            .unwrap();

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["method"], "__create__");
        assert_eq!(events[0]["guid"], "");
        assert_eq!(events[0]["params"]["type"], "browser");
        assert_eq!(events[0]["params"]["guid"], browser.guid());
    }

    #[tokio::test]
    async fn create_under_disposed_parent_fails() {
        let (session, _rx) = Session::new();
        let parent = session
            .create_dispatcher(None, noop("browser"), Value::Null)
            .unwrap();
        session.dispose(parent.guid());

        let err = session
            .create_dispatcher(Some(&parent), noop("browserContext"), Value::Null)
            .unwrap_err();
        assert!(matches!(err, Error::DisposedParent { .. }));
    }

    #[tokio::test]
    async fn dispose_is_recursive_children_first_and_idempotent() {
        let (session, mut rx) = Session::new();
        let parent = session
            .create_dispatcher(None, noop("browserContext"), Value::Null)
            .unwrap();
        let child_a = session
            .create_dispatcher(Some(&parent), noop("page"), Value::Null)
            .unwrap();
        let child_b = session
            .create_dispatcher(Some(&parent), noop("page"), Value::Null)
            .unwrap();
        drain_events(&mut rx);

        session.dispose(parent.guid());

        let events = drain_events(&mut rx);
        let dispose_guids: Vec<&str> = events
            .iter()
            .filter(|e| e["method"] == "__dispose__")
            .map(|e| e["guid"].as_str().unwrap())
            .collect();
        assert_eq!(dispose_guids.len(), 3);
        assert_eq!(dispose_guids[2], parent.guid(), "parent disposed last");
        assert!(dispose_guids[..2].contains(&child_a.guid()));
        assert!(dispose_guids[..2].contains(&child_b.guid()));
        assert!(session.store().is_empty());

        // Second disposal is a no-op, not an error.
        session.dispose(parent.guid());
        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn no_events_after_disposal() {
        let (session, mut rx) = Session::new();
        let page = session
            .create_dispatcher(None, noop("page"), Value::Null)
            .unwrap();
        drain_events(&mut rx);

        session.dispose(page.guid());
        drain_events(&mut rx);

        session.emit_event(&page, "console", json!({"text": "hi"}));
        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn dispatch_unknown_object_is_benign_error() {
        let (session, _rx) = Session::new();
        let response = session
            .dispatch(request("page@nope", "close", Value::Null))
            .await;
        let error = response.error.unwrap().error;
        assert_eq!(error.name.as_deref(), Some("UnknownObject"));
    }

    #[tokio::test]
    async fn dispatch_mid_disposal_reports_target_closed() {
        let (session, _rx) = Session::new();
        let page = session
            .create_dispatcher(None, noop("page"), Value::Null)
            .unwrap();
        assert!(page.begin_dispose());

        let response = session
            .dispatch(request(page.guid(), "close", Value::Null))
            .await;
        let error = response.error.unwrap().error;
        assert_eq!(error.name.as_deref(), Some("TargetClosedError"));
    }

    #[tokio::test]
    async fn dispatch_validates_params() {
        let (session, _rx) = Session::new();
        let page = session
            .create_dispatcher(None, noop("page"), Value::Null)
            .unwrap();

        let response = session
            .dispatch(request(page.guid(), "click", json!({"selector": 42})))
            .await;
        let error = response.error.unwrap().error;
        assert_eq!(error.name.as_deref(), Some("ValidationError"));
    }

    #[tokio::test]
    async fn dispatch_success_echoes_result() {
        let (session, _rx) = Session::new();
        let page = session
            .create_dispatcher(None, noop("page"), Value::Null)
            .unwrap();

        let response = session
            .dispatch(request(page.guid(), "click", json!({"selector": "#go"})))
            .await;
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["selector"], "#go");
    }

    struct FailingHandler;

    impl DispatcherHandler for FailingHandler {
        fn type_tag(&self) -> &'static str {
            "page"
        }

        fn handle(
            &self,
            _method: &str,
            _params: Value,
            _metadata: &CallMetadata,
        ) -> BoxFuture<'_, Result<Value>> {
            Box::pin(async {
                Err(Error::Domain {
                    name: "TimeoutError".to_string(),
                    message: "waiting for selector \"#go\"".to_string(),
                    stack: None,
                })
            })
        }
    }

    #[derive(Default)]
    struct PairListener {
        before: Mutex<Vec<u64>>,
        after: Mutex<Vec<(u64, bool)>>,
    }

    impl InstrumentationListener for PairListener {
        fn on_before_call(&self, metadata: &CallMetadata) {
            self.before.lock().push(metadata.id);
        }

        fn on_after_call(&self, metadata: &CallMetadata) {
            self.after.lock().push((metadata.id, metadata.error.is_some()));
        }
    }

    #[tokio::test]
    async fn instrumentation_fires_exactly_once_even_on_failure() {
        let (session, _rx) = Session::new();
        let listener = Arc::new(PairListener::default());
        session.instrumentation().add_listener(listener.clone());

        let page = session
            .create_dispatcher(None, Arc::new(FailingHandler), Value::Null)
            .unwrap();
        let response = session
            .dispatch(request(page.guid(), "click", json!({"selector": "#go"})))
            .await;

        let error = response.error.unwrap().error;
        assert_eq!(error.name.as_deref(), Some("TimeoutError"));

        let before = listener.before.lock();
        let after = listener.after.lock();
        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 1);
        assert_eq!(before[0], after[0].0);
        assert!(after[0].1, "error recorded in after-call metadata");

        // Failed call retained for display.
        assert_eq!(session.failed_calls().len(), 1);
        assert!(session.inflight_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn paused_session_queues_commands() {
        let (session, _rx) = Session::new();
        let page = session
            .create_dispatcher(None, noop("page"), Value::Null)
            .unwrap();
        session.pause_controller().pause();

        let pending = {
            let session = Arc::clone(&session);
            let guid = page.guid().to_string();
            tokio::spawn(async move {
                session
                    .dispatch(request(&guid, "click", json!({"selector": "#go"})))
                    .await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!pending.is_finished(), "command queued while paused");

        session.pause_controller().resume(false);
        let response = pending.await.unwrap();
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn run_loop_round_trips_over_loopback() {
        let (session, outbound_rx) = Session::new();
        let page = session
            .create_dispatcher(None, noop("page"), Value::Null)
            .unwrap();

        let (parts, mut client) = crate::transport::loopback();
        let loop_task = tokio::spawn(Arc::clone(&session).run(parts, outbound_rx));

        // The earlier __create__ event arrives first.
        let created = client.from_server.recv().await.unwrap();
        assert_eq!(created["method"], "__create__");

        client
            .to_server
            .send(json!({
                "id": 9,
                "guid": page.guid(),
                "method": "click",
                "params": {"selector": "#go"},
            }))
            .unwrap();

        let response = client.from_server.recv().await.unwrap();
        assert_eq!(response["id"], 9);
        assert_eq!(response["result"]["selector"], "#go");

        // Disconnect: run must terminate, draining the teardown dispose
        // event to the client before the channel closes.
        drop(client.to_server);
        loop_task.await.unwrap();
        assert!(session.store().is_empty(), "teardown disposes the tree");

        let disposed = client.from_server.recv().await.unwrap();
        assert_eq!(disposed["method"], "__dispose__");
        assert_eq!(disposed["guid"], page.guid());
        assert!(client.from_server.recv().await.is_none());
    }
}
