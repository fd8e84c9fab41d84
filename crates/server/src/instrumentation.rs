//! Process-wide instrumentation bus.
//!
//! Domain operations call [`InstrumentationBus::on_before_call`] before
//! starting work and [`InstrumentationBus::on_after_call`] after finishing,
//! success or failure - exactly one pair per logical call. Listeners get
//! synchronous, ordered delivery and must keep their handlers to
//! bookkeeping; anything slow belongs in a spawned task that the
//! instrumented call does not wait on.

use parking_lot::Mutex;
use std::sync::Arc;

use drover_protocol::CallMetadata;

/// Cross-cutting observer of dispatched calls (recorder, debugger, tracer).
#[allow(unused_variables)]
pub trait InstrumentationListener: Send + Sync {
    fn on_before_call(&self, metadata: &CallMetadata) {}

    fn on_after_call(&self, metadata: &CallMetadata) {}

    /// Incremental progress text for long operations; fires zero or more
    /// times between a before/after pair.
    fn on_call_log(&self, metadata: &CallMetadata, log_name: &str, message: &str) {}
}

/// Ordered listener registry shared by one session.
#[derive(Default)]
pub struct InstrumentationBus {
    listeners: Mutex<Vec<Arc<dyn InstrumentationListener>>>,
}

impl InstrumentationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn InstrumentationListener>) {
        self.listeners.lock().push(listener);
    }

    /// Removes a previously added listener, matched by identity.
    pub fn remove_listener(&self, listener: &Arc<dyn InstrumentationListener>) {
        self.listeners
            .lock()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn on_before_call(&self, metadata: &CallMetadata) {
        for listener in self.snapshot() {
            listener.on_before_call(metadata);
        }
    }

    pub fn on_after_call(&self, metadata: &CallMetadata) {
        for listener in self.snapshot() {
            listener.on_after_call(metadata);
        }
    }

    pub fn on_call_log(&self, metadata: &CallMetadata, log_name: &str, message: &str) {
        for listener in self.snapshot() {
            listener.on_call_log(metadata, log_name, message);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn InstrumentationListener>> {
        self.listeners.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct CountingListener {
        before: Mutex<u32>,
        after: Mutex<u32>,
        logs: Mutex<Vec<String>>,
    }

    impl InstrumentationListener for CountingListener {
        fn on_before_call(&self, _metadata: &CallMetadata) {
            *self.before.lock() += 1;
        }

        fn on_after_call(&self, _metadata: &CallMetadata) {
            *self.after.lock() += 1;
        }

        fn on_call_log(&self, _metadata: &CallMetadata, log_name: &str, message: &str) {
            self.logs.lock().push(format!("{log_name}: {message}"));
        }
    }

    fn metadata() -> CallMetadata {
        CallMetadata::new(1, Arc::from("page@a"), "click", Value::Null)
    }

    #[test]
    fn delivers_before_after_pairs() {
        let bus = InstrumentationBus::new();
        let listener = Arc::new(CountingListener::default());
        bus.add_listener(listener.clone());

        let meta = metadata();
        bus.on_before_call(&meta);
        bus.on_call_log(&meta, "action", "retrying");
        bus.on_after_call(&meta);

        assert_eq!(*listener.before.lock(), 1);
        assert_eq!(*listener.after.lock(), 1);
        assert_eq!(listener.logs.lock().as_slice(), ["action: retrying"]);
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let bus = InstrumentationBus::new();
        let listener = Arc::new(CountingListener::default());
        let as_dyn: Arc<dyn InstrumentationListener> = listener.clone();
        bus.add_listener(as_dyn.clone());
        bus.remove_listener(&as_dyn);

        bus.on_before_call(&metadata());
        assert_eq!(*listener.before.lock(), 0);
    }
}
