//! Recorder lifecycle across browser contexts.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use drover_server::InstrumentationBus;

use crate::frames::ActionExecutor;
use crate::recorder::{ContextRecorder, RecorderConfig};

/// Owns one [`ContextRecorder`] per live browser context, keyed by the
/// context's guid. Recorders are created on first use and torn down when
/// their context closes.
pub struct RecorderManager {
    executor: Arc<dyn ActionExecutor>,
    instrumentation: Arc<InstrumentationBus>,
    config: RecorderConfig,
    recorders: Mutex<HashMap<Arc<str>, Arc<ContextRecorder>>>,
}

impl RecorderManager {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        instrumentation: Arc<InstrumentationBus>,
        config: RecorderConfig,
    ) -> Self {
        Self {
            executor,
            instrumentation,
            config,
            recorders: Mutex::new(HashMap::new()),
        }
    }

    /// The recorder for a context, created on first request.
    pub fn recorder_for(&self, context_guid: &Arc<str>) -> Arc<ContextRecorder> {
        let mut recorders = self.recorders.lock();
        if let Some(existing) = recorders.get(context_guid) {
            return Arc::clone(existing);
        }
        let recorder = ContextRecorder::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.instrumentation),
            self.config.clone(),
        );
        recorders.insert(Arc::clone(context_guid), Arc::clone(&recorder));
        recorder
    }

    pub fn get(&self, context_guid: &str) -> Option<Arc<ContextRecorder>> {
        self.recorders.lock().get(context_guid).cloned()
    }

    /// Tears down the recorder for a closed context, committing and
    /// flushing first.
    pub async fn remove(&self, context_guid: &str) {
        let recorder = self.recorders.lock().remove(context_guid);
        if let Some(recorder) = recorder {
            recorder.close().await;
        }
    }

    /// Closes every recorder, used at session teardown.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.recorders.lock().drain().collect();
        for (_, recorder) in drained {
            recorder.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.recorders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorders.lock().is_empty()
    }
}
