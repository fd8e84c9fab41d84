//! Per-context recording state machine.
//!
//! A [`ContextRecorder`] merges two input streams into one ordered action
//! log: explicit user actions (performed or merely recorded) and raw
//! out-of-band browser events. Signals attach to the open action when one
//! exists; otherwise they either become standalone actions (navigation,
//! popup, page close) or are dropped (download, dialog). An idle timer
//! commits the open action so stale signals cannot attach to it.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use drover_protocol::{Action, ActionInContext, CallMetadata, FrameDescription, Signal};
use drover_server::InstrumentationBus;

use crate::aliases::PageAliasTable;
use crate::error::{Error, Result};
use crate::frames::{ActionExecutor, FrameHandle, describe_frame};
use crate::generator::{CodeGenerator, GeneratorSubscriber, Source};
use crate::languages::default_registry;
use crate::output::OutputWriter;

/// Tunables for one recording session. The defaults match interactive use;
/// tests shrink them.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Idle time after which the open action commits.
    pub auto_commit: Duration,
    /// Budget for resolving a nested frame's selector chain.
    pub frame_race: Duration,
    /// Budget for performing one action against the live frame.
    pub perform_timeout: Duration,
    /// Quiet period before generated output hits disk.
    pub debounce: Duration,
    /// When set, the primary language's source is mirrored to this file.
    pub output_file: Option<std::path::PathBuf>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            auto_commit: Duration::from_millis(5000),
            frame_race: Duration::from_millis(2000),
            perform_timeout: Duration::from_millis(5000),
            debounce: Duration::from_millis(250),
            output_file: None,
        }
    }
}

/// An out-of-band browser event before alias resolution.
#[derive(Debug, Clone)]
pub enum RawSignal {
    Navigation { url: String },
    Popup { popup_guid: Arc<str> },
    Download,
    Dialog,
    PageClosed,
}

struct OutputSubscriber(Arc<OutputWriter>);

impl GeneratorSubscriber for OutputSubscriber {
    fn sources_changed(&self, sources: &[Source]) {
        if let Some(primary) = sources.first() {
            self.0.schedule(primary.text.clone());
        }
    }
}

/// Recording state for one browser context.
pub struct ContextRecorder {
    config: RecorderConfig,
    generator: Arc<CodeGenerator>,
    aliases: Mutex<PageAliasTable>,
    executor: Arc<dyn ActionExecutor>,
    instrumentation: Arc<InstrumentationBus>,
    output: Option<Arc<OutputWriter>>,
    autocommit: Mutex<Option<JoinHandle<()>>>,
    next_call_id: AtomicU64,
}

impl ContextRecorder {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        instrumentation: Arc<InstrumentationBus>,
        config: RecorderConfig,
    ) -> Arc<Self> {
        let generator = Arc::new(CodeGenerator::new(default_registry()));
        let output = config
            .output_file
            .as_ref()
            .map(|path| Arc::new(OutputWriter::new(path, config.debounce)));
        if let Some(writer) = &output {
            generator.subscribe(Arc::new(OutputSubscriber(Arc::clone(writer))));
        }
        Arc::new(Self {
            config,
            generator,
            aliases: Mutex::new(PageAliasTable::new()),
            executor,
            instrumentation,
            output,
            autocommit: Mutex::new(None),
            next_call_id: AtomicU64::new(1),
        })
    }

    pub fn generator(&self) -> &Arc<CodeGenerator> {
        &self.generator
    }

    pub fn output_writer(&self) -> Option<&Arc<OutputWriter>> {
        self.output.as_ref()
    }

    /// Selects the primary output language and refreshes the mirrored file.
    pub fn set_output(&self, language: &str) -> Result<()> {
        self.generator.set_output(language)?;
        if let Some(writer) = &self.output {
            if let Some(primary) = self.generator.sources().first() {
                writer.schedule(primary.text.clone());
            }
        }
        Ok(())
    }

    /// Records an action that cannot trigger navigation. No engine call is
    /// made; the action goes straight into the log and stays open.
    pub async fn record_action(&self, frame: &Arc<dyn FrameHandle>, action: Action) {
        // The previous action's idle timer must not outlive its action:
        // left armed, it would commit the new entry instead.
        self.cancel_autocommit();
        let entry = self.describe(frame, action).await;
        self.generator.add_action(entry);
        self.arm_autocommit();
    }

    /// Performs a navigation-risky action against the live frame, then
    /// records it. The engine call is wrapped in instrumentation and a
    /// bounded timeout; on failure the action stays in the log, closed and
    /// carrying the error.
    pub async fn perform_action(&self, frame: &Arc<dyn FrameHandle>, action: Action) -> Result<()> {
        self.cancel_autocommit();
        let entry = self.describe(frame, action.clone()).await;
        self.generator.will_perform_action(entry);

        let id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
        let params = serde_json::to_value(&action)?;
        let mut metadata = CallMetadata::internal(id, frame.page_guid(), action.name(), params);

        self.instrumentation.on_before_call(&metadata);
        let outcome = match tokio::time::timeout(
            self.config.perform_timeout,
            self.executor.perform(frame, &action, &metadata),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Server(e)),
            Err(_) => Err(Error::ActionTimeout {
                action: action.name().to_string(),
                ms: self.config.perform_timeout.as_millis() as u64,
            }),
        };
        metadata.complete(outcome.as_ref().err().map(|e| e.to_string()));
        self.instrumentation.on_after_call(&metadata);

        match outcome {
            Ok(()) => {
                self.generator.did_perform_action();
                self.arm_autocommit();
                Ok(())
            }
            Err(e) => {
                self.generator.performed_action_failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Routes a raw browser event. Attaches to the open action when the
    /// signal kind allows it, otherwise synthesizes a standalone action or
    /// drops the event.
    pub fn signal(&self, page_guid: &Arc<str>, raw: RawSignal) {
        match raw {
            RawSignal::Navigation { url } => {
                let attached = self.generator.signal(Signal::Navigation { url: url.clone() });
                if attached {
                    self.arm_autocommit();
                } else {
                    // Bare navigation (address bar, redirect chain settling)
                    // becomes its own goto.
                    let alias = self.aliases.lock().register(Arc::clone(page_guid));
                    self.generator.add_action(ActionInContext::new(
                        FrameDescription::main_frame(alias, url.clone()),
                        Action::Navigate { url },
                    ));
                    self.arm_autocommit();
                }
            }
            RawSignal::Popup { popup_guid } => {
                let alias = self.aliases.lock().register(popup_guid);
                let attached = self.generator.signal(Signal::Popup {
                    popup_alias: alias.clone(),
                });
                if attached {
                    self.arm_autocommit();
                } else {
                    self.generator.add_action(ActionInContext::new(
                        FrameDescription::main_frame(alias, ""),
                        Action::OpenPage { url: String::new() },
                    ));
                    self.arm_autocommit();
                }
            }
            RawSignal::Download => {
                if self.generator.has_open_action() {
                    let alias = self.aliases.lock().next_download_alias();
                    self.generator.signal(Signal::Download {
                        download_alias: alias,
                    });
                    self.arm_autocommit();
                } else {
                    tracing::debug!(page = %page_guid, "download with no open action, dropped");
                }
            }
            RawSignal::Dialog => {
                if self.generator.has_open_action() {
                    let alias = self.aliases.lock().next_dialog_alias();
                    self.generator.signal(Signal::Dialog { dialog_alias: alias });
                    self.arm_autocommit();
                } else {
                    tracing::debug!(page = %page_guid, "dialog with no open action, dropped");
                }
            }
            RawSignal::PageClosed => {
                // Close is always its own action; nothing may attach to it.
                let alias = {
                    let mut aliases = self.aliases.lock();
                    let alias = aliases.register(Arc::clone(page_guid));
                    aliases.remove(page_guid);
                    alias
                };
                self.generator.add_action(ActionInContext::new(
                    FrameDescription::main_frame(alias, ""),
                    Action::ClosePage,
                ));
                self.generator.commit_last_action();
            }
        }
    }

    /// Closes the open action to further signals.
    pub fn commit(&self) {
        self.cancel_autocommit();
        self.generator.commit_last_action();
    }

    /// Drops the whole log.
    pub fn clear(&self) {
        self.cancel_autocommit();
        self.generator.clear();
    }

    /// Commits outstanding work and flushes pending output.
    pub async fn close(&self) {
        self.cancel_autocommit();
        self.generator.commit_last_action();
        if let Some(writer) = &self.output {
            writer.flush_now().await;
        }
    }

    async fn describe(&self, frame: &Arc<dyn FrameHandle>, action: Action) -> ActionInContext {
        let alias = self.aliases.lock().register(frame.page_guid());
        let description = describe_frame(&alias, frame, self.config.frame_race).await;
        ActionInContext::new(description, action)
    }

    /// (Re)arms the idle timer. Every attach or new action pushes the
    /// commit deadline out by the full window.
    fn arm_autocommit(&self) {
        let generator = Arc::clone(&self.generator);
        let window = self.config.auto_commit;
        let mut slot = self.autocommit.lock();
        if let Some(old) = slot.take() {
            old.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            generator.commit_last_action();
        }));
    }

    fn cancel_autocommit(&self) {
        if let Some(handle) = self.autocommit.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for ContextRecorder {
    fn drop(&mut self) {
        self.cancel_autocommit();
    }
}
