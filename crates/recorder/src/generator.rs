//! Action log and code-generator registry.
//!
//! The [`CodeGenerator`] owns the ordered action log for one recording
//! session. At most one action is open (uncommitted) at a time; every
//! mutation entry point commits the previously-open action before opening a
//! new one, and each entry point fires exactly one change notification
//! after applying its effect - subscribers never observe partial states.
//!
//! On every change the full [`Source`] set is regenerated, one per
//! registered language with the primary first. Projections are rebuilt from
//! scratch, never patched incrementally.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use drover_protocol::{ActionInContext, Signal};

use crate::error::{Error, Result};
use crate::languages::LanguageGenerator;

/// Highlight category for a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HighlightKind {
    Error,
    Paused,
    Running,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHighlight {
    pub line: u32,
    #[serde(rename = "type")]
    pub kind: HighlightKind,
}

/// One generated-source projection, owned by the UI layer and fully
/// regenerated on every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub label: String,
    pub group: String,
    pub language: String,
    pub text: String,
    pub highlight: Vec<SourceHighlight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal_line: Option<u32>,
}

/// Receives the regenerated source set after every log mutation.
pub trait GeneratorSubscriber: Send + Sync {
    fn sources_changed(&self, sources: &[Source]);
}

/// Ordered action log plus the registry of interested language generators.
pub struct CodeGenerator {
    languages: Mutex<Vec<Arc<dyn LanguageGenerator>>>,
    actions: Mutex<Vec<ActionInContext>>,
    subscribers: Mutex<Vec<Arc<dyn GeneratorSubscriber>>>,
}

impl CodeGenerator {
    pub fn new(languages: Vec<Arc<dyn LanguageGenerator>>) -> Self {
        Self {
            languages: Mutex::new(languages),
            actions: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn GeneratorSubscriber>) {
        self.subscribers.lock().push(subscriber);
    }

    /// Selects the primary language, moving its generator to the front of
    /// the registry. All other generators stay registered for simultaneous
    /// multi-language preview.
    pub fn set_output(&self, primary_language: &str) -> Result<()> {
        let mut languages = self.languages.lock();
        let index = languages
            .iter()
            .position(|l| l.id() == primary_language)
            .ok_or_else(|| Error::UnsupportedLanguage(primary_language.to_string()))?;
        let primary = languages.remove(index);
        languages.insert(0, primary);
        Ok(())
    }

    pub fn primary_language(&self) -> Option<String> {
        self.languages.lock().first().map(|l| l.id().to_string())
    }

    /// Snapshot of the action log.
    pub fn actions(&self) -> Vec<ActionInContext> {
        self.actions.lock().clone()
    }

    /// True while the last action still accepts signals.
    pub fn has_open_action(&self) -> bool {
        self.actions.lock().last().map(|a| !a.committed).unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Mutation entry points - one change notification each
    // -----------------------------------------------------------------------

    /// Appends a new action, committing the previously-open one first. The
    /// new action is left open for signal attachment.
    pub fn add_action(&self, action: ActionInContext) {
        {
            let mut actions = self.actions.lock();
            commit_last(&mut actions);
            actions.push(action);
        }
        self.notify_changed();
    }

    /// Same bookkeeping as [`add_action`](Self::add_action), used by the
    /// perform path before the action is attempted against the live frame.
    pub fn will_perform_action(&self, action: ActionInContext) {
        self.add_action(action);
    }

    /// The perform step succeeded; the action stays open for signals.
    pub fn did_perform_action(&self) {
        self.notify_changed();
    }

    /// The perform step failed: the action closes to signals and carries
    /// the error so generated code reflects the failed attempt.
    pub fn performed_action_failed(&self, error: String) {
        {
            let mut actions = self.actions.lock();
            if let Some(last) = actions.last_mut() {
                last.committed = true;
                last.error = Some(error);
            }
        }
        self.notify_changed();
    }

    /// Attaches a signal to the open action, if any. Returns false - with
    /// no change notification - when no action is open; the caller decides
    /// whether the signal becomes a standalone action.
    pub fn signal(&self, signal: Signal) -> bool {
        let attached = {
            let mut actions = self.actions.lock();
            match actions.last_mut() {
                Some(last) if !last.committed => {
                    last.signals.push(signal);
                    true
                }
                _ => false,
            }
        };
        if attached {
            self.notify_changed();
        }
        attached
    }

    /// Closes the open action to further signals.
    pub fn commit_last_action(&self) {
        let changed = {
            let mut actions = self.actions.lock();
            commit_last(&mut actions)
        };
        if changed {
            self.notify_changed();
        }
    }

    /// Drops the whole log.
    pub fn clear(&self) {
        self.actions.lock().clear();
        self.notify_changed();
    }

    // -----------------------------------------------------------------------
    // Projection
    // -----------------------------------------------------------------------

    /// Regenerates all source projections, primary language first.
    pub fn sources(&self) -> Vec<Source> {
        let actions = self.actions.lock().clone();
        let languages = self.languages.lock().clone();
        languages
            .iter()
            .map(|language| project(language.as_ref(), &actions))
            .collect()
    }

    fn notify_changed(&self) {
        let sources = self.sources();
        for subscriber in self.subscribers.lock().iter() {
            subscriber.sources_changed(&sources);
        }
    }
}

fn commit_last(actions: &mut [ActionInContext]) -> bool {
    match actions.last_mut() {
        Some(last) if !last.committed => {
            last.committed = true;
            true
        }
        _ => false,
    }
}

fn project(language: &dyn LanguageGenerator, actions: &[ActionInContext]) -> Source {
    let header = language.header();
    let mut lines: Vec<String> = header.lines().map(str::to_string).collect();
    let mut highlight = Vec::new();
    let mut reveal_line = None;

    for action in actions {
        let first_line = lines.len() as u32 + 1;
        let rendered = language.render_action(action);
        lines.extend(rendered.lines().map(str::to_string));

        if action.error.is_some() {
            highlight.push(SourceHighlight {
                line: first_line,
                kind: HighlightKind::Error,
            });
        } else if !action.committed {
            highlight.push(SourceHighlight {
                line: first_line,
                kind: HighlightKind::Running,
            });
            reveal_line = Some(first_line);
        }
    }

    lines.extend(language.footer().lines().map(str::to_string));

    Source {
        id: language.id().to_string(),
        label: language.label().to_string(),
        group: language.group().to_string(),
        language: language.id().to_string(),
        text: lines.join("\n") + "\n",
        highlight,
        reveal_line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::default_registry;
    use drover_protocol::{Action, FrameDescription};

    fn click(selector: &str) -> ActionInContext {
        ActionInContext::new(
            FrameDescription::main_frame("page", "https://example.com"),
            Action::Click {
                selector: selector.to_string(),
                button: Default::default(),
                modifiers: vec![],
                click_count: 1,
                position: None,
            },
        )
    }

    #[test]
    fn at_most_one_open_action() {
        let generator = CodeGenerator::new(default_registry());
        generator.add_action(click("#one"));
        generator.add_action(click("#two"));
        generator.add_action(click("#three"));

        let actions = generator.actions();
        let open: Vec<_> = actions.iter().filter(|a| !a.committed).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(actions[0].committed, true);
        assert_eq!(actions[1].committed, true);
    }

    #[test]
    fn signal_attaches_to_open_action_only() {
        let generator = CodeGenerator::new(default_registry());
        generator.add_action(click("#one"));

        let attached = generator.signal(Signal::Popup {
            popup_alias: "popup1".to_string(),
        });
        assert!(attached);
        assert_eq!(generator.actions()[0].signals.len(), 1);

        generator.commit_last_action();
        let attached = generator.signal(Signal::Navigation {
            url: "https://example.com/next".to_string(),
        });
        assert!(!attached, "no open action, caller handles standalone");
        assert_eq!(generator.actions()[0].signals.len(), 1);
    }

    #[test]
    fn failed_action_is_closed_and_marked() {
        let generator = CodeGenerator::new(default_registry());
        generator.will_perform_action(click("#broken"));
        generator.performed_action_failed("element not found".to_string());

        let actions = generator.actions();
        assert!(actions[0].committed);
        assert_eq!(actions[0].error.as_deref(), Some("element not found"));
        assert!(!generator.signal(Signal::Navigation {
            url: "x".to_string()
        }));
    }

    #[test]
    fn set_output_reorders_primary_first() {
        let generator = CodeGenerator::new(default_registry());
        generator.set_output("python").unwrap();
        assert_eq!(generator.primary_language().as_deref(), Some("python"));

        let sources = generator.sources();
        assert_eq!(sources[0].language, "python");
        assert!(sources.len() > 1, "other generators stay registered");
    }

    #[test]
    fn set_output_rejects_unknown_language() {
        let generator = CodeGenerator::new(default_registry());
        let err = generator.set_output("cobol").unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(_)));
    }

    #[test]
    fn every_mutation_notifies_exactly_once() {
        struct Counter(Mutex<u32>);
        impl GeneratorSubscriber for Counter {
            fn sources_changed(&self, _sources: &[Source]) {
                *self.0.lock() += 1;
            }
        }

        let generator = CodeGenerator::new(default_registry());
        let counter = Arc::new(Counter(Mutex::new(0)));
        generator.subscribe(counter.clone());

        generator.add_action(click("#one")); // 1
        generator.signal(Signal::Navigation {
            url: "https://e.com".to_string(),
        }); // 2
        generator.commit_last_action(); // 3
        generator.commit_last_action(); // already committed, no notification

        assert_eq!(*counter.0.lock(), 3);
    }

    #[test]
    fn open_action_highlighted_as_running() {
        let generator = CodeGenerator::new(default_registry());
        generator.add_action(click("#one"));
        let sources = generator.sources();
        let running: Vec<_> = sources[0]
            .highlight
            .iter()
            .filter(|h| h.kind == HighlightKind::Running)
            .collect();
        assert_eq!(running.len(), 1);
        assert_eq!(sources[0].reveal_line, Some(running[0].line));
    }
}
