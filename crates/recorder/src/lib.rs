//! Action recording and code generation.
//!
//! A [`ContextRecorder`] observes one browser context: user actions arrive
//! through two intake paths (`perform_action` for navigation-risky actions,
//! `record_action` for the rest), out-of-band browser events arrive as
//! signals and are merged into the temporally-closest open action. The
//! resulting action log feeds a [`CodeGenerator`] that projects one
//! [`Source`] per registered language on every mutation, and optionally a
//! debounced on-disk copy of the primary language.
//!
//! The seams to the actual browser engine are the [`FrameHandle`] and
//! [`ActionExecutor`] traits; everything else is engine-agnostic.

pub mod aliases;
pub mod error;
pub mod frames;
pub mod generator;
pub mod languages;
pub mod manager;
pub mod output;
pub mod recorder;

pub use aliases::PageAliasTable;
pub use error::{Error, Result};
pub use frames::{ActionExecutor, FrameHandle, describe_frame};
pub use generator::{CodeGenerator, GeneratorSubscriber, HighlightKind, Source, SourceHighlight};
pub use languages::{LanguageGenerator, default_registry};
pub use manager::RecorderManager;
pub use output::OutputWriter;
pub use recorder::{ContextRecorder, RawSignal, RecorderConfig};
