//! Per-language code emitters.
//!
//! Each [`LanguageGenerator`] turns one [`ActionInContext`] into a block of
//! source lines; the surrounding [`CodeGenerator`](crate::CodeGenerator)
//! handles ordering, headers, footers, and line accounting. Emitters are
//! stateless: the same log always renders to the same text.

mod javascript;
mod python;

use std::sync::Arc;

use drover_protocol::ActionInContext;

pub use javascript::JavaScriptGenerator;
pub use python::PythonGenerator;

/// One target language for generated recordings.
pub trait LanguageGenerator: Send + Sync {
    /// Stable identifier, e.g. `"javascript"`.
    fn id(&self) -> &'static str;

    /// File label shown to the user, e.g. `"recording.js"`.
    fn label(&self) -> &'static str;

    /// UI grouping, e.g. `"Node.js"`.
    fn group(&self) -> &'static str;

    fn header(&self) -> String;

    fn footer(&self) -> String;

    /// Renders one action with its attached signals. May span multiple
    /// lines; the first line is the action itself unless a dialog handler
    /// has to be installed before it.
    fn render_action(&self, action: &ActionInContext) -> String;
}

/// The built-in emitter set. JavaScript first, so it is the default
/// primary language until [`CodeGenerator::set_output`] reorders.
///
/// [`CodeGenerator::set_output`]: crate::CodeGenerator::set_output
pub fn default_registry() -> Vec<Arc<dyn LanguageGenerator>> {
    vec![
        Arc::new(JavaScriptGenerator),
        Arc::new(PythonGenerator),
    ]
}
