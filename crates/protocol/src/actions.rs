//! The recorded-action data model.
//!
//! An [`ActionInContext`] pairs an [`Action`] with the frame it targeted and
//! collects out-of-band [`Signal`]s (navigation, popup, download, dialog)
//! that the recorder attributes to it. The action set here is the
//! representative subset the merging and performing algorithms need; it is
//! not an exhaustive catalog of browser operations.

use serde::{Deserialize, Serialize};

use crate::metadata::Point;

/// Keyboard modifiers held during an input action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Modifier {
    Alt,
    Control,
    Meta,
    Shift,
}

/// Mouse button for click actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

/// One user action, tagged by name on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum Action {
    #[serde(rename_all = "camelCase")]
    Click {
        selector: String,
        #[serde(default)]
        button: MouseButton,
        #[serde(default)]
        modifiers: Vec<Modifier>,
        #[serde(default = "default_click_count")]
        click_count: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<Point>,
    },
    Press {
        selector: String,
        key: String,
        #[serde(default)]
        modifiers: Vec<Modifier>,
    },
    Fill {
        selector: String,
        text: String,
    },
    Check {
        selector: String,
    },
    Uncheck {
        selector: String,
    },
    Select {
        selector: String,
        options: Vec<String>,
    },
    Navigate {
        url: String,
    },
    OpenPage {
        url: String,
    },
    ClosePage,
}

fn default_click_count() -> u32 {
    1
}

impl Action {
    /// The wire tag for this action, as emitted by generators.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Press { .. } => "press",
            Action::Fill { .. } => "fill",
            Action::Check { .. } => "check",
            Action::Uncheck { .. } => "uncheck",
            Action::Select { .. } => "select",
            Action::Navigate { .. } => "navigate",
            Action::OpenPage { .. } => "openPage",
            Action::ClosePage => "closePage",
        }
    }

    /// The target selector, for actions that have one.
    pub fn selector(&self) -> Option<&str> {
        match self {
            Action::Click { selector, .. }
            | Action::Press { selector, .. }
            | Action::Fill { selector, .. }
            | Action::Check { selector }
            | Action::Uncheck { selector }
            | Action::Select { selector, .. } => Some(selector),
            _ => None,
        }
    }

    /// True for actions that may trigger navigation and therefore go through
    /// the perform path rather than record-only intake.
    pub fn may_navigate(&self) -> bool {
        matches!(
            self,
            Action::Click { .. }
                | Action::Press { .. }
                | Action::Check { .. }
                | Action::Uncheck { .. }
                | Action::Select { .. }
        )
    }
}

/// An out-of-band browser event attributed to an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum Signal {
    Navigation {
        url: String,
    },
    #[serde(rename_all = "camelCase")]
    Popup {
        popup_alias: String,
    },
    #[serde(rename_all = "camelCase")]
    Download {
        download_alias: String,
    },
    #[serde(rename_all = "camelCase")]
    Dialog {
        dialog_alias: String,
    },
}

/// Which frame an action targeted, with enough structure to relocate it.
///
/// For nested frames the recorder attaches a parent-to-child selector chain
/// when it can compute one in time; otherwise it degrades to the frame's URL
/// and (if unique among siblings) its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDescription {
    pub page_alias: String,
    pub is_main_frame: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selectors_chain: Option<Vec<String>>,
}

impl FrameDescription {
    pub fn main_frame(page_alias: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            page_alias: page_alias.into(),
            is_main_frame: true,
            url: url.into(),
            name: None,
            selectors_chain: None,
        }
    }
}

/// One entry in the action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionInContext {
    pub frame: FrameDescription,
    pub action: Action,
    /// Signals attached after creation, in observation order.
    #[serde(default)]
    pub signals: Vec<Signal>,
    /// Once committed, no further signals may attach.
    pub committed: bool,
    /// Set when the perform step failed; the action stays in the log so
    /// generated code reflects that the attempt was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix timestamp in milliseconds when the action was opened.
    pub start_time: i64,
}

impl ActionInContext {
    pub fn new(frame: FrameDescription, action: Action) -> Self {
        Self {
            frame,
            action,
            signals: Vec::new(),
            committed: false,
            error: None,
            start_time: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_tag_names() {
        let click = Action::Click {
            selector: "#go".to_string(),
            button: MouseButton::Left,
            modifiers: vec![],
            click_count: 1,
            position: None,
        };
        assert_eq!(click.name(), "click");
        assert!(click.may_navigate());

        let json = serde_json::to_value(&click).unwrap();
        assert_eq!(json["name"], "click");
        assert_eq!(json["selector"], "#go");

        let nav = Action::Navigate {
            url: "https://example.com".to_string(),
        };
        assert_eq!(nav.name(), "navigate");
        assert!(!nav.may_navigate());
    }

    #[test]
    fn signal_wire_shape() {
        let signal = Signal::Popup {
            popup_alias: "popup1".to_string(),
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["name"], "popup");
        assert_eq!(json["popupAlias"], "popup1");
    }

    #[test]
    fn frame_description_omits_empty_chain() {
        let frame = FrameDescription::main_frame("page", "https://example.com");
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("selectorsChain").is_none());
        assert_eq!(json["isMainFrame"], true);
    }
}
