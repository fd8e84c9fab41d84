//! JavaScript (Node.js) emitter.

use drover_protocol::{Action, ActionInContext, FrameDescription, Modifier, MouseButton, Signal};

use super::LanguageGenerator;

const INDENT: &str = "  ";

pub struct JavaScriptGenerator;

impl LanguageGenerator for JavaScriptGenerator {
    fn id(&self) -> &'static str {
        "javascript"
    }

    fn label(&self) -> &'static str {
        "recording.js"
    }

    fn group(&self) -> &'static str {
        "Node.js"
    }

    fn header(&self) -> String {
        [
            "const { drover } = require('drover');",
            "",
            "(async () => {",
            "  const browser = await drover.launch({ headless: false });",
            "  const context = await browser.newContext();",
            "  const page = await context.newPage();",
        ]
        .join("\n")
    }

    fn footer(&self) -> String {
        ["  await context.close();", "  await browser.close();", "})();"].join("\n")
    }

    fn render_action(&self, action: &ActionInContext) -> String {
        let page = &action.frame.page_alias;
        let subject = subject(&action.frame);
        let mut lines: Vec<String> = Vec::new();

        // Dialog handlers must be installed before the triggering action.
        for signal in &action.signals {
            if let Signal::Dialog { .. } = signal {
                lines.push(format!(
                    "{INDENT}{page}.once('dialog', dialog => dialog.dismiss());"
                ));
            }
        }

        lines.push(format!("{INDENT}{}", action_line(&subject, action)));

        if let Some(error) = &action.error {
            lines.push(format!("{INDENT}// failed: {error}"));
        }

        for signal in &action.signals {
            match signal {
                Signal::Popup { popup_alias } => lines.push(format!(
                    "{INDENT}const {popup_alias} = await {page}.waitForEvent('popup');"
                )),
                Signal::Download { download_alias } => lines.push(format!(
                    "{INDENT}const {download_alias} = await {page}.waitForEvent('download');"
                )),
                Signal::Navigation { url } => lines.push(format!(
                    "{INDENT}await {page}.waitForURL({});",
                    quote(url)
                )),
                Signal::Dialog { .. } => {}
            }
        }

        lines.join("\n")
    }
}

fn action_line(subject: &str, action: &ActionInContext) -> String {
    let page = &action.frame.page_alias;
    match &action.action {
        Action::Click {
            selector,
            button,
            modifiers,
            click_count,
            ..
        } => match click_options(*button, modifiers, *click_count) {
            Some(options) => format!("await {subject}.click({}, {options});", quote(selector)),
            None => format!("await {subject}.click({});", quote(selector)),
        },
        Action::Press {
            selector,
            key,
            modifiers,
        } => format!(
            "await {subject}.press({}, {});",
            quote(selector),
            quote(&key_with_modifiers(key, modifiers))
        ),
        Action::Fill { selector, text } => format!(
            "await {subject}.fill({}, {});",
            quote(selector),
            quote(text)
        ),
        Action::Check { selector } => format!("await {subject}.check({});", quote(selector)),
        Action::Uncheck { selector } => format!("await {subject}.uncheck({});", quote(selector)),
        Action::Select { selector, options } => {
            let list = options.iter().map(|o| quote(o)).collect::<Vec<_>>();
            let rendered = if list.len() == 1 {
                list.into_iter().next().unwrap_or_default()
            } else {
                format!("[{}]", list.join(", "))
            };
            format!("await {subject}.selectOption({}, {rendered});", quote(selector))
        }
        Action::Navigate { url } => format!("await {subject}.goto({});", quote(url)),
        Action::OpenPage { url } => {
            if url.is_empty() || url == "about:blank" {
                format!("const {page} = await context.newPage();")
            } else {
                format!(
                    "const {page} = await context.newPage();\n{INDENT}await {page}.goto({});",
                    quote(url)
                )
            }
        }
        Action::ClosePage => format!("await {page}.close();"),
    }
}

fn subject(frame: &FrameDescription) -> String {
    if frame.is_main_frame {
        return frame.page_alias.clone();
    }
    if let Some(chain) = &frame.selectors_chain {
        let locators: String = chain
            .iter()
            .map(|selector| format!(".frameLocator({})", quote(selector)))
            .collect();
        return format!("{}{locators}", frame.page_alias);
    }
    if let Some(name) = &frame.name {
        return format!("{}.frame({{ name: {} }})", frame.page_alias, quote(name));
    }
    format!("{}.frame({{ url: {} }})", frame.page_alias, quote(&frame.url))
}

fn click_options(button: MouseButton, modifiers: &[Modifier], click_count: u32) -> Option<String> {
    let mut parts = Vec::new();
    match button {
        MouseButton::Left => {}
        MouseButton::Middle => parts.push("button: 'middle'".to_string()),
        MouseButton::Right => parts.push("button: 'right'".to_string()),
    }
    if click_count > 1 {
        parts.push(format!("clickCount: {click_count}"));
    }
    if !modifiers.is_empty() {
        let list = modifiers
            .iter()
            .map(|m| format!("'{}'", modifier_name(*m)))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("modifiers: [{list}]"));
    }
    if parts.is_empty() {
        None
    } else {
        Some(format!("{{ {} }}", parts.join(", ")))
    }
}

fn key_with_modifiers(key: &str, modifiers: &[Modifier]) -> String {
    let mut parts: Vec<&str> = modifiers.iter().map(|m| modifier_name(*m)).collect();
    parts.push(key);
    parts.join("+")
}

pub(super) fn modifier_name(modifier: Modifier) -> &'static str {
    match modifier {
        Modifier::Alt => "Alt",
        Modifier::Control => "Control",
        Modifier::Meta => "Meta",
        Modifier::Shift => "Shift",
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}
