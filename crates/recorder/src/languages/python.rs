//! Python (sync API) emitter.

use drover_protocol::{Action, ActionInContext, FrameDescription, Modifier, MouseButton, Signal};

use super::LanguageGenerator;
use super::javascript::modifier_name;

const INDENT: &str = "    ";

pub struct PythonGenerator;

impl LanguageGenerator for PythonGenerator {
    fn id(&self) -> &'static str {
        "python"
    }

    fn label(&self) -> &'static str {
        "recording.py"
    }

    fn group(&self) -> &'static str {
        "Python"
    }

    fn header(&self) -> String {
        [
            "from drover.sync_api import sync_drover",
            "",
            "with sync_drover() as drover:",
            "    browser = drover.launch(headless=False)",
            "    context = browser.new_context()",
            "    page = context.new_page()",
        ]
        .join("\n")
    }

    fn footer(&self) -> String {
        ["    context.close()", "    browser.close()"].join("\n")
    }

    fn render_action(&self, action: &ActionInContext) -> String {
        let page = &action.frame.page_alias;
        let subject = subject(&action.frame);
        let mut lines: Vec<String> = Vec::new();

        for signal in &action.signals {
            if let Signal::Dialog { .. } = signal {
                lines.push(format!(
                    "{INDENT}{page}.once(\"dialog\", lambda dialog: dialog.dismiss())"
                ));
            }
        }

        lines.push(format!("{INDENT}{}", action_line(&subject, action)));

        if let Some(error) = &action.error {
            lines.push(format!("{INDENT}# failed: {error}"));
        }

        for signal in &action.signals {
            match signal {
                Signal::Popup { popup_alias } => lines.push(format!(
                    "{INDENT}{popup_alias} = {page}.wait_for_event(\"popup\")"
                )),
                Signal::Download { download_alias } => lines.push(format!(
                    "{INDENT}{download_alias} = {page}.wait_for_event(\"download\")"
                )),
                Signal::Navigation { url } => {
                    lines.push(format!("{INDENT}{page}.wait_for_url({})", quote(url)))
                }
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
        } => {
            let mut call = format!("{subject}.click({}", quote(selector));
            match button {
                MouseButton::Left => {}
                MouseButton::Middle => call.push_str(", button=\"middle\""),
                MouseButton::Right => call.push_str(", button=\"right\""),
            }
            if *click_count > 1 {
                call.push_str(&format!(", click_count={click_count}"));
            }
            if !modifiers.is_empty() {
                let list = modifiers
                    .iter()
                    .map(|m| format!("\"{}\"", modifier_name(*m)))
                    .collect::<Vec<_>>()
                    .join(", ");
                call.push_str(&format!(", modifiers=[{list}]"));
            }
            call.push(')');
            call
        }
        Action::Press {
            selector,
            key,
            modifiers,
        } => {
            let mut parts: Vec<&str> = modifiers.iter().map(|m| modifier_name(*m)).collect();
            parts.push(key);
            format!(
                "{subject}.press({}, {})",
                quote(selector),
                quote(&parts.join("+"))
            )
        }
        Action::Fill { selector, text } => {
            format!("{subject}.fill({}, {})", quote(selector), quote(text))
        }
        Action::Check { selector } => format!("{subject}.check({})", quote(selector)),
        Action::Uncheck { selector } => format!("{subject}.uncheck({})", quote(selector)),
        Action::Select { selector, options } => {
            let list = options.iter().map(|o| quote(o)).collect::<Vec<_>>();
            let rendered = if list.len() == 1 {
                list.into_iter().next().unwrap_or_default()
            } else {
                format!("[{}]", list.join(", "))
            };
            format!("{subject}.select_option({}, {rendered})", quote(selector))
        }
        Action::Navigate { url } => format!("{subject}.goto({})", quote(url)),
        Action::OpenPage { url } => {
            if url.is_empty() || url == "about:blank" {
                format!("{page} = context.new_page()")
            } else {
                format!(
                    "{page} = context.new_page()\n{INDENT}{page}.goto({})",
                    quote(url)
                )
            }
        }
        Action::ClosePage => format!("{page}.close()"),
    }
}

fn subject(frame: &FrameDescription) -> String {
    if frame.is_main_frame {
        return frame.page_alias.clone();
    }
    if let Some(chain) = &frame.selectors_chain {
        let locators: String = chain
            .iter()
            .map(|selector| format!(".frame_locator({})", quote(selector)))
            .collect();
        return format!("{}{locators}", frame.page_alias);
    }
    if let Some(name) = &frame.name {
        return format!("{}.frame(name={})", frame.page_alias, quote(name));
    }
    format!("{}.frame(url={})", frame.page_alias, quote(&frame.url))
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
