//! `{{placeholder}}` substitution against a notification payload

use crate::notify::NotificationPayload;

/// A rendered template, with any placeholders that had no matching field
#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: String,
    pub unknown: Vec<String>,
}

/// Substitute `{{placeholder}}` tokens with payload fields.
///
/// Unknown placeholders are left verbatim and reported in `unknown`.
pub fn render(template: &str, payload: &NotificationPayload) -> Rendered {
    let text = template
        .replace("{{title}}", &payload.title)
        .replace("{{message}}", &payload.message)
        .replace("{{url}}", &payload.url)
        .replace("{{name}}", &payload.name)
        .replace("{{priority}}", &payload.priority_label)
        .replace("{{priority_num}}", &payload.priority.to_string())
        .replace("{{tags}}", &payload.tags.join(","))
        .replace("{{timestamp}}", &payload.timestamp)
        .replace("{{event}}", &payload.event.to_string())
        .replace("{{hash}}", payload.hash.as_deref().unwrap_or(""))
        .replace("{{diff}}", payload.diff.as_deref().unwrap_or(""));

    let unknown = find_placeholders(&text);
    Rendered { text, unknown }
}

/// List the `{{...}}` tokens remaining in a string
fn find_placeholders(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                found.push(after[..end].to_string());
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    found
}
