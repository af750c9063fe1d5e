//! Plain-text rendering of the visible chain for the line-oriented CLI.

use crate::session::{Mode, Session};

const CONTINUATION_INDENT: &str = "    ";

/// Numbered visible chain, with sibling positions at branch points.
pub fn render_transcript(session: &Session) -> String {
    let mut out = String::new();

    for (index, message) in session.visible_chain().iter().enumerate() {
        let branch = session
            .sibling_position(message.id.as_str())
            .map(|position| format!(" ({position})"))
            .unwrap_or_default();
        out.push_str(&format!("[{}] {}{branch}:", index + 1, message.role));

        let mut lines = message.content.lines();
        if let Some(first) = lines.next() {
            out.push(' ');
            out.push_str(first);
        }
        out.push('\n');
        for line in lines {
            out.push_str(CONTINUATION_INDENT);
            out.push_str(line);
            out.push('\n');
        }
    }

    if let Some(status) = status_line(session) {
        out.push_str(&status);
        out.push('\n');
    }

    out
}

pub fn status_line(session: &Session) -> Option<String> {
    match &session.mode {
        Mode::Sending { .. } => Some("... waiting for reply (/cancel to stop)".to_string()),
        Mode::Error(_) | Mode::Idle | Mode::Exiting => None,
    }
}

pub fn render_notices(notices: &[String]) -> String {
    notices
        .iter()
        .map(|notice| format!("! {notice}\n"))
        .collect()
}
