use crate::dialect::DOCUMENT_TITLE;
use crate::{TranscriptRecord, TranscriptRole};

/// Escapes `& < > " '` for use in element text and attribute values.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Encodes a linear chain as a standalone export document.
///
/// System turns are not exported. Each assistant turn is written as a
/// single markdown block holding its escaped raw text.
#[must_use]
pub fn encode(records: &[TranscriptRecord]) -> String {
    let turns: Vec<String> = records.iter().filter_map(encode_turn).collect();

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{DOCUMENT_TITLE}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        turns.join("\n")
    )
}

fn encode_turn(record: &TranscriptRecord) -> Option<String> {
    let id = escape_html(&record.id);
    let content = escape_html(&record.content);

    match record.role {
        TranscriptRole::User => Some(format!(
            "<article data-turn=\"user\" data-turn-id=\"{id}\">\n  <div data-message-author-role=\"user\">\n    <div class=\"whitespace-pre-wrap\">{content}</div>\n  </div>\n</article>"
        )),
        TranscriptRole::Assistant => Some(format!(
            "<article data-turn=\"assistant\" data-turn-id=\"{id}\">\n  <div class=\"markdown\">{content}</div>\n</article>"
        )),
        TranscriptRole::System => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{encode, escape_html};
    use crate::{TranscriptRecord, TranscriptRole};

    #[test]
    fn escapes_all_five_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn user_turn_uses_fixed_wrapper() {
        let html = encode(&[TranscriptRecord::new("u1", TranscriptRole::User, "Hello")]);

        assert!(html.starts_with("<!DOCTYPE html>\n"));
        assert!(html.contains("<meta charset=\"utf-8\">"));
        assert!(html.contains("<title>Chat Export</title>"));
        assert!(html.contains(
            "<article data-turn=\"user\" data-turn-id=\"u1\">\n  <div data-message-author-role=\"user\">\n    <div class=\"whitespace-pre-wrap\">Hello</div>\n  </div>\n</article>"
        ));
    }

    #[test]
    fn system_turns_are_skipped() {
        let html = encode(&[
            TranscriptRecord::new("s", TranscriptRole::System, "be brief"),
            TranscriptRecord::new("a", TranscriptRole::Assistant, "ok"),
        ]);

        assert!(!html.contains("be brief"));
        assert_eq!(html.matches("<article").count(), 1);
    }

    #[test]
    fn ids_are_escaped() {
        let html = encode(&[TranscriptRecord::new("a\"b", TranscriptRole::Assistant, "x")]);
        assert!(html.contains("data-turn-id=\"a&quot;b\""));
    }
}
