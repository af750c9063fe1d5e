use std::sync::OnceLock;

use regex::Regex;

use crate::markup::MarkupNode;

fn language_class_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"language-([a-zA-Z0-9_-]+)").unwrap_or_else(|error| {
            panic!("language class regex must compile: {error}");
        })
    })
}

/// Renders the children of a rich content block as markdown-flavoured text.
///
/// Paragraphs are followed by a blank line, code blocks become fences,
/// list items get `- ` or `n. ` markers, links become `[text](href)` and
/// `<br>` becomes a newline. Every other element is transparent. The
/// result is not trimmed.
#[must_use]
pub fn extract_markdown<N: MarkupNode>(node: &N) -> String {
    let mut out = String::new();
    render_children(node, &mut out);
    out
}

fn render_children<N: MarkupNode>(node: &N, out: &mut String) {
    for child in node.children() {
        render_node(child, out);
    }
}

fn render_node<N: MarkupNode>(node: &N, out: &mut String) {
    if let Some(text) = node.text() {
        out.push_str(text);
        return;
    }

    match node.tag_name().unwrap_or_default() {
        "p" => {
            render_children(node, out);
            out.push_str("\n\n");
        }
        "pre" => render_preformatted(node, out),
        "ul" => render_list(node, out, |_| "- ".to_string()),
        "ol" => render_list(node, out, |index| format!("{}. ", index + 1)),
        "a" => {
            out.push('[');
            out.push_str(&node.text_content());
            out.push_str("](");
            out.push_str(node.attribute("href").unwrap_or_default());
            out.push(')');
        }
        "br" => out.push('\n'),
        _ => render_children(node, out),
    }
}

fn render_preformatted<N: MarkupNode>(node: &N, out: &mut String) {
    let code = node.find_descendant(&|candidate: &N| candidate.is_element("code"));
    let Some(code) = code else {
        out.push_str(&node.text_content());
        out.push_str("\n\n");
        return;
    };

    let language = code
        .attribute("class")
        .and_then(|classes| language_class_regex().captures(classes))
        .and_then(|captures| captures.get(1))
        .map_or("", |found| found.as_str());

    out.push_str("```");
    out.push_str(language);
    out.push('\n');
    out.push_str(&code.text_content());
    out.push_str("\n```\n\n");
}

fn render_list<N: MarkupNode>(node: &N, out: &mut String, marker: impl Fn(usize) -> String) {
    let items = node
        .children()
        .iter()
        .filter(|child| child.is_element("li"));

    for (index, item) in items.enumerate() {
        out.push_str(&marker(index));
        out.push_str(extract_markdown(item).trim());
        out.push('\n');
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::extract_markdown;
    use crate::markup::{parse_document, MarkupNode};

    fn extract_first(markup: &str) -> String {
        let document = parse_document(markup);
        extract_markdown(&document.children()[0])
    }

    #[test]
    fn paragraphs_end_with_blank_line() {
        assert_eq!(
            extract_first("<div><p>one</p><p>two <b>bold</b></p></div>"),
            "one\n\ntwo bold\n\n"
        );
    }

    #[test]
    fn code_block_without_language_has_bare_fence() {
        assert_eq!(
            extract_first("<div><pre><code>x = 1</code></pre></div>"),
            "```\nx = 1\n```\n\n"
        );
    }

    #[test]
    fn code_block_language_comes_from_class() {
        assert_eq!(
            extract_first(
                r#"<div><pre><div>header</div><code class="hljs language-rust">fn main() {}</code></pre></div>"#
            ),
            "```rust\nfn main() {}\n```\n\n"
        );
    }

    #[test]
    fn pre_without_code_keeps_text() {
        assert_eq!(extract_first("<div><pre>plain  text</pre></div>"), "plain  text\n\n");
    }

    #[test]
    fn ordered_list_counts_items_only() {
        assert_eq!(
            extract_first("<div><ol>\n<li>a</li>\n<li><p>b</p></li>\n</ol></div>"),
            "1. a\n2. b\n\n"
        );
    }

    #[test]
    fn unordered_list_uses_dashes() {
        assert_eq!(
            extract_first("<div><ul><li>x</li><li>y</li></ul></div>"),
            "- x\n- y\n\n"
        );
    }

    #[test]
    fn links_and_breaks() {
        assert_eq!(
            extract_first(r#"<div>see <a href="https://a.example/">the <i>docs</i></a><br>next <a>bare</a></div>"#),
            "see [the docs](https://a.example/)\nnext [bare]()"
        );
    }
}
