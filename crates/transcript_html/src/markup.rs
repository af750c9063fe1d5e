//! Tolerant HTML tree builder and the node capability trait used by extraction.
//!
//! The builder accepts whatever browsers' exports contain in practice:
//! unquoted or bare attributes, void elements, stray end tags, unclosed
//! elements at end of input. It never fails.

use crate::entities::decode_entities;

/// Capability set text extraction relies on.
pub trait MarkupNode: Sized {
    /// Lowercase tag name; `None` for text nodes.
    fn tag_name(&self) -> Option<&str>;

    fn attribute(&self, name: &str) -> Option<&str>;

    fn children(&self) -> &[Self];

    /// Character data of a text node; `None` for elements.
    fn text(&self) -> Option<&str>;

    fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|name| name == class))
    }

    fn is_element(&self, tag: &str) -> bool {
        self.tag_name() == Some(tag)
    }

    /// Concatenated character data of the subtree, in document order.
    fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// First descendant (excluding `self`) matching `predicate`, depth-first.
    fn find_descendant<P>(&self, predicate: &P) -> Option<&Self>
    where
        P: Fn(&Self) -> bool,
    {
        for child in self.children() {
            if predicate(child) {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(predicate) {
                return Some(found);
            }
        }
        None
    }

    /// Descendants matching `predicate`, without descending into matches.
    fn find_outermost<'a, P>(&'a self, predicate: &P, out: &mut Vec<&'a Self>)
    where
        P: Fn(&Self) -> bool,
    {
        for child in self.children() {
            if predicate(child) {
                out.push(child);
            } else {
                child.find_outermost(predicate, out);
            }
        }
    }
}

fn collect_text<N: MarkupNode>(node: &N, out: &mut String) {
    if let Some(text) = node.text() {
        out.push_str(text);
        return;
    }
    for child in node.children() {
        collect_text(child, out);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(tag: impl Into<String>, attributes: Vec<(String, String)>) -> Self {
        Self {
            tag: tag.into(),
            attributes,
            children: Vec::new(),
        }
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(previous)) = self.children.last_mut() {
            previous.push_str(&text);
        } else {
            self.children.push(Node::Text(text));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl MarkupNode for Node {
    fn tag_name(&self) -> Option<&str> {
        match self {
            Self::Element(element) => Some(&element.tag),
            Self::Text(_) => None,
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            Self::Element(element) => element
                .attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            Self::Text(_) => None,
        }
    }

    fn children(&self) -> &[Self] {
        match self {
            Self::Element(element) => &element.children,
            Self::Text(_) => &[],
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Self::Element(_) => None,
            Self::Text(text) => Some(text),
        }
    }
}

/// Tag name of the synthetic node wrapping a parsed document.
pub const DOCUMENT_TAG: &str = "#document";

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];
const ESCAPABLE_RAW_TEXT_TAGS: &[&str] = &["textarea", "title"];
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "main", "nav", "ol", "p",
    "pre", "section", "table", "ul",
];

/// Parses `input` into a tree rooted at a synthetic [`DOCUMENT_TAG`] element.
#[must_use]
pub fn parse_document(input: &str) -> Node {
    let mut builder = TreeBuilder::new(input);
    builder.run();
    Node::Element(builder.finish())
}

struct TreeBuilder<'a> {
    input: &'a str,
    pos: usize,
    stack: Vec<Element>,
}

impl<'a> TreeBuilder<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            stack: vec![Element::new(DOCUMENT_TAG, Vec::new())],
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn run(&mut self) {
        while self.pos < self.input.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                self.skip_past("-->");
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.skip_past(">");
            } else if rest.starts_with("</") {
                self.end_tag();
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|ch: char| ch.is_ascii_alphabetic())
            {
                self.start_tag();
            } else {
                self.text();
            }
        }
    }

    fn finish(mut self) -> Element {
        while self.stack.len() > 1 {
            self.close_top();
        }
        self.stack.pop().unwrap_or_else(|| Element::new(DOCUMENT_TAG, Vec::new()))
    }

    fn text(&mut self) {
        // A leading '<' that did not open a tag is literal text.
        let rest = self.rest();
        let skip = usize::from(rest.starts_with('<'));
        let end = rest[skip..].find('<').map_or(rest.len(), |index| index + skip);
        let raw = &rest[..end];
        self.pos += end;
        self.current().push_text(decode_entities(raw));
    }

    fn start_tag(&mut self) {
        self.pos += 1;
        let name = self.take_while(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == ':');
        let tag = name.to_ascii_lowercase();
        let (attributes, self_closing) = self.attributes();

        self.apply_implicit_closes(&tag);

        if VOID_TAGS.contains(&tag.as_str()) || self_closing {
            self.current()
                .children
                .push(Node::Element(Element::new(tag, attributes)));
            return;
        }

        if RAW_TEXT_TAGS.contains(&tag.as_str()) || ESCAPABLE_RAW_TEXT_TAGS.contains(&tag.as_str())
        {
            let body = self.raw_text_until_close(&tag);
            let mut element = Element::new(tag.clone(), attributes);
            if ESCAPABLE_RAW_TEXT_TAGS.contains(&tag.as_str()) {
                element.push_text(decode_entities(body));
            } else {
                element.push_text(body.to_string());
            }
            self.current().children.push(Node::Element(element));
            return;
        }

        self.stack.push(Element::new(tag, attributes));
    }

    fn attributes(&mut self) -> (Vec<(String, String)>, bool) {
        let mut attributes = Vec::new();

        loop {
            self.take_while(|ch| ch.is_ascii_whitespace());
            let rest = self.rest();
            if rest.is_empty() {
                return (attributes, false);
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return (attributes, true);
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return (attributes, false);
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }

            let name = self
                .take_while(|ch| !ch.is_ascii_whitespace() && !matches!(ch, '=' | '>' | '/'))
                .to_ascii_lowercase();
            if name.is_empty() {
                // Unparseable byte inside a tag; step over it.
                self.advance_char();
                continue;
            }

            self.take_while(|ch| ch.is_ascii_whitespace());
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.take_while(|ch| ch.is_ascii_whitespace());
                self.attribute_value()
            } else {
                String::new()
            };

            if !attributes.iter().any(|(existing, _)| existing == &name) {
                attributes.push((name, value));
            }
        }
    }

    fn attribute_value(&mut self) -> String {
        let rest = self.rest();
        let quote = match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => quote,
            _ => {
                let raw = self.take_while(|ch| !ch.is_ascii_whitespace() && ch != '>');
                return decode_entities(raw);
            }
        };

        let body = &rest[1..];
        let end = body.find(quote).unwrap_or(body.len());
        let raw = &body[..end];
        self.pos += 1 + end + usize::from(end < body.len());
        decode_entities(raw)
    }

    fn end_tag(&mut self) {
        self.pos += 2;
        let tag = self
            .take_while(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == ':')
            .to_ascii_lowercase();
        self.skip_past(">");

        if let Some(depth) = self.open_depth(&tag, |_| false) {
            while self.stack.len() > depth {
                self.close_top();
            }
        }
    }

    fn apply_implicit_closes(&mut self, tag: &str) {
        if CLOSES_PARAGRAPH.contains(&tag) && self.top_tag() == "p" {
            self.close_top();
        }

        if tag == "li" {
            if let Some(depth) = self.open_depth("li", |open| matches!(open, "ul" | "ol")) {
                while self.stack.len() > depth {
                    self.close_top();
                }
            }
        }
    }

    /// Stack length after popping the nearest open `tag`, searching from the
    /// top and giving up at the document root or a `barrier` element.
    fn open_depth(&self, tag: &str, barrier: impl Fn(&str) -> bool) -> Option<usize> {
        for (index, element) in self.stack.iter().enumerate().skip(1).rev() {
            if element.tag == tag {
                return Some(index);
            }
            if barrier(&element.tag) {
                return None;
            }
        }
        None
    }

    fn raw_text_until_close(&mut self, tag: &str) -> &'a str {
        let rest = self.rest();
        let closing = format!("</{tag}");
        let end = find_ascii_case_insensitive(rest, &closing).unwrap_or(rest.len());
        let body = &rest[..end];
        self.pos += end;
        if end < rest.len() {
            self.skip_past(">");
        }
        body
    }

    fn close_top(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        if let Some(element) = self.stack.pop() {
            self.current().children.push(Node::Element(element));
        }
    }

    fn current(&mut self) -> &mut Element {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn top_tag(&self) -> &str {
        self.stack.last().map_or(DOCUMENT_TAG, |element| element.tag.as_str())
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, ch)| !predicate(*ch))
            .map_or(rest.len(), |(index, _)| index);
        self.pos += end;
        &rest[..end]
    }

    fn advance_char(&mut self) {
        if let Some(ch) = self.rest().chars().next() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_past(&mut self, marker: &str) {
        let rest = self.rest();
        self.pos += rest
            .find(marker)
            .map_or(rest.len(), |index| index + marker.len());
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
