use std::collections::HashSet;

use crate::dialect::{
    AUTHOR_ROLE_ATTR, IMAGE_ALT_MARKERS, IMAGE_PLACEHOLDER, MARKDOWN_CLASS, SYNTHETIC_ID_PREFIX,
    TURN_ID_ATTR, TURN_ROLE_ATTR, TURN_TAG, USER_TEXT_CLASS,
};
use crate::extract::extract_markdown;
use crate::markup::{parse_document, MarkupNode, Node};
use crate::{TranscriptRecord, TranscriptRole};

/// Decodes an exported conversation into flat records in document order.
///
/// Never fails. Turns with an unknown role or no extractable content are
/// skipped; turns without a usable id get `imported-<turn index>`.
#[must_use]
pub fn decode(markup: &str) -> Vec<TranscriptRecord> {
    let document = parse_document(markup);
    let mut turns = Vec::new();
    document.find_outermost(
        &|node: &Node| node.is_element(TURN_TAG) && node.attribute(TURN_ROLE_ATTR).is_some(),
        &mut turns,
    );

    let mut used_ids: HashSet<String> = turns
        .iter()
        .filter_map(|turn| declared_id(*turn))
        .map(str::to_string)
        .collect();
    let mut records = Vec::with_capacity(turns.len());

    for (index, turn) in turns.into_iter().enumerate() {
        let role_attr = turn.attribute(TURN_ROLE_ATTR).unwrap_or_default();
        let (role, content) = match role_attr.trim() {
            "user" => (TranscriptRole::User, user_content(turn)),
            "assistant" => (TranscriptRole::Assistant, assistant_content(turn)),
            other => {
                tracing::debug!(turn = index, role = other, "skipping turn with unknown role");
                continue;
            }
        };

        let content = content.trim();
        if content.is_empty() {
            tracing::debug!(turn = index, role = role.as_str(), "dropping empty turn");
            continue;
        }

        let id = match declared_id(turn) {
            Some(id) => id.to_string(),
            None => synthesize_id(index, &mut used_ids),
        };
        records.push(TranscriptRecord::new(id, role, content));
    }

    tracing::debug!(records = records.len(), "decoded transcript");
    records
}

fn declared_id<N: MarkupNode>(turn: &N) -> Option<&str> {
    turn.attribute(TURN_ID_ATTR)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

fn synthesize_id(index: usize, used_ids: &mut HashSet<String>) -> String {
    let base = format!("{SYNTHETIC_ID_PREFIX}-{index}");
    let mut candidate = base.clone();
    let mut suffix = 1;
    while used_ids.contains(&candidate) {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    used_ids.insert(candidate.clone());
    candidate
}

fn user_content<N: MarkupNode>(turn: &N) -> String {
    let text = turn
        .find_descendant(&|node: &N| {
            node.is_element("div") && node.attribute(AUTHOR_ROLE_ATTR) == Some("user")
        })
        .and_then(|author| author.find_descendant(&|node: &N| node.has_class(USER_TEXT_CLASS)))
        .map(|locus| locus.text_content())
        .unwrap_or_default();

    if !text.trim().is_empty() {
        return text;
    }

    let has_image = turn
        .find_descendant(&|node: &N| {
            node.is_element("img")
                && node
                    .attribute("alt")
                    .is_some_and(|alt| IMAGE_ALT_MARKERS.contains(&alt.trim()))
        })
        .is_some();

    if has_image {
        IMAGE_PLACEHOLDER.to_string()
    } else {
        String::new()
    }
}

fn assistant_content<N: MarkupNode>(turn: &N) -> String {
    let mut blocks = Vec::new();
    turn.find_outermost(&|node: &N| node.has_class(MARKDOWN_CLASS), &mut blocks);

    blocks
        .into_iter()
        .map(extract_markdown)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::synthesize_id;
    use std::collections::HashSet;

    #[test]
    fn synthesized_ids_avoid_declared_ones() {
        let mut used: HashSet<String> = ["imported-0".to_string()].into_iter().collect();

        assert_eq!(synthesize_id(0, &mut used), "imported-0-1");
        assert_eq!(synthesize_id(0, &mut used), "imported-0-2");
        assert_eq!(synthesize_id(1, &mut used), "imported-1");
    }
}
