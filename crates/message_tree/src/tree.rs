use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::TreeError;
use crate::message::{now_rfc3339, FlatRecord, Message, MessageId, NewMessage, Role};

pub(crate) type NodeMap = HashMap<MessageId, Arc<Message>>;

/// Sibling navigation direction at a branch point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// Zero-based position of a message among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiblingPosition {
    pub index: usize,
    pub total: usize,
}

impl SiblingPosition {
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.index > 0
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.index + 1 < self.total
    }
}

impl fmt::Display for SiblingPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.index + 1, self.total)
    }
}

/// Message tree plus the pointer to the leaf the visible chain ends at.
///
/// Roots are siblings of each other in creation order; `selected_root_id`
/// plays the role a parent's `selected_child_id` plays for other messages.
#[derive(Debug, Clone, Default)]
pub struct MessageTree {
    nodes: Arc<NodeMap>,
    current_leaf_id: Option<MessageId>,
    selected_root_id: Option<MessageId>,
    next_seq: u64,
}

impl MessageTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        nodes: NodeMap,
        current_leaf_id: Option<MessageId>,
        next_seq: u64,
    ) -> Self {
        Self {
            nodes: Arc::new(nodes),
            current_leaf_id,
            selected_root_id: None,
            next_seq,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.nodes.get(id).map(Arc::as_ref)
    }

    #[must_use]
    pub fn current_leaf_id(&self) -> Option<&MessageId> {
        self.current_leaf_id.as_ref()
    }

    #[must_use]
    pub fn selected_root_id(&self) -> Option<&MessageId> {
        self.selected_root_id.as_ref()
    }

    /// Returns every stored message in creation order.
    #[must_use]
    pub fn messages(&self) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self.nodes.values().map(Arc::as_ref).collect();
        messages.sort_by_key(|message| message.seq);
        messages
    }

    /// Returns root messages in creation order.
    #[must_use]
    pub fn roots(&self) -> Vec<&Message> {
        self.messages()
            .into_iter()
            .filter(|message| message.is_root())
            .collect()
    }

    /// Rebuilds the root-first ancestry path ending at `leaf_id`.
    ///
    /// Unknown or absent leaves yield an empty chain. A dangling parent link
    /// ends the walk silently.
    #[must_use]
    pub fn reconstruct_chain(&self, leaf_id: Option<&str>) -> Vec<Arc<Message>> {
        let mut chain = Vec::new();
        let mut cursor = leaf_id.and_then(|id| self.nodes.get(id));

        while let Some(node) = cursor {
            if chain.len() >= self.nodes.len() {
                tracing::error!(leaf_id = ?leaf_id, "parent chain exceeds tree size; stopping walk");
                break;
            }

            chain.push(Arc::clone(node));
            cursor = node
                .parent_id
                .as_ref()
                .and_then(|parent_id| self.nodes.get(parent_id));
        }

        chain.reverse();
        chain
    }

    /// Chain ending at the current leaf.
    #[must_use]
    pub fn visible_chain(&self) -> Vec<Arc<Message>> {
        self.reconstruct_chain(self.current_leaf_id.as_ref().map(MessageId::as_str))
    }

    /// Stores `message` under `parent_id` (or as a new root) and makes it the
    /// parent's selected child (or the selected root). The current leaf is
    /// left untouched.
    pub fn append(
        &mut self,
        message: NewMessage,
        parent_id: Option<&str>,
    ) -> Result<MessageId, TreeError> {
        if let Some(parent_id) = parent_id {
            if !self.contains(parent_id) {
                return Err(TreeError::UnknownParent {
                    parent_id: parent_id.to_string(),
                });
            }
        }

        let id = unique_id(&self.nodes);
        let node = Message {
            id: id.clone(),
            role: message.role,
            content: message.content,
            parent_id: parent_id.map(MessageId::from),
            children_ids: Vec::new(),
            selected_child_id: None,
            seq: self.take_seq(),
            created_at: now_rfc3339(),
        };

        let nodes = Arc::make_mut(&mut self.nodes);
        nodes.insert(id.clone(), Arc::new(node));
        if let Some(parent) = parent_id.and_then(|parent_id| nodes.get_mut(parent_id)) {
            let parent = Arc::make_mut(parent);
            parent.children_ids.push(id.clone());
            parent.selected_child_id = Some(id.clone());
        } else {
            self.selected_root_id = Some(id.clone());
        }

        debug_assert!(self.check_structure().is_ok());
        tracing::debug!(id = %id, parent_id = ?parent_id, "appended message");
        Ok(id)
    }

    /// Points the visible chain at `id` and re-syncs every selection pointer
    /// on its ancestry path.
    pub fn set_current_leaf(&mut self, id: &str) -> Result<(), TreeError> {
        if !self.contains(id) {
            return Err(TreeError::unknown(id));
        }

        let chain = self.reconstruct_chain(Some(id));
        let path: Vec<(MessageId, MessageId)> = chain
            .windows(2)
            .map(|pair| (pair[0].id.clone(), pair[1].id.clone()))
            .collect();
        self.selected_root_id = chain.first().map(|root| root.id.clone());

        for (parent_id, child_id) in path {
            let in_sync = self
                .get(parent_id.as_str())
                .is_some_and(|parent| parent.selected_child_id.as_ref() == Some(&child_id));
            if in_sync {
                continue;
            }

            let nodes = Arc::make_mut(&mut self.nodes);
            if let Some(parent) = nodes.get_mut(parent_id.as_str()) {
                Arc::make_mut(parent).selected_child_id = Some(child_id);
            }
        }

        self.current_leaf_id = Some(MessageId::from(id));
        debug_assert!(self.check_invariants().is_ok());
        Ok(())
    }

    pub fn clear_current_leaf(&mut self) {
        self.current_leaf_id = None;
    }

    /// Deepest descendant of `id` reached by following selected children.
    pub fn resume_leaf(&self, id: &str) -> Result<MessageId, TreeError> {
        let mut cursor = self.get(id).ok_or_else(|| TreeError::unknown(id))?;

        for _ in 0..self.nodes.len() {
            let next = cursor
                .selected_child_id
                .as_ref()
                .and_then(|child_id| self.get(child_id.as_str()));
            match next {
                Some(child) => cursor = child,
                None => break,
            }
        }

        Ok(cursor.id.clone())
    }

    /// Moves the parent's selection (the root selection for roots) to the
    /// neighbouring sibling of `id`.
    ///
    /// Returns the newly selected sibling, or `id` itself when the move would
    /// leave the sibling range (no state change in that case).
    pub fn select_branch(
        &mut self,
        id: &str,
        direction: Direction,
    ) -> Result<MessageId, TreeError> {
        let node = self.get(id).ok_or_else(|| TreeError::unknown(id))?;
        let unchanged = node.id.clone();
        let parent_id = node.parent_id.clone();

        let siblings = self.sibling_ids(node);
        let Some(index) = siblings.iter().position(|sibling| sibling == id) else {
            return Ok(unchanged);
        };

        let target = match direction {
            Direction::Previous => index.checked_sub(1),
            Direction::Next => Some(index + 1).filter(|next| *next < siblings.len()),
        };
        let Some(target) = target else {
            return Ok(unchanged);
        };

        let sibling = siblings[target].clone();
        match parent_id {
            Some(parent_id) => {
                let nodes = Arc::make_mut(&mut self.nodes);
                if let Some(parent) = nodes.get_mut(parent_id.as_str()) {
                    Arc::make_mut(parent).selected_child_id = Some(sibling.clone());
                }
            }
            None => self.selected_root_id = Some(sibling.clone()),
        }

        tracing::debug!(from = %id, to = %sibling, ?direction, "selected sibling branch");
        Ok(sibling)
    }

    /// Selects the neighbouring sibling and resumes the visible chain at the
    /// deepest previously selected descendant of that sibling.
    pub fn switch_branch(
        &mut self,
        id: &str,
        direction: Direction,
    ) -> Result<MessageId, TreeError> {
        let sibling = self.select_branch(id, direction)?;
        if sibling == id {
            return Ok(sibling);
        }

        let leaf = self.resume_leaf(sibling.as_str())?;
        self.set_current_leaf(leaf.as_str())?;
        Ok(sibling)
    }

    /// Creates an edited copy of user message `id` as a new sibling and moves
    /// the visible chain onto it. The original subtree stays reachable.
    pub fn edit_message(
        &mut self,
        id: &str,
        new_content: impl Into<String>,
    ) -> Result<MessageId, TreeError> {
        let node = self.get(id).ok_or_else(|| TreeError::unknown(id))?;
        if node.role != Role::User {
            return Err(TreeError::NotUserMessage {
                id: id.to_string(),
                role: node.role,
            });
        }

        let parent_id = node.parent_id.clone();
        let edited = self.append(
            NewMessage::user(new_content),
            parent_id.as_ref().map(MessageId::as_str),
        )?;
        self.set_current_leaf(edited.as_str())?;
        Ok(edited)
    }

    /// Parent of assistant reply `id`, under which a regenerated reply is stored.
    pub fn regeneration_parent(&self, id: &str) -> Result<MessageId, TreeError> {
        let node = self.get(id).ok_or_else(|| TreeError::unknown(id))?;
        if node.role != Role::Assistant {
            return Err(TreeError::NotAssistantMessage {
                id: id.to_string(),
                role: node.role,
            });
        }

        node.parent_id
            .clone()
            .filter(|parent_id| self.contains(parent_id.as_str()))
            .ok_or_else(|| TreeError::MissingParent { id: id.to_string() })
    }

    /// Position of `id` among its siblings, only for branch points.
    #[must_use]
    pub fn sibling_position(&self, id: &str) -> Option<SiblingPosition> {
        let siblings = self.sibling_ids(self.get(id)?);
        if siblings.len() <= 1 {
            return None;
        }

        let index = siblings.iter().position(|sibling| sibling == id)?;
        Some(SiblingPosition {
            index,
            total: siblings.len(),
        })
    }

    /// Children of the node's parent, or every root for a root. Empty when
    /// the parent link dangles.
    fn sibling_ids(&self, node: &Message) -> Vec<MessageId> {
        match &node.parent_id {
            Some(parent_id) => self
                .get(parent_id.as_str())
                .map(|parent| parent.children_ids.clone())
                .unwrap_or_default(),
            None => self.roots().into_iter().map(|root| root.id.clone()).collect(),
        }
    }

    /// Replaces the whole tree with a linear chain built from `records`.
    ///
    /// Each record becomes the child of the previous one; the last record
    /// becomes the current leaf. Blank or repeated ids are replaced with
    /// generated ones.
    pub fn load_batch(&mut self, records: impl IntoIterator<Item = FlatRecord>) {
        let mut nodes = NodeMap::new();
        let mut previous: Option<MessageId> = None;
        let mut first: Option<MessageId> = None;
        let mut seq = 0u64;

        for record in records {
            let id = if record.id.trim().is_empty() || nodes.contains_key(record.id.as_str()) {
                let generated = unique_id(&nodes);
                tracing::warn!(original = %record.id, replacement = %generated, "replaced unusable record id");
                generated
            } else {
                MessageId::from(record.id)
            };

            seq += 1;
            nodes.insert(
                id.clone(),
                Arc::new(Message {
                    id: id.clone(),
                    role: record.role,
                    content: record.content,
                    parent_id: previous.clone(),
                    children_ids: Vec::new(),
                    selected_child_id: None,
                    seq,
                    created_at: now_rfc3339(),
                }),
            );

            if let Some(parent) = previous
                .as_ref()
                .and_then(|parent_id| nodes.get_mut(parent_id.as_str()))
            {
                let parent = Arc::make_mut(parent);
                parent.children_ids.push(id.clone());
                parent.selected_child_id = Some(id.clone());
            }

            if first.is_none() {
                first = Some(id.clone());
            }
            previous = Some(id);
        }

        self.nodes = Arc::new(nodes);
        self.selected_root_id = first;
        self.current_leaf_id = previous;
        self.next_seq = seq;
        debug_assert!(self.check_invariants().is_ok());
        tracing::info!(messages = self.nodes.len(), "loaded message batch");
    }

    /// Validates parent/child links, selections, the leaf pointer, acyclicity,
    /// and that selections along the leaf's ancestry match the path taken.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        self.check_structure()?;

        let chain = self.visible_chain();
        for pair in chain.windows(2) {
            if pair[0].selected_child_id.as_ref() != Some(&pair[1].id) {
                return Err(TreeError::InvariantViolation(format!(
                    "selection on '{}' does not follow the current leaf path through '{}'",
                    pair[0].id, pair[1].id
                )));
            }
        }

        Ok(())
    }

    fn check_structure(&self) -> Result<(), TreeError> {
        for node in self.nodes.values() {
            if let Some(parent_id) = &node.parent_id {
                let parent = self.get(parent_id.as_str()).ok_or_else(|| {
                    TreeError::InvariantViolation(format!(
                        "'{}' points at missing parent '{parent_id}'",
                        node.id
                    ))
                })?;
                if !parent.children_ids.contains(&node.id) {
                    return Err(TreeError::InvariantViolation(format!(
                        "parent '{parent_id}' does not list child '{}'",
                        node.id
                    )));
                }
            }

            let mut seen = HashSet::new();
            for child_id in &node.children_ids {
                if !seen.insert(child_id) {
                    return Err(TreeError::InvariantViolation(format!(
                        "'{}' lists child '{child_id}' twice",
                        node.id
                    )));
                }
                let linked = self
                    .get(child_id.as_str())
                    .is_some_and(|child| child.parent_id.as_ref() == Some(&node.id));
                if !linked {
                    return Err(TreeError::InvariantViolation(format!(
                        "child '{child_id}' of '{}' does not link back",
                        node.id
                    )));
                }
            }

            if let Some(selected) = &node.selected_child_id {
                if !node.children_ids.contains(selected) {
                    return Err(TreeError::InvariantViolation(format!(
                        "'{}' selects non-child '{selected}'",
                        node.id
                    )));
                }
            }

            let mut steps = 0usize;
            let mut cursor = node.parent_id.as_ref();
            while let Some(ancestor_id) = cursor {
                steps += 1;
                if steps > self.nodes.len() || ancestor_id == &node.id {
                    return Err(TreeError::InvariantViolation(format!(
                        "'{}' is its own ancestor",
                        node.id
                    )));
                }
                cursor = self
                    .get(ancestor_id.as_str())
                    .and_then(|ancestor| ancestor.parent_id.as_ref());
            }
        }

        if let Some(leaf_id) = &self.current_leaf_id {
            if !self.contains(leaf_id.as_str()) {
                return Err(TreeError::InvariantViolation(format!(
                    "current leaf '{leaf_id}' is not stored"
                )));
            }
        }

        if let Some(root_id) = &self.selected_root_id {
            if !self.get(root_id.as_str()).is_some_and(Message::is_root) {
                return Err(TreeError::InvariantViolation(format!(
                    "selected root '{root_id}' is not a stored root"
                )));
            }
        }

        Ok(())
    }

    fn take_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

fn unique_id(nodes: &NodeMap) -> MessageId {
    loop {
        let candidate = MessageId::generate();
        if !nodes.contains_key(candidate.as_str()) {
            return candidate;
        }
    }
}
