//! JSONL save/load hook for local persistence of a whole tree.
//!
//! Line 1 is a `tree` header; every following line is a `message` record in
//! creation order, so a parent always precedes its children.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::SnapshotError;
use crate::message::{now_rfc3339, Message, MessageId, Role};
use crate::tree::{MessageTree, NodeMap};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotHeader {
    pub version: u32,
    pub created_at: String,
    pub current_leaf_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotMessage {
    pub id: String,
    pub parent_id: Option<String>,
    pub role: Role,
    pub content: String,
    pub selected_child_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SnapshotLine {
    Tree(SnapshotHeader),
    Message(SnapshotMessage),
}

impl MessageTree {
    /// Writes the tree to `path`, replacing any previous file atomically.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), SnapshotError> {
        let mut buffer = String::new();
        let header = SnapshotLine::Tree(SnapshotHeader {
            version: SNAPSHOT_VERSION,
            created_at: now_rfc3339(),
            current_leaf_id: self.current_leaf_id().map(|id| id.as_str().to_string()),
        });
        push_line(&mut buffer, path, &header)?;

        for message in self.messages() {
            let line = SnapshotLine::Message(SnapshotMessage {
                id: message.id.as_str().to_string(),
                parent_id: message.parent_id.as_ref().map(|id| id.as_str().to_string()),
                role: message.role,
                content: message.content.clone(),
                selected_child_id: message
                    .selected_child_id
                    .as_ref()
                    .map(|id| id.as_str().to_string()),
                created_at: message.created_at.clone(),
            });
            push_line(&mut buffer, path, &line)?;
        }

        let staging = staging_path(path);
        fs::write(&staging, buffer)
            .map_err(|source| SnapshotError::io("writing snapshot", &staging, source))?;
        if let Err(source) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(SnapshotError::io("replacing snapshot", path, source));
        }

        tracing::info!(path = %path.display(), messages = self.len(), "saved tree snapshot");
        Ok(())
    }

    /// Reads and validates a snapshot written by [`MessageTree::save_snapshot`].
    pub fn load_snapshot(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::open(path)
            .map_err(|source| SnapshotError::io("opening snapshot", path, source))?;
        let reader = BufReader::new(file);

        let mut header: Option<SnapshotHeader> = None;
        let mut records: Vec<(usize, SnapshotMessage)> = Vec::new();
        let mut index_by_id: HashMap<String, usize> = HashMap::new();

        for (line_index, line_result) in reader.lines().enumerate() {
            let line_number = line_index + 1;
            let line =
                line_result.map_err(|source| SnapshotError::io_line(path, line_number, source))?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<SnapshotLine>(&line)
                .map_err(|source| SnapshotError::json_line(path, line_number, source))?;

            match (header.is_some(), parsed) {
                (false, SnapshotLine::Tree(parsed_header)) => {
                    validate_header(path, line_number, &parsed_header)?;
                    header = Some(parsed_header);
                }
                (false, SnapshotLine::Message(_)) => {
                    return Err(SnapshotError::InvalidHeaderRecord {
                        path: path.to_path_buf(),
                        line: line_number,
                    });
                }
                (true, SnapshotLine::Tree(_)) => {
                    return Err(SnapshotError::InvalidMessageRecord {
                        path: path.to_path_buf(),
                        line: line_number,
                    });
                }
                (true, SnapshotLine::Message(record)) => {
                    validate_message(path, line_number, &record, &index_by_id)?;
                    index_by_id.insert(record.id.clone(), records.len());
                    records.push((line_number, record));
                }
            }
        }

        let header = header.ok_or_else(|| SnapshotError::MissingHeader {
            path: path.to_path_buf(),
        })?;

        let nodes = build_nodes(path, &records)?;
        let next_seq = records.len() as u64;
        let mut tree = MessageTree::from_parts(nodes, None, next_seq);

        if let Some(leaf_id) = header.current_leaf_id {
            tree.set_current_leaf(&leaf_id)
                .map_err(|_| SnapshotError::UnknownLeafId {
                    path: path.to_path_buf(),
                    leaf_id,
                })?;
        }

        tree.check_invariants()
            .map_err(|source| SnapshotError::InconsistentTree {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(path = %path.display(), messages = tree.len(), "loaded tree snapshot");
        Ok(tree)
    }
}

fn build_nodes(
    path: &Path,
    records: &[(usize, SnapshotMessage)],
) -> Result<NodeMap, SnapshotError> {
    let mut children: HashMap<&str, Vec<MessageId>> = HashMap::new();
    for (_, record) in records {
        if let Some(parent_id) = &record.parent_id {
            children
                .entry(parent_id.as_str())
                .or_default()
                .push(MessageId::new(record.id.clone()));
        }
    }

    let mut nodes = NodeMap::with_capacity(records.len());
    for (seq, (line_number, record)) in records.iter().enumerate() {
        let children_ids = children.remove(record.id.as_str()).unwrap_or_default();
        let selected_child_id = record.selected_child_id.as_deref().map(MessageId::from);

        if let Some(selected) = &selected_child_id {
            if !children_ids.contains(selected) {
                return Err(SnapshotError::InvalidSelection {
                    path: path.to_path_buf(),
                    line: *line_number,
                    message_id: record.id.clone(),
                    selected_child_id: selected.as_str().to_string(),
                });
            }
        }

        let id = MessageId::new(record.id.clone());
        nodes.insert(
            id.clone(),
            Arc::new(Message {
                id,
                role: record.role,
                content: record.content.clone(),
                parent_id: record.parent_id.as_deref().map(MessageId::from),
                children_ids,
                selected_child_id,
                seq: seq as u64 + 1,
                created_at: record.created_at.clone(),
            }),
        );
    }

    Ok(nodes)
}

fn validate_header(
    path: &Path,
    line_number: usize,
    header: &SnapshotHeader,
) -> Result<(), SnapshotError> {
    if header.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: line_number,
            found: header.version,
        });
    }

    validate_rfc3339(path, line_number, "created_at", &header.created_at)
}

fn validate_message(
    path: &Path,
    line_number: usize,
    record: &SnapshotMessage,
    index_by_id: &HashMap<String, usize>,
) -> Result<(), SnapshotError> {
    validate_rfc3339(path, line_number, "created_at", &record.created_at)?;

    if index_by_id.contains_key(&record.id) {
        return Err(SnapshotError::DuplicateMessageId {
            path: path.to_path_buf(),
            line: line_number,
            id: record.id.clone(),
        });
    }

    if let Some(parent_id) = &record.parent_id {
        if !index_by_id.contains_key(parent_id) {
            return Err(SnapshotError::DanglingParentId {
                path: path.to_path_buf(),
                line: line_number,
                message_id: record.id.clone(),
                parent_id: parent_id.clone(),
            });
        }
    }

    Ok(())
}

fn validate_rfc3339(
    path: &Path,
    line_number: usize,
    field: &'static str,
    value: &str,
) -> Result<(), SnapshotError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(SnapshotError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}

fn push_line(buffer: &mut String, path: &Path, line: &SnapshotLine) -> Result<(), SnapshotError> {
    let encoded =
        serde_json::to_string(line).map_err(|source| SnapshotError::json_serialize(path, source))?;
    buffer.push_str(&encoded);
    buffer.push('\n');
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
