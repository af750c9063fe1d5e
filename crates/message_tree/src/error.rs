use std::path::PathBuf;

use thiserror::Error;

use crate::message::Role;

/// Contract violations raised by tree mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("unknown message id '{id}'")]
    UnknownMessage { id: String },

    #[error("cannot append under unknown parent id '{parent_id}'")]
    UnknownParent { parent_id: String },

    #[error("message '{id}' has role {role}; only user messages can be edited")]
    NotUserMessage { id: String, role: Role },

    #[error("message '{id}' has role {role}; only assistant replies can be regenerated")]
    NotAssistantMessage { id: String, role: Role },

    #[error("message '{id}' has no parent")]
    MissingParent { id: String },

    #[error("tree invariant violated: {0}")]
    InvariantViolation(String),
}

impl TreeError {
    #[must_use]
    pub(crate) fn unknown(id: impl Into<String>) -> Self {
        Self::UnknownMessage { id: id.into() }
    }
}

/// Failures while saving or loading a JSONL tree snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while reading line {line} in {path}: {source}")]
    IoLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON at {path}:{line}: {source}")]
    JsonLineParse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize snapshot line for {path}: {source}")]
    JsonSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing snapshot header line in {path}")]
    MissingHeader { path: PathBuf },

    #[error("line {line} in {path} must be a tree header record")]
    InvalidHeaderRecord { path: PathBuf, line: usize },

    #[error("line {line} in {path} must be a message record")]
    InvalidMessageRecord { path: PathBuf, line: usize },

    #[error("line {line} in {path} has unsupported snapshot version {found}; expected 1")]
    UnsupportedVersion {
        path: PathBuf,
        line: usize,
        found: u32,
    },

    #[error("line {line} in {path} has invalid RFC3339 timestamp in field '{field}': {value}")]
    InvalidTimestamp {
        path: PathBuf,
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("line {line} in {path} contains a duplicate message id '{id}'")]
    DuplicateMessageId {
        path: PathBuf,
        line: usize,
        id: String,
    },

    #[error(
        "line {line} in {path} references parent id '{parent_id}' for message '{message_id}' that does not precede it"
    )]
    DanglingParentId {
        path: PathBuf,
        line: usize,
        message_id: String,
        parent_id: String,
    },

    #[error(
        "line {line} in {path} selects '{selected_child_id}' which is not a child of '{message_id}'"
    )]
    InvalidSelection {
        path: PathBuf,
        line: usize,
        message_id: String,
        selected_child_id: String,
    },

    #[error("snapshot {path} points at unknown leaf id '{leaf_id}'")]
    UnknownLeafId { path: PathBuf, leaf_id: String },

    #[error("snapshot {path} does not form a consistent tree: {source}")]
    InconsistentTree {
        path: PathBuf,
        #[source]
        source: TreeError,
    },
}

impl SnapshotError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn io_line(path: impl Into<PathBuf>, line: usize, source: std::io::Error) -> Self {
        Self::IoLine {
            path: path.into(),
            line,
            source,
        }
    }

    #[must_use]
    pub fn json_line(path: impl Into<PathBuf>, line: usize, source: serde_json::Error) -> Self {
        Self::JsonLineParse {
            path: path.into(),
            line,
            source,
        }
    }

    #[must_use]
    pub fn json_serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::JsonSerialize {
            path: path.into(),
            source,
        }
    }
}
