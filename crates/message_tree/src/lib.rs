//! Branching message tree for chat conversations.
//!
//! Every message may have several alternative children (edits and
//! regenerations). The visible transcript is the ancestry path of the
//! current leaf, rebuilt on demand with [`MessageTree::reconstruct_chain`].
//!
//! Node storage is copy-on-write: cloning a [`MessageTree`] yields a frozen
//! snapshot that later mutations never alias.

mod error;
mod message;
mod snapshot;
mod tree;

pub use error::{SnapshotError, TreeError};
pub use message::{FlatRecord, Message, MessageId, NewMessage, Role};
pub use snapshot::{SnapshotHeader, SnapshotMessage, SNAPSHOT_VERSION};
pub use tree::{Direction, MessageTree, SiblingPosition};
