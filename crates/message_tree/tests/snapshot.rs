use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use message_tree::{Direction, MessageId, MessageTree, NewMessage, Role, SnapshotError};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

fn write_snapshot_file(lines: &[String]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("tree.jsonl");
    let mut file = File::create(&path).expect("snapshot file should be created");

    for line in lines {
        writeln!(file, "{line}").expect("line should be written");
    }

    (dir, path)
}

fn header_line(current_leaf_id: Option<&str>) -> String {
    json!({
        "type": "tree",
        "version": 1,
        "created_at": "2026-02-14T00:00:00Z",
        "current_leaf_id": current_leaf_id,
    })
    .to_string()
}

fn message_line(id: &str, parent_id: Option<&str>, role: &str, content: &str) -> String {
    json!({
        "type": "message",
        "id": id,
        "parent_id": parent_id,
        "role": role,
        "content": content,
        "selected_child_id": null,
        "created_at": "2026-02-14T00:00:01Z",
    })
    .to_string()
}

fn branched_tree() -> MessageTree {
    let mut tree = MessageTree::new();
    let question = tree
        .append(NewMessage::user("q"), None)
        .expect("root append should succeed");
    let first = tree
        .append(NewMessage::assistant("a1"), Some(question.as_str()))
        .expect("append should succeed");
    tree.append(NewMessage::assistant("a2"), Some(question.as_str()))
        .expect("append should succeed");
    tree.set_current_leaf(first.as_str())
        .expect("leaf should exist");
    tree
}

#[test]
fn save_then_load_preserves_branches_and_leaf() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("tree.jsonl");
    let tree = branched_tree();

    tree.save_snapshot(&path).expect("save should succeed");
    let mut loaded = MessageTree::load_snapshot(&path).expect("load should succeed");

    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.current_leaf_id(), tree.current_leaf_id());
    let contents: Vec<String> = loaded
        .visible_chain()
        .iter()
        .map(|message| message.content.clone())
        .collect();
    assert_eq!(contents, vec!["q".to_string(), "a1".to_string()]);

    let leaf = loaded.current_leaf_id().cloned().expect("leaf should be set");
    loaded
        .switch_branch(leaf.as_str(), Direction::Next)
        .expect("branch navigation should work after load");
    assert_eq!(
        loaded.visible_chain().last().map(|message| message.content.clone()),
        Some("a2".to_string())
    );
}

#[test]
fn save_leaves_no_staging_file_behind() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("tree.jsonl");

    branched_tree().save_snapshot(&path).expect("save should succeed");

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .expect("dir should be readable")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["tree.jsonl".to_string()]);
}

#[test]
fn load_rebuilds_children_from_parent_links() {
    let (_dir, path) = write_snapshot_file(&[
        header_line(Some("b")),
        message_line("a", None, "user", "hello"),
        message_line("b", Some("a"), "assistant", "hi"),
    ]);

    let tree = MessageTree::load_snapshot(&path).expect("load should succeed");

    assert_eq!(
        tree.get("a").map(|node| node.children_ids.clone()),
        Some(vec![MessageId::from("b")])
    );
    assert_eq!(
        tree.get("a").and_then(|node| node.selected_child_id.clone()),
        Some(MessageId::from("b"))
    );
    assert_eq!(tree.get("b").map(|node| node.role), Some(Role::Assistant));
}

#[test]
fn load_rejects_missing_header() {
    let (_dir, path) = write_snapshot_file(&[]);

    let error = MessageTree::load_snapshot(&path).expect_err("empty file must fail");
    assert!(matches!(error, SnapshotError::MissingHeader { .. }));
}

#[test]
fn load_rejects_message_as_first_line() {
    let (_dir, path) = write_snapshot_file(&[message_line("a", None, "user", "hello")]);

    let error = MessageTree::load_snapshot(&path).expect_err("message first must fail");
    assert!(matches!(
        error,
        SnapshotError::InvalidHeaderRecord { line: 1, .. }
    ));
}

#[test]
fn load_rejects_second_header() {
    let (_dir, path) = write_snapshot_file(&[header_line(None), header_line(None)]);

    let error = MessageTree::load_snapshot(&path).expect_err("second header must fail");
    assert!(matches!(
        error,
        SnapshotError::InvalidMessageRecord { line: 2, .. }
    ));
}

#[test]
fn load_rejects_unsupported_version() {
    let (_dir, path) = write_snapshot_file(&[json!({
        "type": "tree",
        "version": 2,
        "created_at": "2026-02-14T00:00:00Z",
        "current_leaf_id": null,
    })
    .to_string()]);

    let error = MessageTree::load_snapshot(&path).expect_err("version 2 must fail");
    assert!(matches!(
        error,
        SnapshotError::UnsupportedVersion {
            line: 1,
            found: 2,
            ..
        }
    ));
}

#[test]
fn load_rejects_unknown_fields() {
    let (_dir, path) = write_snapshot_file(&[
        header_line(None),
        json!({
            "type": "message",
            "id": "a",
            "parent_id": null,
            "role": "user",
            "content": "hello",
            "selected_child_id": null,
            "created_at": "2026-02-14T00:00:01Z",
            "extra": true,
        })
        .to_string(),
    ]);

    let error = MessageTree::load_snapshot(&path).expect_err("unknown field must fail");
    assert!(matches!(
        error,
        SnapshotError::JsonLineParse { line: 2, .. }
    ));
}

#[test]
fn load_rejects_invalid_timestamp() {
    let (_dir, path) = write_snapshot_file(&[json!({
        "type": "tree",
        "version": 1,
        "created_at": "yesterday",
        "current_leaf_id": null,
    })
    .to_string()]);

    let error = MessageTree::load_snapshot(&path).expect_err("bad timestamp must fail");
    assert!(matches!(
        error,
        SnapshotError::InvalidTimestamp {
            line: 1,
            field: "created_at",
            ..
        }
    ));
}

#[test]
fn load_rejects_duplicate_ids() {
    let (_dir, path) = write_snapshot_file(&[
        header_line(None),
        message_line("a", None, "user", "hello"),
        message_line("a", Some("a"), "assistant", "again"),
    ]);

    let error = MessageTree::load_snapshot(&path).expect_err("duplicate id must fail");
    assert!(matches!(
        error,
        SnapshotError::DuplicateMessageId { line: 3, .. }
    ));
}

#[test]
fn load_rejects_parent_that_does_not_precede_child() {
    let (_dir, path) = write_snapshot_file(&[
        header_line(None),
        message_line("b", Some("a"), "assistant", "hi"),
        message_line("a", None, "user", "hello"),
    ]);

    let error = MessageTree::load_snapshot(&path).expect_err("forward parent must fail");
    assert!(matches!(
        error,
        SnapshotError::DanglingParentId { line: 2, .. }
    ));
}

#[test]
fn load_rejects_selection_outside_children() {
    let (_dir, path) = write_snapshot_file(&[
        header_line(None),
        json!({
            "type": "message",
            "id": "a",
            "parent_id": null,
            "role": "user",
            "content": "hello",
            "selected_child_id": "z",
            "created_at": "2026-02-14T00:00:01Z",
        })
        .to_string(),
    ]);

    let error = MessageTree::load_snapshot(&path).expect_err("bad selection must fail");
    assert!(matches!(
        error,
        SnapshotError::InvalidSelection { line: 2, .. }
    ));
}

#[test]
fn load_rejects_unknown_leaf() {
    let (_dir, path) = write_snapshot_file(&[
        header_line(Some("missing")),
        message_line("a", None, "user", "hello"),
    ]);

    let error = MessageTree::load_snapshot(&path).expect_err("unknown leaf must fail");
    assert!(matches!(error, SnapshotError::UnknownLeafId { .. }));
}

#[test]
fn failed_replace_removes_staging_file() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let target = dir.path().join("occupied");
    std::fs::create_dir(&target).expect("directory should be created");
    std::fs::write(target.join("keep"), "x").expect("file should be written");

    let error = branched_tree()
        .save_snapshot(&target)
        .expect_err("renaming onto a non-empty directory must fail");

    assert!(matches!(
        error,
        SnapshotError::Io {
            operation: "replacing snapshot",
            ..
        }
    ));
    assert!(!dir.path().join("occupied.tmp").exists());
    assert!(target.join("keep").exists());
}
