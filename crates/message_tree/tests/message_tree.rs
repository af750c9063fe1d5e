use message_tree::{
    Direction, FlatRecord, MessageId, MessageTree, NewMessage, Role, SiblingPosition, TreeError,
};
use pretty_assertions::assert_eq;

fn send(tree: &mut MessageTree, message: NewMessage) -> MessageId {
    let parent = tree.current_leaf_id().cloned();
    let id = tree
        .append(message, parent.as_ref().map(MessageId::as_str))
        .expect("append under current leaf should succeed");
    tree.set_current_leaf(id.as_str())
        .expect("freshly appended id should be a valid leaf");
    id
}

fn chain_contents(tree: &MessageTree) -> Vec<(Role, String)> {
    tree.visible_chain()
        .iter()
        .map(|message| (message.role, message.content.clone()))
        .collect()
}

fn chain_ids(tree: &MessageTree) -> Vec<MessageId> {
    tree.visible_chain()
        .iter()
        .map(|message| message.id.clone())
        .collect()
}

#[test]
fn reconstruct_chain_returns_root_first_ancestry() {
    let mut tree = MessageTree::new();
    let first = send(&mut tree, NewMessage::user("Hello"));
    let second = send(&mut tree, NewMessage::assistant("Hi there"));
    let third = send(&mut tree, NewMessage::user("How are you?"));

    assert_eq!(chain_ids(&tree), vec![first.clone(), second.clone(), third.clone()]);
    assert_eq!(
        tree.reconstruct_chain(Some(second.as_str()))
            .iter()
            .map(|message| message.id.clone())
            .collect::<Vec<_>>(),
        vec![first, second]
    );
    tree.check_invariants().expect("invariants should hold");
}

#[test]
fn reconstruct_chain_is_empty_for_absent_or_unknown_leaf() {
    let mut tree = MessageTree::new();
    send(&mut tree, NewMessage::user("Hello"));

    assert!(tree.reconstruct_chain(None).is_empty());
    assert!(tree.reconstruct_chain(Some("missing")).is_empty());
    assert!(MessageTree::new().visible_chain().is_empty());
}

#[test]
fn append_selects_new_child_without_moving_leaf() {
    let mut tree = MessageTree::new();
    let root = send(&mut tree, NewMessage::user("Hello"));
    let reply = send(&mut tree, NewMessage::assistant("first"));

    let alternative = tree
        .append(NewMessage::assistant("second"), Some(root.as_str()))
        .expect("append should succeed");

    let parent = tree.get(root.as_str()).expect("root should be stored");
    assert_eq!(parent.children_ids, vec![reply.clone(), alternative.clone()]);
    assert_eq!(parent.selected_child_id.as_ref(), Some(&alternative));
    assert_eq!(tree.current_leaf_id(), Some(&reply));

    tree.set_current_leaf(alternative.as_str())
        .expect("alternative should be a valid leaf");
    tree.check_invariants().expect("invariants should hold after repoint");
}

#[test]
fn append_without_parent_creates_new_root() {
    let mut tree = MessageTree::new();
    let first = tree
        .append(NewMessage::system("be brief"), None)
        .expect("root append should succeed");
    let second = tree
        .append(NewMessage::user("hello"), None)
        .expect("second root append should succeed");

    let roots: Vec<MessageId> = tree.roots().iter().map(|root| root.id.clone()).collect();
    assert_eq!(roots, vec![first, second]);
    assert!(tree.current_leaf_id().is_none());
}

#[test]
fn append_rejects_unknown_parent() {
    let mut tree = MessageTree::new();
    let error = tree
        .append(NewMessage::user("orphan"), Some("nope"))
        .expect_err("unknown parent must be rejected");

    assert_eq!(
        error,
        TreeError::UnknownParent {
            parent_id: "nope".to_string()
        }
    );
    assert!(tree.is_empty());
}

#[test]
fn generated_ids_are_unique_across_many_appends() {
    let mut tree = MessageTree::new();
    for index in 0..200 {
        send(&mut tree, NewMessage::user(format!("message {index}")));
    }

    let ids: std::collections::HashSet<MessageId> = tree
        .messages()
        .iter()
        .map(|message| message.id.clone())
        .collect();
    assert_eq!(ids.len(), 200);
    assert_eq!(tree.visible_chain().len(), 200);
}

#[test]
fn edit_creates_sibling_and_keeps_original_subtree() {
    let mut tree = MessageTree::new();
    let question = send(&mut tree, NewMessage::user("What is Rust?"));
    let answer = send(&mut tree, NewMessage::assistant("A language."));
    let follow_up = send(&mut tree, NewMessage::user("Tell me more"));

    let edited = tree
        .edit_message(question.as_str(), "What is Rust, briefly?")
        .expect("editing a user message should succeed");

    assert_eq!(tree.current_leaf_id(), Some(&edited));
    assert_eq!(
        chain_contents(&tree),
        vec![(Role::User, "What is Rust, briefly?".to_string())]
    );
    for id in [&question, &answer, &follow_up] {
        assert!(tree.contains(id.as_str()), "original subtree should remain stored");
        assert!(!chain_ids(&tree).contains(id));
    }

    let back = tree
        .switch_branch(edited.as_str(), Direction::Previous)
        .expect("navigating back should succeed");
    assert_eq!(back, question);
    assert_eq!(chain_ids(&tree), vec![question, answer, follow_up]);
    tree.check_invariants().expect("invariants should hold");
}

#[test]
fn edit_of_reply_under_a_user_message_keeps_parent() {
    let mut tree = MessageTree::new();
    send(&mut tree, NewMessage::user("first"));
    send(&mut tree, NewMessage::assistant("reply"));
    let second = send(&mut tree, NewMessage::user("second"));

    let edited = tree
        .edit_message(second.as_str(), "second, revised")
        .expect("edit should succeed");

    let original = tree.get(second.as_str()).expect("original should remain");
    let revised = tree.get(edited.as_str()).expect("edit should be stored");
    assert_eq!(original.parent_id, revised.parent_id);
    assert_eq!(tree.sibling_position(edited.as_str()), Some(SiblingPosition { index: 1, total: 2 }));
}

#[test]
fn edit_rejects_non_user_messages() {
    let mut tree = MessageTree::new();
    send(&mut tree, NewMessage::user("hi"));
    let reply = send(&mut tree, NewMessage::assistant("hello"));

    let error = tree
        .edit_message(reply.as_str(), "changed")
        .expect_err("assistant messages cannot be edited");
    assert!(matches!(error, TreeError::NotUserMessage { role: Role::Assistant, .. }));
    assert_eq!(tree.len(), 2);
}

#[test]
fn select_branch_is_a_noop_at_bounds() {
    let mut tree = MessageTree::new();
    let root = send(&mut tree, NewMessage::user("q"));
    let first = send(&mut tree, NewMessage::assistant("a1"));
    let second = tree
        .append(NewMessage::assistant("a2"), Some(root.as_str()))
        .expect("append should succeed");
    tree.set_current_leaf(second.as_str())
        .expect("leaf should exist");

    let before = tree.clone();
    let unchanged = tree
        .select_branch(first.as_str(), Direction::Previous)
        .expect("select should not fail at lower bound");
    assert_eq!(unchanged, first);
    let unchanged = tree
        .select_branch(second.as_str(), Direction::Next)
        .expect("select should not fail at upper bound");
    assert_eq!(unchanged, second);

    assert_eq!(tree.current_leaf_id(), before.current_leaf_id());
    assert_eq!(
        tree.get(root.as_str()).map(|node| node.selected_child_id.clone()),
        before.get(root.as_str()).map(|node| node.selected_child_id.clone())
    );
}

#[test]
fn select_branch_on_root_without_parent_is_noop() {
    let mut tree = MessageTree::new();
    let root = send(&mut tree, NewMessage::user("q"));

    let result = tree
        .select_branch(root.as_str(), Direction::Next)
        .expect("roots have no siblings");
    assert_eq!(result, root);
}

#[test]
fn roots_are_siblings_of_each_other() {
    let mut tree = MessageTree::new();
    let first = send(&mut tree, NewMessage::user("first draft"));
    let reply = send(&mut tree, NewMessage::assistant("reply"));
    let second = tree
        .edit_message(first.as_str(), "second draft")
        .expect("editing the first message should succeed");

    assert_eq!(tree.selected_root_id(), Some(&second));
    assert_eq!(
        tree.sibling_position(first.as_str()),
        Some(SiblingPosition { index: 0, total: 2 })
    );
    assert_eq!(
        tree.sibling_position(second.as_str()),
        Some(SiblingPosition { index: 1, total: 2 })
    );

    let selected = tree
        .select_branch(second.as_str(), Direction::Previous)
        .expect("roots should be navigable");
    assert_eq!(selected, first);
    assert_eq!(tree.selected_root_id(), Some(&first));
    assert_eq!(tree.current_leaf_id(), Some(&second));

    let unchanged = tree
        .select_branch(first.as_str(), Direction::Previous)
        .expect("lower bound is a no-op");
    assert_eq!(unchanged, first);

    let resumed = tree
        .switch_branch(second.as_str(), Direction::Previous)
        .expect("switching roots should succeed");
    assert_eq!(resumed, first);
    assert_eq!(chain_ids(&tree), vec![first, reply]);
    tree.check_invariants().expect("invariants should hold");
}

#[test]
fn select_branch_rejects_unknown_message() {
    let mut tree = MessageTree::new();
    let error = tree
        .select_branch("ghost", Direction::Next)
        .expect_err("unknown id must be reported");
    assert_eq!(
        error,
        TreeError::UnknownMessage {
            id: "ghost".to_string()
        }
    );
}

#[test]
fn switch_branch_resumes_at_last_viewed_depth() {
    let mut tree = MessageTree::new();
    let question = send(&mut tree, NewMessage::user("q"));
    let first_reply = send(&mut tree, NewMessage::assistant("a1"));
    let deep_follow_up = send(&mut tree, NewMessage::user("deeper"));

    let regenerated = tree
        .append(NewMessage::assistant("a2"), Some(question.as_str()))
        .expect("append should succeed");
    tree.set_current_leaf(regenerated.as_str())
        .expect("leaf should exist");

    let sibling = tree
        .switch_branch(regenerated.as_str(), Direction::Previous)
        .expect("switch should succeed");

    assert_eq!(sibling, first_reply);
    assert_eq!(tree.current_leaf_id(), Some(&deep_follow_up));
    assert_eq!(chain_ids(&tree), vec![question.clone(), first_reply.clone(), deep_follow_up]);

    let sibling = tree
        .switch_branch(first_reply.as_str(), Direction::Next)
        .expect("switch back should succeed");
    assert_eq!(sibling, regenerated);
    assert_eq!(tree.current_leaf_id(), Some(&regenerated));
    tree.check_invariants().expect("invariants should hold");
}

#[test]
fn sibling_position_only_reported_for_branch_points() {
    let mut tree = MessageTree::new();
    let question = send(&mut tree, NewMessage::user("q"));
    let first = send(&mut tree, NewMessage::assistant("a1"));

    assert_eq!(tree.sibling_position(first.as_str()), None);
    assert_eq!(tree.sibling_position(question.as_str()), None);

    let second = tree
        .append(NewMessage::assistant("a2"), Some(question.as_str()))
        .expect("append should succeed");
    assert_eq!(
        tree.sibling_position(first.as_str()),
        Some(SiblingPosition { index: 0, total: 2 })
    );
    assert_eq!(
        tree.sibling_position(second.as_str()),
        Some(SiblingPosition { index: 1, total: 2 })
    );
}

#[test]
fn regeneration_parent_requires_assistant_with_parent() {
    let mut tree = MessageTree::new();
    let question = send(&mut tree, NewMessage::user("q"));
    let reply = send(&mut tree, NewMessage::assistant("a"));
    let orphan_reply = tree
        .append(NewMessage::assistant("greeting"), None)
        .expect("root append should succeed");

    assert_eq!(tree.regeneration_parent(reply.as_str()), Ok(question.clone()));
    assert!(matches!(
        tree.regeneration_parent(question.as_str()),
        Err(TreeError::NotAssistantMessage { .. })
    ));
    assert!(matches!(
        tree.regeneration_parent(orphan_reply.as_str()),
        Err(TreeError::MissingParent { .. })
    ));
}

#[test]
fn load_batch_links_records_linearly() {
    let mut tree = MessageTree::new();
    send(&mut tree, NewMessage::user("discarded"));

    tree.load_batch(vec![
        FlatRecord::new("a", Role::User, "one"),
        FlatRecord::new("b", Role::Assistant, "two"),
        FlatRecord::new("c", Role::User, "three"),
    ]);

    assert_eq!(tree.len(), 3);
    assert_eq!(tree.get("a").and_then(|node| node.parent_id.clone()), None);
    assert_eq!(
        tree.get("b").and_then(|node| node.parent_id.clone()),
        Some(MessageId::from("a"))
    );
    assert_eq!(
        tree.get("c").and_then(|node| node.parent_id.clone()),
        Some(MessageId::from("b"))
    );
    assert_eq!(
        tree.get("a").map(|node| node.children_ids.clone()),
        Some(vec![MessageId::from("b")])
    );
    assert_eq!(tree.current_leaf_id(), Some(&MessageId::from("c")));
    tree.check_invariants().expect("invariants should hold");
}

#[test]
fn load_batch_with_no_records_clears_the_tree() {
    let mut tree = MessageTree::new();
    send(&mut tree, NewMessage::user("discarded"));

    tree.load_batch(Vec::new());

    assert!(tree.is_empty());
    assert!(tree.current_leaf_id().is_none());
}

#[test]
fn load_batch_replaces_duplicate_and_blank_ids() {
    let mut tree = MessageTree::new();
    tree.load_batch(vec![
        FlatRecord::new("same", Role::User, "one"),
        FlatRecord::new("same", Role::Assistant, "two"),
        FlatRecord::new("  ", Role::User, "three"),
    ]);

    assert_eq!(tree.len(), 3);
    assert_eq!(
        chain_contents(&tree),
        vec![
            (Role::User, "one".to_string()),
            (Role::Assistant, "two".to_string()),
            (Role::User, "three".to_string()),
        ]
    );
    tree.check_invariants().expect("invariants should hold");
}
