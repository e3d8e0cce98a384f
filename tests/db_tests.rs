//! Integration tests for the database layer.
//!
//! These tests verify the core database operations using an in-memory SQLite database.
//! Tests are organized by module and functionality.

use nested_todo::db::Database;
use nested_todo::error::{ApiError, ErrorCode};
use nested_todo::types::{NewUser, Role, TaskTree};

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn create_user(db: &Database, username: &str) -> i64 {
    db.create_user(NewUser {
        username: username.to_string(),
        email: Some(format!("{}@example.com", username)),
        password_hash: "hash".to_string(),
        role: Role::User,
    })
    .expect("Failed to create user")
    .id
}

/// A user with one list, returning `(user_id, list_id)`.
fn setup_list(db: &Database) -> (i64, i64) {
    let user_id = create_user(db, "alice");
    let list = db.create_list(user_id, "Groceries").expect("Failed to create list");
    (user_id, list.id)
}

fn error_code(err: anyhow::Error) -> ErrorCode {
    err.downcast_ref::<ApiError>()
        .map(|e| e.code)
        .unwrap_or(ErrorCode::InternalError)
}

fn titles(trees: &[TaskTree]) -> Vec<&str> {
    trees.iter().map(|t| t.task.title.as_str()).collect()
}

mod user_tests {
    use super::*;

    #[test]
    fn create_user_sets_defaults() {
        let db = setup_db();
        let id = create_user(&db, "bob");

        let user = db.get_user(id).unwrap().expect("user exists");
        assert_eq!(user.username, "bob");
        assert_eq!(user.name.as_deref(), Some("bob"));
        assert_eq!(user.login_method.as_deref(), Some("custom"));
        assert_eq!(user.role, Role::User);
        assert!(user.created_at > 0);
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = setup_db();
        create_user(&db, "bob");

        let err = db
            .create_user(NewUser {
                username: "bob".to_string(),
                email: None,
                password_hash: "other".to_string(),
                role: Role::Admin,
            })
            .unwrap_err();
        assert_eq!(error_code(err), ErrorCode::AlreadyExists);
    }

    #[test]
    fn lookup_by_username() {
        let db = setup_db();
        let id = create_user(&db, "carol");

        assert_eq!(db.get_user_by_username("carol").unwrap().map(|u| u.id), Some(id));
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn touch_unknown_user_fails() {
        let db = setup_db();
        let err = db.touch_last_signed_in(999).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::UserNotFound);
    }
}

mod list_tests {
    use super::*;

    #[test]
    fn lists_are_scoped_to_their_owner() {
        let db = setup_db();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        db.create_list(alice, "Work").unwrap();
        db.create_list(alice, "Home").unwrap();
        db.create_list(bob, "Bob's").unwrap();

        let names: Vec<String> = db
            .get_user_lists(alice)
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["Work", "Home"]);
        assert_eq!(db.get_user_lists(bob).unwrap().len(), 1);
    }

    #[test]
    fn delete_list_removes_its_tasks() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        let other = db.create_list(user_id, "Other").unwrap();

        let parent = db.create_task(list_id, user_id, "parent", None).unwrap();
        db.create_task(list_id, user_id, "child", Some(parent.id))
            .unwrap();
        let kept = db.create_task(other.id, user_id, "kept", None).unwrap();

        db.delete_list(list_id, user_id).unwrap();

        assert!(db.get_list(list_id).unwrap().is_none());
        assert!(db.get_task(parent.id).unwrap().is_none());
        assert_eq!(db.get_list_stats(list_id).unwrap().total, 0);
        assert!(db.get_task(kept.id).unwrap().is_some());
    }

    #[test]
    fn delete_list_of_another_user_is_not_found() {
        let db = setup_db();
        let (_, list_id) = setup_list(&db);
        let mallory = create_user(&db, "mallory");

        let err = db.delete_list(list_id, mallory).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::ListNotFound);
        assert!(db.get_list(list_id).unwrap().is_some());
    }
}

mod create_tests {
    use super::*;

    #[test]
    fn sibling_order_increases_from_zero() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let orders: Vec<i64> = (0..4)
            .map(|i| {
                db.create_task(list_id, user_id, &format!("task {}", i), None)
                    .unwrap()
                    .order
            })
            .collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn order_is_scoped_per_parent() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let a = db.create_task(list_id, user_id, "a", None).unwrap();
        let b = db.create_task(list_id, user_id, "b", None).unwrap();
        let a1 = db.create_task(list_id, user_id, "a1", Some(a.id)).unwrap();
        let a2 = db.create_task(list_id, user_id, "a2", Some(a.id)).unwrap();
        let b1 = db.create_task(list_id, user_id, "b1", Some(b.id)).unwrap();
        let c = db.create_task(list_id, user_id, "c", None).unwrap();

        assert_eq!((a.order, b.order, c.order), (0, 1, 2));
        assert_eq!((a1.order, a2.order), (0, 1));
        assert_eq!(b1.order, 0);
        assert_eq!(a1.parent_task_id, Some(a.id));
    }

    #[test]
    fn order_uses_max_not_count_after_delete() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let first = db.create_task(list_id, user_id, "first", None).unwrap();
        db.create_task(list_id, user_id, "second", None).unwrap();
        db.delete_task(first.id).unwrap();

        let third = db.create_task(list_id, user_id, "third", None).unwrap();
        assert_eq!(third.order, 2);
    }

    #[test]
    fn new_task_is_incomplete() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let task = db.create_task(list_id, user_id, "Milk", None).unwrap();
        assert!(!task.completed);
        assert_eq!(task.list_id, list_id);
        assert_eq!(task.user_id, user_id);
        assert!(task.parent_task_id.is_none());
    }

    #[test]
    fn missing_parent_is_rejected() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let err = db.create_task(list_id, user_id, "orphan", Some(42)).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::TaskNotFound);
    }

    #[test]
    fn parent_in_another_list_is_rejected() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        let other = db.create_list(user_id, "Other").unwrap();
        let parent = db.create_task(other.id, user_id, "parent", None).unwrap();

        let err = db
            .create_task(list_id, user_id, "child", Some(parent.id))
            .unwrap_err();
        assert_eq!(error_code(err), ErrorCode::InvalidFieldValue);
        assert!(db.get_children(parent.id).unwrap().is_empty());
    }
}

mod read_tests {
    use super::*;

    #[test]
    fn single_task_has_empty_subtasks() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        db.create_task(list_id, user_id, "Milk", None).unwrap();

        let tree = db.get_list_tasks(list_id).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].task.title, "Milk");
        assert!(tree[0].subtasks.is_empty());
    }

    #[test]
    fn list_tasks_nest_in_sibling_order() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let a = db.create_task(list_id, user_id, "a", None).unwrap();
        let b = db.create_task(list_id, user_id, "b", None).unwrap();
        let a1 = db.create_task(list_id, user_id, "a1", Some(a.id)).unwrap();
        db.create_task(list_id, user_id, "a2", Some(a.id)).unwrap();
        db.create_task(list_id, user_id, "a1x", Some(a1.id)).unwrap();
        db.create_task(list_id, user_id, "b1", Some(b.id)).unwrap();

        let tree = db.get_list_tasks(list_id).unwrap();
        assert_eq!(titles(&tree), vec!["a", "b"]);
        assert_eq!(titles(&tree[0].subtasks), vec!["a1", "a2"]);
        assert_eq!(titles(&tree[0].subtasks[0].subtasks), vec!["a1x"]);
        assert_eq!(titles(&tree[1].subtasks), vec!["b1"]);
        assert_eq!(tree.iter().map(TaskTree::node_count).sum::<usize>(), 6);
    }

    #[test]
    fn empty_list_has_no_tasks() {
        let db = setup_db();
        let (_, list_id) = setup_list(&db);
        assert!(db.get_list_tasks(list_id).unwrap().is_empty());
        assert!(db.get_list_tasks(9999).unwrap().is_empty());
    }

    #[test]
    fn subtasks_of_childless_task_are_empty() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        let task = db.create_task(list_id, user_id, "leaf", None).unwrap();

        assert!(db.get_subtasks(task.id).unwrap().is_empty());
    }

    #[test]
    fn subtasks_load_one_extra_level() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let root = db.create_task(list_id, user_id, "root", None).unwrap();
        let child = db.create_task(list_id, user_id, "child", Some(root.id)).unwrap();
        let grandchild = db
            .create_task(list_id, user_id, "grandchild", Some(child.id))
            .unwrap();
        db.create_task(list_id, user_id, "great", Some(grandchild.id))
            .unwrap();

        let subtasks = db.get_subtasks(root.id).unwrap();
        assert_eq!(titles(&subtasks), vec!["child"]);
        assert_eq!(titles(&subtasks[0].subtasks), vec!["grandchild"]);
        assert!(subtasks[0].subtasks[0].subtasks.is_empty());
    }

    #[test]
    fn task_with_subtasks_returns_full_subtree() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let root = db.create_task(list_id, user_id, "root", None).unwrap();
        let child = db.create_task(list_id, user_id, "child", Some(root.id)).unwrap();
        db.create_task(list_id, user_id, "grandchild", Some(child.id))
            .unwrap();
        db.create_task(list_id, user_id, "sibling", None).unwrap();

        let tree = db.get_task_with_subtasks(root.id).unwrap().expect("exists");
        assert_eq!(tree.task.id, root.id);
        assert_eq!(tree.node_count(), 3);
        assert!(db.get_task_with_subtasks(9999).unwrap().is_none());
    }

    #[test]
    fn deep_chain_reads_and_deletes_without_recursion() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let depth = 5_000;
        let root = db.create_task(list_id, user_id, "0", None).unwrap();
        let mut parent = root.id;
        for i in 1..depth {
            parent = db
                .create_task(list_id, user_id, &i.to_string(), Some(parent))
                .unwrap()
                .id;
        }

        let tree = db.get_list_tasks(list_id).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].node_count(), depth);

        assert_eq!(db.delete_task(root.id).unwrap(), depth);
        assert_eq!(db.get_list_stats(list_id).unwrap().total, 0);
    }
}

mod completion_tests {
    use super::*;

    #[test]
    fn toggle_twice_restores_original() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        let task = db.create_task(list_id, user_id, "t", None).unwrap();

        let once = db.toggle_task_completion(task.id).unwrap();
        assert!(once.completed);
        let twice = db.toggle_task_completion(task.id).unwrap();
        assert_eq!(twice.completed, task.completed);
    }

    #[test]
    fn toggle_missing_task_is_not_found() {
        let db = setup_db();
        let err = db.toggle_task_completion(77).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::TaskNotFound);
    }

    #[test]
    fn set_completion_is_idempotent() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        let task = db.create_task(list_id, user_id, "t", None).unwrap();

        assert!(db.set_task_completion(task.id, true).unwrap().completed);
        assert!(db.set_task_completion(task.id, true).unwrap().completed);
        assert!(!db.set_task_completion(task.id, false).unwrap().completed);
    }

    #[test]
    fn stats_count_total_and_completed() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let ids: Vec<i64> = (0..5)
            .map(|i| {
                db.create_task(list_id, user_id, &format!("t{}", i), None)
                    .unwrap()
                    .id
            })
            .collect();
        db.toggle_task_completion(ids[1]).unwrap();
        db.toggle_task_completion(ids[3]).unwrap();

        let stats = db.get_list_stats(list_id).unwrap();
        assert_eq!((stats.total, stats.completed), (5, 2));
    }

    #[test]
    fn stats_include_subtasks() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        let parent = db.create_task(list_id, user_id, "p", None).unwrap();
        let child = db.create_task(list_id, user_id, "c", Some(parent.id)).unwrap();
        db.toggle_task_completion(child.id).unwrap();

        let stats = db.get_list_stats(list_id).unwrap();
        assert_eq!((stats.total, stats.completed), (2, 1));
    }

    #[test]
    fn stats_of_empty_list_are_zero() {
        let db = setup_db();
        let (_, list_id) = setup_list(&db);
        let stats = db.get_list_stats(list_id).unwrap();
        assert_eq!((stats.total, stats.completed), (0, 0));
    }
}

mod update_tests {
    use super::*;

    #[test]
    fn update_title_changes_only_title() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        let task = db.create_task(list_id, user_id, "old", None).unwrap();

        let updated = db.update_task_title(task.id, "new").unwrap();
        assert_eq!(updated.title, "new");
        assert_eq!(updated.order, task.order);
        assert_eq!(updated.completed, task.completed);
        assert!(updated.updated_at >= task.updated_at);
    }

    #[test]
    fn update_missing_task_is_not_found() {
        let db = setup_db();
        let err = db.update_task_title(5, "x").unwrap_err();
        assert_eq!(error_code(err), ErrorCode::TaskNotFound);
    }
}

mod delete_tests {
    use super::*;

    #[test]
    fn deleting_leaf_removes_one_row() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        let parent = db.create_task(list_id, user_id, "p", None).unwrap();
        let leaf = db.create_task(list_id, user_id, "leaf", Some(parent.id)).unwrap();

        assert_eq!(db.delete_task(leaf.id).unwrap(), 1);
        assert!(db.get_task(parent.id).unwrap().is_some());
    }

    #[test]
    fn deleting_parent_removes_all_descendants() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);

        let root = db.create_task(list_id, user_id, "root", None).unwrap();
        let a = db.create_task(list_id, user_id, "a", Some(root.id)).unwrap();
        db.create_task(list_id, user_id, "b", Some(root.id)).unwrap();
        let a1 = db.create_task(list_id, user_id, "a1", Some(a.id)).unwrap();
        db.create_task(list_id, user_id, "a1x", Some(a1.id)).unwrap();
        let other = db.create_task(list_id, user_id, "other", None).unwrap();

        assert_eq!(db.delete_task(root.id).unwrap(), 5);
        assert!(db.get_task(a1.id).unwrap().is_none());
        assert!(db.get_task(other.id).unwrap().is_some());
        assert_eq!(db.get_list_stats(list_id).unwrap().total, 1);
    }

    #[test]
    fn deleting_missing_task_is_not_found() {
        let db = setup_db();
        let err = db.delete_task(123).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::TaskNotFound);
    }
}

mod move_tests {
    use super::*;

    #[test]
    fn move_keeps_order_and_parent() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        let target = db.create_list(user_id, "Target").unwrap();

        db.create_task(list_id, user_id, "first", None).unwrap();
        let task = db.create_task(list_id, user_id, "second", None).unwrap();

        let moved = db.move_task_to_list(task.id, target.id).unwrap();
        assert_eq!(moved.list_id, target.id);
        assert_eq!(moved.order, task.order);
        assert_eq!(moved.parent_task_id, None);
    }

    #[test]
    fn move_carries_the_subtree() {
        let db = setup_db();
        let (user_id, list_id) = setup_list(&db);
        let target = db.create_list(user_id, "Target").unwrap();

        let root = db.create_task(list_id, user_id, "root", None).unwrap();
        let child = db.create_task(list_id, user_id, "child", Some(root.id)).unwrap();
        db.create_task(list_id, user_id, "grandchild", Some(child.id))
            .unwrap();
        db.toggle_task_completion(child.id).unwrap();

        db.move_task_to_list(root.id, target.id).unwrap();

        let source = db.get_list_stats(list_id).unwrap();
        let dest = db.get_list_stats(target.id).unwrap();
        assert_eq!((source.total, source.completed), (0, 0));
        assert_eq!((dest.total, dest.completed), (3, 1));

        let tree = db.get_list_tasks(target.id).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].node_count(), 3);
        assert!(db.get_list_tasks(list_id).unwrap().is_empty());
    }

    #[test]
    fn move_missing_task_is_not_found() {
        let db = setup_db();
        let (_, list_id) = setup_list(&db);
        let err = db.move_task_to_list(404, list_id).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::TaskNotFound);
    }
}

mod persistence_tests {
    use super::*;

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todo.db");

        let list_id = {
            let db = Database::open(&path).unwrap();
            let (user_id, list_id) = setup_list(&db);
            db.create_task(list_id, user_id, "persisted", None).unwrap();
            list_id
        };

        let db = Database::open(&path).unwrap();
        let tree = db.get_list_tasks(list_id).unwrap();
        assert_eq!(titles(&tree), vec!["persisted"]);
    }
}
