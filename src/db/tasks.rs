//! Task CRUD and tree operations.
//!
//! Trees are loaded with one recursive query and assembled with an explicit
//! stack; subtree walks for delete and move use a worklist. Nesting depth is
//! unbounded, so nothing here recurses on the call stack.

use super::{Database, now_ms};
use crate::error::ApiError;
use crate::types::{Task, TaskTree};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        list_id: row.get("list_id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        completed: row.get("completed")?,
        parent_task_id: row.get("parent_task_id")?,
        order: row.get("order")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Internal helper to get a task using an existing connection (avoids deadlock).
fn get_task_internal(conn: &Connection, task_id: i64) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT * FROM tasks WHERE id = ?1",
            params![task_id],
            parse_task_row,
        )
        .optional()?;
    Ok(task)
}

fn get_children_internal(conn: &Connection, parent_id: i64) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks WHERE parent_task_id = ?1 ORDER BY \"order\", id",
    )?;
    let tasks = stmt
        .query_map(params![parent_id], parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Ids of `root` and all its descendants in depth-first pre-order.
/// A parent always precedes its descendants.
fn collect_subtree_ids(conn: &Connection, root: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM tasks WHERE parent_task_id = ?1 ORDER BY \"order\" DESC, id DESC",
    )?;
    let mut visited = HashSet::new();
    let mut ordered = Vec::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        ordered.push(id);
        let children = stmt
            .query_map(params![id], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        // Reverse-ordered query so the first child is popped first.
        stack.extend(children);
    }

    Ok(ordered)
}

/// Build trees from root tasks and a parent -> ordered children map.
///
/// Each child list is taken out of the map when its parent is expanded, so a
/// parent cycle in corrupt data terminates instead of looping.
fn assemble_trees(roots: Vec<Task>, mut children: HashMap<i64, Vec<Task>>) -> Vec<TaskTree> {
    struct Frame {
        task: Task,
        pending: std::vec::IntoIter<Task>,
        built: Vec<TaskTree>,
    }

    let mut forest = Vec::with_capacity(roots.len());

    for root in roots {
        let pending = children.remove(&root.id).unwrap_or_default().into_iter();
        let mut stack = vec![Frame {
            task: root,
            pending,
            built: Vec::new(),
        }];

        while let Some(top) = stack.last_mut() {
            if let Some(child) = top.pending.next() {
                let pending = children.remove(&child.id).unwrap_or_default().into_iter();
                stack.push(Frame {
                    task: child,
                    pending,
                    built: Vec::new(),
                });
                continue;
            }

            let Some(done) = stack.pop() else { break };
            let node = TaskTree {
                task: done.task,
                subtasks: done.built,
            };
            match stack.last_mut() {
                Some(parent) => parent.built.push(node),
                None => forest.push(node),
            }
        }
    }

    forest
}

/// Split rows of a loaded subtree into roots and a parent -> children map.
/// Rows must already be sorted by sibling order.
fn group_rows(rows: Vec<Task>, is_root: impl Fn(&Task) -> bool) -> (Vec<Task>, HashMap<i64, Vec<Task>>) {
    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<Task>> = HashMap::new();
    for task in rows {
        if is_root(&task) {
            roots.push(task);
        } else if let Some(parent) = task.parent_task_id {
            children.entry(parent).or_default().push(task);
        }
    }
    (roots, children)
}

impl Database {
    /// Create a new task at the end of its sibling group.
    ///
    /// The order is assigned inside the INSERT as `max(sibling order) + 1`
    /// (0 for the first sibling). Siblings are scoped by parent when one is
    /// given, otherwise by list among top-level tasks. A parent must exist
    /// and belong to the same list.
    pub fn create_task(
        &self,
        list_id: i64,
        user_id: i64,
        title: &str,
        parent_task_id: Option<i64>,
    ) -> Result<Task> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let task = match parent_task_id {
                Some(parent_id) => {
                    let parent = get_task_internal(&tx, parent_id)?
                        .ok_or_else(|| ApiError::task_not_found(parent_id))?;
                    if parent.list_id != list_id {
                        return Err(ApiError::invalid_value(
                            "parentTaskId",
                            format!(
                                "Parent task {} belongs to list {}, not {}",
                                parent_id, parent.list_id, list_id
                            ),
                        )
                        .into());
                    }
                    tx.query_row(
                        "INSERT INTO tasks (
                            list_id, user_id, title, completed, parent_task_id, \"order\",
                            created_at, updated_at
                        )
                        SELECT ?1, ?2, ?3, 0, ?4, COALESCE(MAX(\"order\"), -1) + 1, ?5, ?5
                        FROM tasks WHERE parent_task_id = ?4
                        RETURNING *",
                        params![list_id, user_id, title, parent_id, now],
                        parse_task_row,
                    )?
                }
                None => tx.query_row(
                    "INSERT INTO tasks (
                        list_id, user_id, title, completed, parent_task_id, \"order\",
                        created_at, updated_at
                    )
                    SELECT ?1, ?2, ?3, 0, NULL, COALESCE(MAX(\"order\"), -1) + 1, ?4, ?4
                    FROM tasks WHERE list_id = ?1 AND parent_task_id IS NULL
                    RETURNING *",
                    params![list_id, user_id, title, now],
                    parse_task_row,
                )?,
            };

            tx.commit()?;
            debug!(task_id = task.id, list_id, parent_task_id = ?task.parent_task_id, order = task.order, "Created task");
            Ok(task)
        })
    }

    /// Get a task by id.
    pub fn get_task(&self, task_id: i64) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    /// Direct children of a task, ordered by sibling order.
    pub fn get_children(&self, parent_id: i64) -> Result<Vec<Task>> {
        self.with_conn(|conn| get_children_internal(conn, parent_id))
    }

    /// Top-level tasks of a list with their full subtrees, every level
    /// ordered by sibling order.
    pub fn get_list_tasks(&self, list_id: i64) -> Result<Vec<TaskTree>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH RECURSIVE tree(id) AS (
                    SELECT id FROM tasks WHERE list_id = ?1 AND parent_task_id IS NULL
                    UNION
                    SELECT t.id FROM tasks t INNER JOIN tree ON t.parent_task_id = tree.id
                )
                SELECT * FROM tasks WHERE id IN (SELECT id FROM tree)
                ORDER BY \"order\", id",
            )?;
            let rows = stmt
                .query_map(params![list_id], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let (roots, children) = group_rows(rows, Task::is_top_level);
        Ok(assemble_trees(roots, children))
    }

    /// A task with its full subtree, or `None` if it does not exist.
    pub fn get_task_with_subtasks(&self, task_id: i64) -> Result<Option<TaskTree>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH RECURSIVE tree(id) AS (
                    SELECT id FROM tasks WHERE id = ?1
                    UNION
                    SELECT t.id FROM tasks t INNER JOIN tree ON t.parent_task_id = tree.id
                )
                SELECT * FROM tasks WHERE id IN (SELECT id FROM tree)
                ORDER BY \"order\", id",
            )?;
            let rows = stmt
                .query_map(params![task_id], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let (roots, children) = group_rows(rows, |task| task.id == task_id);
        Ok(assemble_trees(roots, children).into_iter().next())
    }

    /// Immediate children of a task, each with its own immediate children.
    ///
    /// Only one extra level is loaded; grandchildren carry empty subtasks.
    pub fn get_subtasks(&self, parent_id: i64) -> Result<Vec<TaskTree>> {
        self.with_conn(|conn| {
            let children = get_children_internal(conn, parent_id)?;
            let mut result = Vec::with_capacity(children.len());
            for child in children {
                let grandchildren = get_children_internal(conn, child.id)?
                    .into_iter()
                    .map(TaskTree::leaf)
                    .collect();
                result.push(TaskTree {
                    task: child,
                    subtasks: grandchildren,
                });
            }
            Ok(result)
        })
    }

    /// Flip a task's completion flag in a single statement.
    pub fn toggle_task_completion(&self, task_id: i64) -> Result<Task> {
        let now = now_ms();
        self.with_conn(|conn| {
            let task = conn
                .query_row(
                    "UPDATE tasks SET completed = NOT completed, updated_at = ?2
                     WHERE id = ?1
                     RETURNING *",
                    params![task_id, now],
                    parse_task_row,
                )
                .optional()?
                .ok_or_else(|| ApiError::task_not_found(task_id))?;
            Ok(task)
        })
    }

    /// Set a task's completion flag.
    pub fn set_task_completion(&self, task_id: i64, completed: bool) -> Result<Task> {
        let now = now_ms();
        self.with_conn(|conn| {
            let task = conn
                .query_row(
                    "UPDATE tasks SET completed = ?2, updated_at = ?3
                     WHERE id = ?1
                     RETURNING *",
                    params![task_id, completed, now],
                    parse_task_row,
                )
                .optional()?
                .ok_or_else(|| ApiError::task_not_found(task_id))?;
            Ok(task)
        })
    }

    /// Replace a task's title.
    pub fn update_task_title(&self, task_id: i64, title: &str) -> Result<Task> {
        let now = now_ms();
        self.with_conn(|conn| {
            let task = conn
                .query_row(
                    "UPDATE tasks SET title = ?2, updated_at = ?3
                     WHERE id = ?1
                     RETURNING *",
                    params![task_id, title, now],
                    parse_task_row,
                )
                .optional()?
                .ok_or_else(|| ApiError::task_not_found(task_id))?;
            Ok(task)
        })
    }

    /// Delete a task and its whole subtree, children before parents.
    /// Returns the number of rows removed.
    pub fn delete_task(&self, task_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if get_task_internal(&tx, task_id)?.is_none() {
                return Err(ApiError::task_not_found(task_id).into());
            }

            let subtree = collect_subtree_ids(&tx, task_id)?;
            let mut deleted = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM tasks WHERE id = ?1")?;
                for id in subtree.iter().rev() {
                    deleted += stmt.execute(params![id])?;
                }
            }

            tx.commit()?;
            debug!(task_id, deleted, "Deleted task subtree");
            Ok(deleted)
        })
    }

    /// Point a task, and every descendant, at another list.
    ///
    /// `order` and `parent_task_id` are left untouched. No ownership checks
    /// are made here.
    pub fn move_task_to_list(&self, task_id: i64, new_list_id: i64) -> Result<Task> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if get_task_internal(&tx, task_id)?.is_none() {
                return Err(ApiError::task_not_found(task_id).into());
            }

            let subtree = collect_subtree_ids(&tx, task_id)?;
            {
                let mut stmt =
                    tx.prepare("UPDATE tasks SET list_id = ?2, updated_at = ?3 WHERE id = ?1")?;
                for id in &subtree {
                    stmt.execute(params![id, new_list_id, now])?;
                }
            }

            let task = get_task_internal(&tx, task_id)?
                .ok_or_else(|| ApiError::task_not_found(task_id))?;
            tx.commit()?;
            debug!(task_id, new_list_id, moved = subtree.len(), "Moved task");
            Ok(task)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: i64, parent: Option<i64>, order: i64) -> Task {
        Task {
            id,
            list_id: 1,
            user_id: 1,
            title: format!("t{}", id),
            completed: false,
            parent_task_id: parent,
            order,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn assemble_trees_nests_children_in_row_order() {
        let rows = vec![
            task(1, None, 0),
            task(3, Some(1), 0),
            task(2, None, 1),
            task(4, Some(1), 1),
            task(5, Some(3), 0),
        ];
        let (roots, children) = group_rows(rows, Task::is_top_level);
        let forest = assemble_trees(roots, children);

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].task.id, 1);
        let child_ids: Vec<i64> = forest[0].subtasks.iter().map(|t| t.task.id).collect();
        assert_eq!(child_ids, vec![3, 4]);
        assert_eq!(forest[0].subtasks[0].subtasks[0].task.id, 5);
        assert!(forest[1].subtasks.is_empty());
    }

    #[test]
    fn assemble_trees_handles_deep_chain_without_recursion() {
        let depth = 50_000;
        let mut rows = vec![task(0, None, 0)];
        for id in 1..depth {
            rows.push(task(id, Some(id - 1), 0));
        }
        let (roots, children) = group_rows(rows, Task::is_top_level);
        let forest = assemble_trees(roots, children);

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].node_count(), depth as usize);
    }

    #[test]
    fn assemble_trees_terminates_on_parent_cycle() {
        // 2 and 3 point at each other; 2 also hangs under root 1.
        let mut children: HashMap<i64, Vec<Task>> = HashMap::new();
        children.insert(1, vec![task(2, Some(1), 0)]);
        children.insert(2, vec![task(3, Some(2), 0)]);
        children.insert(3, vec![task(2, Some(3), 0)]);

        let forest = assemble_trees(vec![task(1, None, 0)], children);
        assert_eq!(forest.len(), 1);
        assert!(forest[0].node_count() <= 4);
    }
}
