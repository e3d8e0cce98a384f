//! Core types for the nested todo service.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Parse a stored role; unknown values fall back to `User`.
    pub fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// A registered user, including the credential hash.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub login_method: Option<String>,
    pub role: Role,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_signed_in: i64,
}

/// The user as exposed to clients (no credential hash).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Role,
    pub last_signed_in: i64,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
            role: user.role,
            last_signed_in: user.last_signed_in,
        }
    }
}

/// Input for registering a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// A named list owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TodoList {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Completion counts for one list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListStats {
    pub total: i64,
    pub completed: i64,
}

/// A list enriched with its completion counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListWithStats {
    #[serde(flatten)]
    pub list: TodoList,
    #[serde(flatten)]
    pub stats: ListStats,
}

/// A single task row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub list_id: i64,
    pub user_id: i64,
    pub title: String,
    pub completed: bool,
    pub parent_task_id: Option<i64>,
    pub order: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn is_top_level(&self) -> bool {
        self.parent_task_id.is_none()
    }
}

/// A task with its nested subtasks.
///
/// Nesting depth is unbounded, so this type has no serde impls: derived
/// ones recurse once per level. Encode with [`TaskTree::write_json`] or
/// [`write_forest_json`] instead.
#[derive(Debug)]
pub struct TaskTree {
    pub task: Task,
    pub subtasks: Vec<TaskTree>,
}

impl TaskTree {
    /// Wrap a task with no subtasks loaded.
    pub fn leaf(task: Task) -> Self {
        Self {
            task,
            subtasks: Vec::new(),
        }
    }

    /// Number of nodes in this tree, including the root.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.subtasks.iter());
        }
        count
    }
}

/// Encode a sequence of trees as a JSON array.
///
/// Each node is the task's camelCase object with a `subtasks` array
/// appended. Nesting is tracked on an explicit stack.
pub fn write_forest_json<W: Write>(forest: &[TaskTree], mut writer: W) -> io::Result<()> {
    writer.write_all(b"[")?;
    write_nodes(forest, &mut writer)?;
    writer.write_all(b"]")
}

impl TaskTree {
    /// Encode this tree as a single JSON object.
    pub fn write_json<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_nodes(std::slice::from_ref(self), &mut writer)
    }
}

/// Comma-separated node objects, without surrounding brackets.
fn write_nodes<W: Write>(roots: &[TaskTree], writer: &mut W) -> io::Result<()> {
    let mut stack = vec![roots.iter()];
    let mut first = true;

    while let Some(level) = stack.last_mut() {
        match level.next() {
            Some(node) => {
                if !first {
                    writer.write_all(b",")?;
                }
                let task = serde_json::to_vec(&node.task)?;
                let Some((b'}', fields)) = task.split_last() else {
                    return Err(io::Error::other("task did not encode as a JSON object"));
                };
                writer.write_all(fields)?;
                writer.write_all(b",\"subtasks\":[")?;
                stack.push(node.subtasks.iter());
                first = true;
            }
            None => {
                stack.pop();
                if !stack.is_empty() {
                    writer.write_all(b"]}")?;
                }
                first = false;
            }
        }
    }
    Ok(())
}

// The derived drop would recurse once per nesting level.
impl Drop for TaskTree {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.subtasks);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.subtasks);
        }
    }
}
