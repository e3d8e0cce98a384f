//! Todo list CRUD.

use super::{Database, now_ms};
use crate::error::ApiError;
use crate::types::TodoList;
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

pub fn parse_list_row(row: &Row) -> rusqlite::Result<TodoList> {
    Ok(TodoList {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl Database {
    /// All lists owned by a user, oldest first.
    pub fn get_user_lists(&self, user_id: i64) -> Result<Vec<TodoList>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM todo_lists WHERE user_id = ?1 ORDER BY created_at, id",
            )?;
            let lists = stmt
                .query_map(params![user_id], parse_list_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(lists)
        })
    }

    /// Create a new list for a user.
    pub fn create_list(&self, user_id: i64, name: &str) -> Result<TodoList> {
        let now = now_ms();
        self.with_conn(|conn| {
            let list = conn.query_row(
                "INSERT INTO todo_lists (user_id, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 RETURNING *",
                params![user_id, name, now],
                parse_list_row,
            )?;
            Ok(list)
        })
    }

    /// Get a list by id.
    pub fn get_list(&self, list_id: i64) -> Result<Option<TodoList>> {
        self.with_conn(|conn| {
            let list = conn
                .query_row(
                    "SELECT * FROM todo_lists WHERE id = ?1",
                    params![list_id],
                    parse_list_row,
                )
                .optional()?;
            Ok(list)
        })
    }

    /// Delete a list owned by `user_id` together with every task in it.
    pub fn delete_list(&self, list_id: i64, user_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let owned: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM todo_lists WHERE id = ?1 AND user_id = ?2)",
                params![list_id, user_id],
                |row| row.get(0),
            )?;
            if !owned {
                return Err(ApiError::list_not_found(list_id).into());
            }

            let tasks = tx.execute("DELETE FROM tasks WHERE list_id = ?1", params![list_id])?;
            tx.execute(
                "DELETE FROM todo_lists WHERE id = ?1 AND user_id = ?2",
                params![list_id, user_id],
            )?;

            tx.commit()?;
            debug!(list_id, tasks, "Deleted list");
            Ok(())
        })
    }
}
