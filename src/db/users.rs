//! User account queries.

use super::{Database, now_ms};
use crate::error::ApiError;
use crate::types::{NewUser, Role, User};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

fn parse_user_row(row: &Row) -> rusqlite::Result<User> {
    let role: String = row.get("role")?;
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        name: row.get("name")?,
        login_method: row.get("login_method")?,
        role: Role::parse(&role),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        last_signed_in: row.get("last_signed_in")?,
    })
}

fn get_user_internal(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT * FROM users WHERE id = ?1",
            params![user_id],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

impl Database {
    /// Register a new user with the custom login method.
    /// Fails with `ALREADY_EXISTS` when the username is taken.
    pub fn create_user(&self, new_user: NewUser) -> Result<User> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                params![&new_user.username],
                |row| row.get(0),
            )?;
            if taken {
                return Err(ApiError::already_exists("Username")
                    .with_field("username")
                    .into());
            }

            tx.execute(
                "INSERT INTO users (
                    username, email, password_hash, name, login_method, role,
                    created_at, updated_at, last_signed_in
                ) VALUES (?1, ?2, ?3, ?1, 'custom', ?4, ?5, ?5, ?5)",
                params![
                    &new_user.username,
                    &new_user.email,
                    &new_user.password_hash,
                    new_user.role.as_str(),
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();
            let user = get_user_internal(&tx, id)?.ok_or_else(|| ApiError::user_not_found(id))?;

            tx.commit()?;
            Ok(user)
        })
    }

    /// Get a user by id.
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        self.with_conn(|conn| get_user_internal(conn, user_id))
    }

    /// Get a user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT * FROM users WHERE username = ?1",
                    params![username],
                    parse_user_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    /// Record a successful sign-in.
    pub fn touch_last_signed_in(&self, user_id: i64) -> Result<()> {
        let now = now_ms();
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET last_signed_in = ?2, updated_at = ?2 WHERE id = ?1",
                params![user_id, now],
            )?;
            if updated == 0 {
                return Err(ApiError::user_not_found(user_id).into());
            }
            Ok(())
        })
    }
}
