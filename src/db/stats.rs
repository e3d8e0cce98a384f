//! Aggregation queries for statistics.

use super::Database;
use crate::types::ListStats;
use anyhow::Result;
use rusqlite::params;

impl Database {
    /// Count all tasks of a list (any depth) and how many are completed.
    pub fn get_list_stats(&self, list_id: i64) -> Result<ListStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(completed), 0) FROM tasks WHERE list_id = ?1",
                params![list_id],
                |row| {
                    Ok(ListStats {
                        total: row.get(0)?,
                        completed: row.get(1)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }
}
