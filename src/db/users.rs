// Users and bearer-token sessions
// Identity is minted locally; the server only ever resolves tokens.

use rusqlite::{params, OptionalExtension, Result};

use super::Database;

/// Represents a listener account
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub created_at: String,
}

impl Database {
    /// Create a new user with a fresh UUID
    pub fn create_user(&self, name: &str, email: Option<&str>) -> Result<User> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO users (id, name, email) VALUES (?, ?, ?)",
            params![id, name, email],
        )?;
        self.get_user(&id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Read a user by ID
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, name, email, picture, created_at FROM users WHERE id = ?",
                [id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        picture: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
    }

    pub fn count_users(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
    }

    /// Update the mutable display fields
    pub fn update_user_profile(&self, id: &str, name: &str, picture: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET name = ?, picture = ? WHERE id = ?",
            params![name, picture, id],
        )?;
        Ok(())
    }

    /// Store a session token for a user
    pub fn create_session(&self, user_id: &str, token: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (token, user_id) VALUES (?, ?)",
            params![token, user_id],
        )?;
        Ok(())
    }

    /// Resolve a bearer token to its user ID
    pub fn user_id_for_token(&self, token: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT user_id FROM sessions WHERE token = ?",
                [token],
                |row| row.get(0),
            )
            .optional()
    }

    /// Drop every session of a user
    pub fn revoke_sessions(&self, user_id: &str) -> Result<usize> {
        self.conn
            .execute("DELETE FROM sessions WHERE user_id = ?", [user_id])
    }
}
