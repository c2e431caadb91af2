use super::Database;
use crate::model::Role;
use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

#[derive(Debug, Clone)]
pub struct LocalUserRow {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub password_salt: String,
    pub password_hash: String,
    pub confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct NewLocalUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub full_name: &'a str,
    pub role: Role,
    pub password_salt: &'a str,
    pub password_hash: &'a str,
    pub confirmed_at: Option<i64>,
    pub confirmation_token: Option<&'a str>,
    pub created_at: i64,
}

const LOCAL_USER_COLUMNS: &str =
    "id, email, full_name, role, password_salt, password_hash, confirmed_at";

impl Database {
    pub fn insert_local_user(&self, user: &NewLocalUser<'_>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO local_users
                   (id, email, full_name, role, password_salt, password_hash, confirmed_at, confirmation_token, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user.id,
                    user.email,
                    user.full_name,
                    user.role.as_str(),
                    user.password_salt,
                    user.password_hash,
                    user.confirmed_at,
                    user.confirmation_token,
                    user.created_at
                ],
            )
            .context("Failed to insert local user")?;

        Ok(())
    }

    pub fn local_user_by_email(&self, email: &str) -> Result<Option<LocalUserRow>> {
        self.conn
            .query_row(
                &format!("SELECT {LOCAL_USER_COLUMNS} FROM local_users WHERE email = ?1"),
                params![email],
                local_user_from_row,
            )
            .optional()
            .context("Failed to query local user by email")
    }

    pub fn local_user_by_id(&self, id: &str) -> Result<Option<LocalUserRow>> {
        self.conn
            .query_row(
                &format!("SELECT {LOCAL_USER_COLUMNS} FROM local_users WHERE id = ?1"),
                params![id],
                local_user_from_row,
            )
            .optional()
            .context("Failed to query local user by id")
    }

    pub fn set_confirmation_token(&self, user_id: &str, token: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE local_users SET confirmation_token = ?1 WHERE id = ?2",
                params![token, user_id],
            )
            .context("Failed to store confirmation token")?;

        Ok(())
    }

    pub fn confirm_local_user(&self, token: &str, confirmed_at: i64) -> Result<Option<String>> {
        let user_id: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM local_users WHERE confirmation_token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up confirmation token")?;

        if let Some(id) = &user_id {
            self.conn
                .execute(
                    "UPDATE local_users SET confirmed_at = ?1, confirmation_token = NULL WHERE id = ?2",
                    params![confirmed_at, id],
                )
                .context("Failed to confirm local user")?;
        }

        Ok(user_id)
    }

    pub fn insert_session(&self, token: &str, user_id: &str, expires_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO local_sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token, user_id, expires_at],
            )
            .context("Failed to insert session")?;

        Ok(())
    }

    pub fn session_user_id(&self, token: &str, now: i64) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT user_id FROM local_sessions WHERE token = ?1 AND expires_at > ?2",
                params![token, now],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query session")
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM local_sessions WHERE token = ?1",
                params![token],
            )
            .context("Failed to delete session")?;

        Ok(deleted > 0)
    }

    pub fn purge_expired_sessions(&self, now: i64) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM local_sessions WHERE expires_at <= ?1",
                params![now],
            )
            .context("Failed to purge expired sessions")
    }
}

fn local_user_from_row(row: &Row<'_>) -> rusqlite::Result<LocalUserRow> {
    let role: String = row.get(3)?;
    let confirmed_at: Option<i64> = row.get(6)?;

    Ok(LocalUserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        role: Role::from_db_str(&role),
        password_salt: row.get(4)?,
        password_hash: row.get(5)?,
        confirmed: confirmed_at.is_some(),
    })
}
