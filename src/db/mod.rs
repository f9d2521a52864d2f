mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::migration::migrate_str;
use crate::models::*;

/// SQLite store for per-user documents and task photos.
///
/// Documents are stored as the JSON text of [`PersistedState`], keyed by
/// user id. Reading goes through [`crate::migration`], so older or damaged
/// documents come back normalized.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "summit")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("summit.db"))
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Document operations
    // ============================================================

    /// Raw JSON text of a user's document, exactly as stored.
    pub fn get_document_raw(&self, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let body = conn
            .query_row(
                "SELECT body FROM documents WHERE user_id = ?",
                [user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(body)
    }

    /// A user's state, upgraded to the current schema. `None` for unknown users.
    pub fn get_state(&self, user_id: &str) -> Result<Option<PersistedState>> {
        Ok(self.get_document_raw(user_id)?.map(|raw| migrate_str(&raw)))
    }

    pub fn save_state(&self, user_id: &str, state: &PersistedState) -> Result<()> {
        let body = serde_json::to_string(state).context("Failed to serialize state")?;
        self.save_document_raw(user_id, &body, state.version)
    }

    /// Store document text as-is. Used for imports and by tests that need
    /// documents from older schema generations.
    pub fn save_document_raw(&self, user_id: &str, body: &str, version: u32) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO documents (user_id, body, version, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                body = excluded.body,
                version = excluded.version,
                updated_at = excluded.updated_at",
            (user_id, body, version, Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    pub fn delete_document(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM documents WHERE user_id = ?", [user_id])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Photo operations
    // ============================================================

    pub fn create_photo(&self, user_id: &str, data: &str) -> Result<Photo> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO photos (id, user_id, data, created_at) VALUES (?, ?, ?, ?)",
            (id.to_string(), user_id, data, now.to_rfc3339()),
        )?;

        Ok(Photo {
            id,
            user_id: user_id.to_string(),
            data: data.to_string(),
            created_at: now,
        })
    }

    pub fn get_photo(&self, id: Uuid) -> Result<Option<Photo>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let photo = conn
            .query_row(
                "SELECT id, user_id, data, created_at FROM photos WHERE id = ?",
                [id.to_string()],
                |row| {
                    Ok(Photo {
                        id: parse_uuid(row.get::<_, String>(0)?),
                        user_id: row.get(1)?,
                        data: row.get(2)?,
                        created_at: parse_datetime(row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()?;
        Ok(photo)
    }

    /// Delete a photo, but only if `user_id` owns it.
    pub fn delete_photo(&self, user_id: &str, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM photos WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id),
        )?;
        Ok(rows > 0)
    }

    /// Release the stored photo behind a task's photo reference.
    ///
    /// Inline images, foreign URLs and photos owned by another user are left
    /// alone.
    pub fn release_photo(&self, user_id: &str, reference: &str) -> Result<bool> {
        match stored_photo_id(reference) {
            Some(id) => self.delete_photo(user_id, id),
            None => Ok(false),
        }
    }

    /// True if `reference` points at a stored photo owned by `user_id`.
    pub fn owns_photo(&self, user_id: &str, reference: &str) -> Result<bool> {
        let Some(id) = stored_photo_id(reference) else {
            return Ok(false);
        };
        let conn = self.conn.lock().expect("database lock poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM photos WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id),
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn count_photos(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM photos WHERE user_id = ?",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
