use crate::canonical::normalize_text;
use crate::errors::{AppError, AppResult};
use crate::models::{CanonicalAuditEvent, CanonicalInitiative, CanonicalUser, SourceKind, Stage, Status};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

// Namespace for owner-name derived user ids. Changing it re-keys every
// derived user, so it is fixed for the lifetime of the canonical store.
const USER_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c4e_8a1b_4c5d_9e7f_0a1b_2c3d_4e5f);

/// Stable canonical user id: the given legacy id when present, otherwise a
/// name-derived v5 uuid so repeated runs resolve to the same user.
pub fn stable_user_id(owner_id: Option<&str>, display_name: &str) -> String {
    match owner_id.map(str::trim).filter(|value| !value.is_empty()) {
        Some(id) => id.to_string(),
        None => format!(
            "user-{}",
            Uuid::new_v5(&USER_ID_NAMESPACE, normalize_text(display_name).as_bytes())
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserWrite {
    Inserted,
    Updated,
    Unchanged,
}

/// Row metadata carried alongside a canonical record.
#[derive(Debug, Clone, Copy)]
pub struct Provenance<'a> {
    pub source: SourceKind,
    pub source_id: &'a str,
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::from)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    /// Insert-if-absent. Returns whether this call created the row.
    pub fn ensure_user(&self, user: &CanonicalUser) -> AppResult<bool> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO canonical_users (id, display_name, department, locale, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![user.id, user.display_name, user.department, user.locale, now],
        )?;
        Ok(inserted > 0)
    }

    /// Insert or refresh a user from an authoritative directory entry.
    pub fn upsert_user(&self, user: &CanonicalUser) -> AppResult<UserWrite> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let existing = conn
            .query_row(
                "SELECT id, display_name, department, locale FROM canonical_users WHERE id = ?1",
                [&user.id],
                map_user,
            )
            .optional()?;

        match existing {
            None => {
                conn.execute(
                    "INSERT INTO canonical_users (id, display_name, department, locale, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![user.id, user.display_name, user.department, user.locale, now],
                )?;
                Ok(UserWrite::Inserted)
            }
            Some(current) if current == *user => Ok(UserWrite::Unchanged),
            Some(_) => {
                conn.execute(
                    "UPDATE canonical_users SET display_name = ?1, department = ?2, locale = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![user.display_name, user.department, user.locale, now, user.id],
                )?;
                Ok(UserWrite::Updated)
            }
        }
    }

    pub fn get_user(&self, id: &str) -> AppResult<Option<CanonicalUser>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, display_name, department, locale FROM canonical_users WHERE id = ?1",
                [id],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Writes the initiative unless a row with the same fingerprint already
    /// exists in the store. Returns `false` on such a conflict.
    pub fn insert_initiative(
        &self,
        initiative: &CanonicalInitiative,
        fingerprint: &str,
        legacy_created_at: Option<&str>,
        provenance: Provenance<'_>,
    ) -> AppResult<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO canonical_initiatives (
               id, fingerprint, title, owner_id, owner_name, status, stage,
               source, source_id, legacy_created_at, migrated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(fingerprint) DO NOTHING",
            params![
                initiative.id,
                fingerprint,
                initiative.title,
                initiative.owner_id,
                initiative.owner_name,
                initiative.status.as_str(),
                initiative.stage.as_str(),
                provenance.source.as_str(),
                provenance.source_id,
                legacy_created_at,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn list_initiatives(&self) -> AppResult<Vec<CanonicalInitiative>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, owner_id, owner_name, status, stage
             FROM canonical_initiatives
             ORDER BY migrated_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(4)?;
            let stage: String = row.get(5)?;
            Ok(CanonicalInitiative {
                id: row.get(0)?,
                title: row.get(1)?,
                owner_id: row.get(2)?,
                owner_name: row.get(3)?,
                status: parse_status(&status)?,
                stage: parse_stage(&stage)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    /// Audit history is append-only; every call writes a new row.
    pub fn insert_audit_event(&self, event: &CanonicalAuditEvent, provenance: Provenance<'_>) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO canonical_audit_events (
               id, user_id, user_name, user_role, action, operation, entity_id,
               before_state, after_state, source, source_id, migrated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id,
                event.user_id,
                event.user_name,
                event.user_role,
                event.action,
                event.operation,
                event.entity_id,
                event.before_state,
                event.after_state,
                provenance.source.as_str(),
                provenance.source_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    pub fn list_audit_events(&self) -> AppResult<Vec<CanonicalAuditEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, user_name, user_role, action, operation, entity_id, before_state, after_state
             FROM canonical_audit_events
             ORDER BY migrated_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CanonicalAuditEvent {
                user_id: row.get(0)?,
                user_name: row.get(1)?,
                user_role: row.get(2)?,
                action: row.get(3)?,
                operation: row.get(4)?,
                entity_id: row.get(5)?,
                before_state: row.get(6)?,
                after_state: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn count_users(&self) -> AppResult<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(1) FROM canonical_users", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<CanonicalUser> {
    Ok(CanonicalUser {
        id: row.get(0)?,
        display_name: row.get(1)?,
        department: row.get(2)?,
        locale: row.get(3)?,
    })
}

fn parse_stage(raw: &str) -> rusqlite::Result<Stage> {
    Stage::ALL
        .into_iter()
        .find(|stage| stage.as_str() == raw)
        .ok_or_else(|| invalid_text(format!("invalid stage value: {raw}")))
}

fn parse_status(raw: &str) -> rusqlite::Result<Status> {
    Status::ALL
        .into_iter()
        .find(|status| status.as_str() == raw)
        .ok_or_else(|| invalid_text(format!("invalid status value: {raw}")))
}

fn invalid_text(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

#[cfg(test)]
mod tests {
    use super::{stable_user_id, Database, Provenance, UserWrite};
    use crate::models::{CanonicalAuditEvent, CanonicalInitiative, CanonicalUser, SourceKind, Stage, Status};

    fn user(id: &str, name: &str) -> CanonicalUser {
        CanonicalUser {
            id: id.to_string(),
            display_name: name.to_string(),
            department: "unassigned".to_string(),
            locale: "ar".to_string(),
        }
    }

    fn provenance(source_id: &str) -> Provenance<'_> {
        Provenance {
            source: SourceKind::Relational,
            source_id,
        }
    }

    #[test]
    fn derived_user_ids_are_stable_and_prefer_given_ids() {
        assert_eq!(stable_user_id(Some(" u-42 "), "Dr. A"), "u-42");
        let derived = stable_user_id(None, "Dr. A");
        assert!(derived.starts_with("user-"));
        assert_eq!(derived, stable_user_id(Some(""), "  dr.  a"));
        assert_ne!(derived, stable_user_id(None, "Dr. B"));
    }

    #[test]
    fn ensure_user_is_insert_if_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("canonical.db")).expect("db");

        assert!(db.ensure_user(&user("u-1", "First")).expect("first ensure"));
        assert!(!db.ensure_user(&user("u-1", "Renamed")).expect("second ensure"));
        let stored = db.get_user("u-1").expect("get").expect("exists");
        assert_eq!(stored.display_name, "First");
        assert_eq!(db.count_users().expect("count"), 1);
    }

    #[test]
    fn upsert_user_reports_insert_update_and_no_op() {
        let db = Database::open_in_memory().expect("db");
        assert_eq!(db.upsert_user(&user("u-1", "First")).expect("insert"), UserWrite::Inserted);
        assert_eq!(db.upsert_user(&user("u-1", "First")).expect("same"), UserWrite::Unchanged);
        let mut moved = user("u-1", "First");
        moved.department = "radiology".to_string();
        assert_eq!(db.upsert_user(&moved).expect("update"), UserWrite::Updated);
        assert_eq!(db.get_user("u-1").expect("get").expect("exists").department, "radiology");
    }

    #[test]
    fn fingerprint_conflict_is_not_inserted_twice() {
        let db = Database::open_in_memory().expect("db");
        db.ensure_user(&user("u-1", "Dr. A")).expect("owner");
        let initiative = CanonicalInitiative {
            id: "i-1".to_string(),
            title: "Reduce Wait Time".to_string(),
            owner_id: "u-1".to_string(),
            owner_name: "Dr. A".to_string(),
            status: Status::Draft,
            stage: Stage::IdeaSubmission,
        };
        assert!(db.insert_initiative(&initiative, "fp-1", None, provenance("1")).expect("insert"));

        let mut again = initiative.clone();
        again.id = "i-2".to_string();
        assert!(!db.insert_initiative(&again, "fp-1", None, provenance("2")).expect("conflict"));

        let rows = db.list_initiatives().expect("list");
        assert_eq!(rows, vec![initiative]);
    }

    #[test]
    fn audit_events_require_a_known_user_and_are_never_merged() {
        let db = Database::open_in_memory().expect("db");
        let event = CanonicalAuditEvent {
            user_id: Some("ghost".to_string()),
            user_name: None,
            user_role: None,
            action: "update".to_string(),
            operation: "initiative.status".to_string(),
            entity_id: Some("7".to_string()),
            before_state: None,
            after_state: None,
        };
        assert!(db.insert_audit_event(&event, provenance("a-1")).is_err());

        db.ensure_user(&user("ghost", "Ghost")).expect("ensure");
        db.insert_audit_event(&event, provenance("a-1")).expect("first");
        db.insert_audit_event(&event, provenance("a-1")).expect("second");
        assert_eq!(db.list_audit_events().expect("list").len(), 2);
    }
}
