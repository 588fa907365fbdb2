use super::SourceBatch;
use crate::errors::{AppError, AppResult};
use crate::models::{RelationalAudit, RelationalInitiative, SourceKind, SourceRecord};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

const INITIATIVE_TABLES: &[&str] = &["initiatives", "legacy_initiatives"];
const SCORE_TABLES: &[&str] = &["initiative_scores", "scores"];
const AUDIT_TABLES: &[&str] = &["audit_logs", "audit_log"];

const INITIATIVE_COLUMNS: &[&[&str]] = &[
    &["id", "initiative_id"],
    &["title", "name"],
    &["owner_name", "owner", "submitted_by"],
    &["owner_id", "user_id"],
    &["status"],
    &["stage", "phase"],
    &["created_at", "created", "submitted_at"],
];

const AUDIT_COLUMNS: &[&[&str]] = &[
    &["id", "log_id"],
    &["user_id"],
    &["user_name", "username"],
    &["user_role", "role"],
    &["action"],
    &["operation", "op"],
    &["entity_id", "initiative_id"],
    &["before_state", "old_value"],
    &["after_state", "new_value"],
];

/// Reads initiatives, then audit rows, from the legacy store. Never fails:
/// an unreadable store or table contributes nothing.
pub fn read(path: Option<&Path>) -> SourceBatch {
    let kind = SourceKind::Relational;
    let Some(path) = path else {
        tracing::info!(source = kind.as_str(), "no legacy database configured");
        return SourceBatch::unavailable(kind);
    };

    let conn = match Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(conn) => conn,
        Err(error) => {
            tracing::info!(source = kind.as_str(), path = %path.to_string_lossy(), error = %error, "legacy database unavailable");
            return SourceBatch::unavailable(kind);
        }
    };

    let initiatives = fail_soft("initiatives", read_initiatives(&conn));
    let scores = fail_soft("scores", count_scores(&conn));
    let audits = fail_soft("audit logs", read_audits(&conn));

    let available = initiatives.is_some() || scores.is_some() || audits.is_some();
    let mut records: Vec<SourceRecord> = initiatives
        .unwrap_or_default()
        .into_iter()
        .map(SourceRecord::RelationalInitiative)
        .collect();
    records.extend(audits.unwrap_or_default().into_iter().map(SourceRecord::RelationalAudit));

    SourceBatch {
        kind,
        available,
        records,
        rejected: Vec::new(),
        scores: scores.unwrap_or_default(),
    }
}

fn fail_soft<T>(what: &str, result: AppResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(source = "relational", table = what, error = %error, "legacy query failed; treating as empty");
            None
        }
    }
}

fn read_initiatives(conn: &Connection) -> AppResult<Vec<RelationalInitiative>> {
    let (table, sql) = build_select(conn, INITIATIVE_TABLES, INITIATIVE_COLUMNS)?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(RelationalInitiative {
            id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            title: row.get(1)?,
            owner_name: row.get(2)?,
            owner_id: row.get(3)?,
            status: row.get(4)?,
            stage: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;
    let rows = rows.collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(table = %table, count = rows.len(), "read legacy initiatives");
    Ok(rows)
}

fn read_audits(conn: &Connection) -> AppResult<Vec<RelationalAudit>> {
    let (table, sql) = build_select(conn, AUDIT_TABLES, AUDIT_COLUMNS)?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(RelationalAudit {
            id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            user_id: row.get(1)?,
            user_name: row.get(2)?,
            user_role: row.get(3)?,
            action: row.get(4)?,
            operation: row.get(5)?,
            entity_id: row.get(6)?,
            before_state: row.get(7)?,
            after_state: row.get(8)?,
        })
    })?;
    let rows = rows.collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(table = %table, count = rows.len(), "read legacy audit rows");
    Ok(rows)
}

fn count_scores(conn: &Connection) -> AppResult<usize> {
    let table = find_table(conn, SCORE_TABLES)?;
    let count: i64 = conn.query_row(&format!("SELECT COUNT(1) FROM {}", quote(&table)), [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// Builds a `SELECT` that yields every field as text in `fields` order.
/// Fields with no matching column read as NULL; a missing id falls back to rowid.
fn build_select(conn: &Connection, tables: &[&str], fields: &[&[&str]]) -> AppResult<(String, String)> {
    let table = find_table(conn, tables)?;
    let columns = table_columns(conn, &table)?;
    let projections = fields
        .iter()
        .enumerate()
        .map(|(position, candidates)| {
            let found = candidates
                .iter()
                .find(|candidate| columns.iter().any(|column| column.eq_ignore_ascii_case(candidate)));
            match (found, position) {
                (Some(column), _) => format!("CAST({} AS TEXT)", quote(column)),
                (None, 0) => "CAST(rowid AS TEXT)".to_string(),
                (None, _) => "NULL".to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {} FROM {} ORDER BY rowid ASC", projections, quote(&table));
    Ok((table, sql))
}

fn find_table(conn: &Connection, candidates: &[&str]) -> AppResult<String> {
    for candidate in candidates {
        if !table_columns(conn, candidate)?.is_empty() {
            return Ok((*candidate).to_string());
        }
    }
    Err(AppError::SourceUnavailable(format!(
        "none of the tables [{}] exist",
        candidates.join(", ")
    )))
}

fn table_columns(conn: &Connection, table: &str) -> AppResult<Vec<String>> {
    let pragma = format!("PRAGMA table_info({})", quote(table));
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        columns.push(name);
    }
    Ok(columns)
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::read;
    use crate::models::SourceRecord;
    use rusqlite::Connection;

    #[test]
    fn missing_database_is_an_empty_unavailable_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let batch = read(Some(&dir.path().join("absent.db")));
        assert!(!batch.available);
        assert!(batch.records.is_empty());

        let unset = read(None);
        assert!(!unset.available);
    }

    #[test]
    fn discovers_alternate_column_names_and_missing_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("legacy.db");
        let conn = Connection::open(&path).expect("open");
        conn.execute_batch(
            "CREATE TABLE initiatives (initiative_id INTEGER, name TEXT, owner TEXT, status TEXT, phase TEXT, created TEXT);
             INSERT INTO initiatives VALUES (5, 'Reduce Wait Time', 'Dr. A', 'مسودة', 'الفكرة', '2024-03-01');
             CREATE TABLE initiative_scores (id INTEGER, initiative_id INTEGER, score REAL);
             INSERT INTO initiative_scores VALUES (1, 5, 4.5), (2, 5, 3.0);",
        )
        .expect("seed");
        drop(conn);

        let batch = read(Some(&path));
        assert!(batch.available);
        assert_eq!(batch.scores, 2);
        assert_eq!(batch.records.len(), 1);
        let SourceRecord::RelationalInitiative(row) = &batch.records[0] else {
            panic!("expected initiative row");
        };
        assert_eq!(row.id, "5");
        assert_eq!(row.title.as_deref(), Some("Reduce Wait Time"));
        assert_eq!(row.owner_name.as_deref(), Some("Dr. A"));
        assert_eq!(row.owner_id, None);
        assert_eq!(row.stage.as_deref(), Some("الفكرة"));
        assert_eq!(row.created_at.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn audit_rows_follow_initiatives_and_use_rowid_without_an_id_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("legacy.db");
        let conn = Connection::open(&path).expect("open");
        conn.execute_batch(
            "CREATE TABLE audit_logs (user_id TEXT, action TEXT, operation TEXT, entity_id INTEGER);
             INSERT INTO audit_logs VALUES ('u-1', 'update', 'initiative.stage', 5);",
        )
        .expect("seed");
        drop(conn);

        let batch = read(Some(&path));
        assert!(batch.available);
        assert_eq!(batch.initiative_count(), 0);
        assert_eq!(batch.audit_count(), 1);
        let SourceRecord::RelationalAudit(row) = &batch.records[0] else {
            panic!("expected audit row");
        };
        assert_eq!(row.id, "1");
        assert_eq!(row.entity_id.as_deref(), Some("5"));
        assert_eq!(row.user_name, None);
    }
}
