use super::{positional_id, RejectedItem, SourceBatch};
use crate::models::{value_to_id, EmployeeRecord, JsonAudit, JsonInitiative, SourceKind, SourceRecord};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

const INITIATIVE_KEYS: &[&str] = &["initiatives", "innovationInitiatives"];
const AUDIT_KEYS: &[&str] = &["auditLogs", "auditLog", "audit_logs"];
const EMPLOYEE_KEYS: &[&str] = &["employees", "users"];

/// A JSON document read fail-soft. Missing or malformed files read as an
/// empty object with `available == false`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub available: bool,
    pub value: Value,
}

impl Document {
    fn empty() -> Self {
        Self {
            available: false,
            value: Value::Object(Map::new()),
        }
    }

    /// Number of top-level entries: object keys or array items.
    pub fn entries(&self) -> usize {
        match &self.value {
            Value::Object(map) => map.len(),
            Value::Array(items) => items.len(),
            Value::Null => 0,
            _ => 1,
        }
    }
}

pub fn read_document(path: &Path) -> Document {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.to_string_lossy(), "export file absent");
            return Document::empty();
        }
        Err(error) => {
            tracing::warn!(path = %path.to_string_lossy(), error = %error, "export file unreadable");
            return Document::empty();
        }
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => Document { available: true, value },
        Err(error) => {
            tracing::warn!(path = %path.to_string_lossy(), error = %error, "export file is not valid JSON");
            Document::empty()
        }
    }
}

/// Reads an export containing `initiatives` and audit arrays. Used for both
/// the general mock data and the client-state snapshot.
pub fn read_export(kind: SourceKind, path: &Path) -> SourceBatch {
    let document = read_document(path);
    if !document.available {
        return SourceBatch::unavailable(kind);
    }
    batch_from_document(kind, &document.value)
}

pub fn batch_from_document(kind: SourceKind, document: &Value) -> SourceBatch {
    let mut batch = SourceBatch {
        kind,
        available: true,
        records: Vec::new(),
        rejected: Vec::new(),
        scores: 0,
    };

    for (index, item) in extract_array(document, INITIATIVE_KEYS).into_iter().enumerate() {
        match decode_item::<JsonInitiative>(index, item) {
            Ok(record) => batch.records.push(SourceRecord::JsonInitiative { index, record }),
            Err((source_id, message)) => batch.rejected.push(RejectedItem {
                source_id,
                initiative_shaped: true,
                message,
            }),
        }
    }
    for (index, item) in extract_array(document, AUDIT_KEYS).into_iter().enumerate() {
        match decode_item::<JsonAudit>(index, item) {
            Ok(record) => batch.records.push(SourceRecord::JsonAudit { index, record }),
            Err((source_id, message)) => batch.rejected.push(RejectedItem {
                source_id,
                initiative_shaped: false,
                message,
            }),
        }
    }
    batch
}

#[derive(Debug, Clone, Default)]
pub struct EmployeeDirectory {
    pub available: bool,
    pub employees: Vec<EmployeeRecord>,
    pub rejected: usize,
}

/// Accepts either a bare array or an object wrapping `employees` / `users`.
pub fn read_employees(path: &Path) -> EmployeeDirectory {
    let document = read_document(path);
    if !document.available {
        return EmployeeDirectory::default();
    }
    let items = match &document.value {
        Value::Array(items) => items.clone(),
        other => extract_array(other, EMPLOYEE_KEYS),
    };

    let mut directory = EmployeeDirectory {
        available: true,
        ..EmployeeDirectory::default()
    };
    for item in items {
        match decode::<EmployeeRecord>(item) {
            Ok(employee) => directory.employees.push(employee),
            Err(message) => {
                tracing::warn!(path = %path.to_string_lossy(), error = %message, "skipping malformed employee entry");
                directory.rejected += 1;
            }
        }
    }
    directory
}

// Browser snapshots often hold arrays as JSON-encoded strings.
fn extract_array(document: &Value, keys: &[&str]) -> Vec<Value> {
    for key in keys {
        match document.get(*key) {
            Some(Value::Array(items)) => return items.clone(),
            Some(Value::String(encoded)) => {
                if let Ok(items) = serde_json::from_str::<Vec<Value>>(encoded) {
                    return items;
                }
            }
            _ => {}
        }
    }
    Vec::new()
}

/// Like `decode`, but a failure carries the item's own `id` when it has one,
/// falling back to its position in the array.
fn decode_item<T: DeserializeOwned>(index: usize, item: Value) -> Result<T, (String, String)> {
    let source_id = value_to_id(item.get("id")).unwrap_or_else(|| positional_id(index));
    decode(item).map_err(|message| (source_id, message))
}

fn decode<T: DeserializeOwned>(item: Value) -> Result<T, String> {
    if !item.is_object() {
        return Err(format!("expected a JSON object, found {}", kind_name(&item)));
    }
    serde_json::from_value(item).map_err(|error| error.to_string())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{batch_from_document, decode_item, read_document, read_employees, read_export};
    use crate::models::{value_to_text, SourceKind, SourceRecord};
    use serde_json::json;

    #[test]
    fn missing_and_malformed_files_read_as_empty_objects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = read_document(&dir.path().join("policy.json"));
        assert!(!missing.available);
        assert_eq!(missing.value, json!({}));

        let broken = dir.path().join("rubric.json");
        std::fs::write(&broken, "{ not json").expect("write");
        let malformed = read_document(&broken);
        assert!(!malformed.available);
        assert_eq!(malformed.entries(), 0);

        let batch = read_export(SourceKind::MockData, &dir.path().join("mock-data.json"));
        assert!(!batch.available);
        assert!(batch.records.is_empty());
    }

    #[test]
    fn snapshot_arrays_may_be_json_encoded_strings() {
        let snapshot = json!({
            "initiatives": "[{\"title\":\"Smart Queue\",\"owner\":\"Nurse B\"}]",
            "auditLog": [{"userId": "u-1", "action": "create", "operation": "initiative"}]
        });
        let batch = batch_from_document(SourceKind::ClientState, &snapshot);
        assert_eq!(batch.initiative_count(), 1);
        assert_eq!(batch.audit_count(), 1);
        assert!(matches!(batch.records[0], SourceRecord::JsonInitiative { index: 0, .. }));
    }

    #[test]
    fn non_object_items_are_rejected_not_dropped() {
        let document = json!({ "initiatives": [{"title": "A"}, 42, "b"] });
        let batch = batch_from_document(SourceKind::MockData, &document);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.rejected.len(), 2);
        assert_eq!(batch.rejected[0].source_id, "#1");
        assert!(batch.rejected[0].initiative_shaped);
        assert_eq!(batch.initiative_count(), 3);
    }

    #[test]
    fn rejected_items_keep_their_own_id_when_they_carry_one() {
        #[derive(Debug, serde::Deserialize)]
        struct Strict {
            #[allow(dead_code)]
            score: f64,
        }

        let (source_id, message) =
            decode_item::<Strict>(4, json!({"id": 9, "score": "high"})).expect_err("score is not a number");
        assert_eq!(source_id, "9");
        assert!(message.contains("invalid type"));

        let (source_id, _) = decode_item::<Strict>(5, json!({"score": "high"})).expect_err("no id");
        assert_eq!(source_id, "#5");

        let document = json!({ "auditLogs": [[{"id": "a-5"}], {"id": "a-6", "action": 3}] });
        let batch = batch_from_document(SourceKind::ClientState, &document);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.rejected[0].source_id, "#0");
        assert!(!batch.rejected[0].initiative_shaped);
    }

    #[test]
    fn employees_accept_bare_arrays_and_wrapped_objects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bare = dir.path().join("bare.json");
        std::fs::write(&bare, json!([{"id": 1, "name": "Dr. A", "department": "ER"}]).to_string()).expect("write");
        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(
            &wrapped,
            json!({"employees": [{"id": "e-2", "displayName": "Nurse B"}, null]}).to_string(),
        )
        .expect("write");

        let first = read_employees(&bare);
        assert!(first.available);
        assert_eq!(value_to_text(first.employees[0].department.as_ref()).as_deref(), Some("ER"));

        let second = read_employees(&wrapped);
        assert_eq!(second.employees.len(), 1);
        assert_eq!(second.employees[0].resolved_name().as_deref(), Some("Nurse B"));
        assert_eq!(second.rejected, 1);

        assert!(!read_employees(&dir.path().join("absent.json")).available);
    }
}
