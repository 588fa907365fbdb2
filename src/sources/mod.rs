pub mod flat_files;
pub mod relational;

use crate::models::{
    value_to_id, value_to_state, value_to_text, JsonAudit, JsonInitiative, RawAudit, RawRecord, RelationalAudit,
    RelationalInitiative, SourceKind, SourceRecord,
};

/// Records pulled from one origin, in source order.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub kind: SourceKind,
    /// `false` when the origin could not be read at all.
    pub available: bool,
    pub records: Vec<SourceRecord>,
    /// Items present in the origin that did not decode into any record shape.
    pub rejected: Vec<RejectedItem>,
    pub scores: usize,
}

impl SourceBatch {
    pub fn unavailable(kind: SourceKind) -> Self {
        Self {
            kind,
            available: false,
            records: Vec::new(),
            rejected: Vec::new(),
            scores: 0,
        }
    }

    pub fn initiative_count(&self) -> usize {
        self.records.iter().filter(|record| record.is_initiative()).count()
            + self.rejected.iter().filter(|item| item.initiative_shaped).count()
    }

    pub fn audit_count(&self) -> usize {
        self.records.iter().filter(|record| !record.is_initiative()).count()
            + self.rejected.iter().filter(|item| !item.initiative_shaped).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedItem {
    pub source_id: String,
    pub initiative_shaped: bool,
    pub message: String,
}

/// A source record converted into the shape the pipeline consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Initiative(RawRecord),
    Audit(RawAudit),
}

pub fn normalize(kind: SourceKind, record: SourceRecord) -> Candidate {
    match record {
        SourceRecord::RelationalInitiative(row) => Candidate::Initiative(from_relational_initiative(kind, row)),
        SourceRecord::RelationalAudit(row) => Candidate::Audit(from_relational_audit(kind, row)),
        SourceRecord::JsonInitiative { index, record } => {
            Candidate::Initiative(from_json_initiative(kind, index, record))
        }
        SourceRecord::JsonAudit { index, record } => Candidate::Audit(from_json_audit(kind, index, record)),
    }
}

fn from_relational_initiative(kind: SourceKind, row: RelationalInitiative) -> RawRecord {
    RawRecord {
        source_kind: kind,
        source_id: row.id,
        title: non_blank(row.title),
        owner_name: non_blank(row.owner_name),
        owner_id: non_blank(row.owner_id),
        status: non_blank(row.status),
        stage: non_blank(row.stage),
        created_at: non_blank(row.created_at),
    }
}

fn from_relational_audit(kind: SourceKind, row: RelationalAudit) -> RawAudit {
    RawAudit {
        source_kind: kind,
        source_id: row.id,
        user_id: non_blank(row.user_id),
        user_name: non_blank(row.user_name),
        user_role: non_blank(row.user_role),
        action: non_blank(row.action).unwrap_or_else(|| "unknown".to_string()),
        operation: non_blank(row.operation).unwrap_or_else(|| "unknown".to_string()),
        entity_id: non_blank(row.entity_id),
        before_state: row.before_state,
        after_state: row.after_state,
    }
}

// The camelCase key wins when a record carries both spellings.
fn from_json_initiative(kind: SourceKind, index: usize, record: JsonInitiative) -> RawRecord {
    RawRecord {
        source_kind: kind,
        source_id: value_to_id(record.id.as_ref()).unwrap_or_else(|| positional_id(index)),
        title: value_to_text(record.title.as_ref()).or_else(|| value_to_text(record.name.as_ref())),
        owner_name: value_to_text(record.owner_name.as_ref()).or_else(|| value_to_text(record.owner.as_ref())),
        owner_id: value_to_id(record.owner_id.as_ref()),
        status: value_to_text(record.status.as_ref()),
        stage: value_to_text(record.stage.as_ref()),
        created_at: value_to_text(record.created_at.as_ref()).or_else(|| value_to_text(record.created.as_ref())),
    }
}

fn from_json_audit(kind: SourceKind, index: usize, record: JsonAudit) -> RawAudit {
    RawAudit {
        source_kind: kind,
        source_id: value_to_id(record.id.as_ref()).unwrap_or_else(|| positional_id(index)),
        user_id: value_to_id(record.user_id.as_ref()),
        user_name: value_to_text(record.user_name.as_ref()),
        user_role: value_to_text(record.user_role.as_ref()),
        action: value_to_text(record.action.as_ref()).unwrap_or_else(|| "unknown".to_string()),
        operation: value_to_text(record.operation.as_ref()).unwrap_or_else(|| "unknown".to_string()),
        entity_id: value_to_id(record.entity_id.as_ref()),
        before_state: value_to_state(record.before_state.as_ref()),
        after_state: value_to_state(record.after_state.as_ref()),
    }
}

pub(crate) fn positional_id(index: usize) -> String {
    format!("#{index}")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
