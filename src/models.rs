use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Relational,
    MockData,
    ClientState,
}

impl SourceKind {
    /// Fixed processing order: authoritative relational rows first.
    pub const PRIORITY: [SourceKind; 3] = [Self::Relational, Self::MockData, Self::ClientState];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::MockData => "mock-data",
            Self::ClientState => "client-state",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IdeaSubmission,
    InitialReview,
    Evaluation,
    Prototyping,
    Pilot,
    Implementation,
    Scaling,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Self::IdeaSubmission,
        Self::InitialReview,
        Self::Evaluation,
        Self::Prototyping,
        Self::Pilot,
        Self::Implementation,
        Self::Scaling,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdeaSubmission => "idea_submission",
            Self::InitialReview => "initial_review",
            Self::Evaluation => "evaluation",
            Self::Prototyping => "prototyping",
            Self::Pilot => "pilot",
            Self::Implementation => "implementation",
            Self::Scaling => "scaling",
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::IdeaSubmission
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    InProgress,
    Completed,
    OnHold,
    Archived,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Self::Draft,
        Self::Submitted,
        Self::UnderReview,
        Self::Approved,
        Self::Rejected,
        Self::InProgress,
        Self::Completed,
        Self::OnHold,
        Self::Archived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::OnHold => "on_hold",
            Self::Archived => "archived",
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::Draft
    }
}

/// Initiative row as read from the legacy relational store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationalInitiative {
    pub id: String,
    pub title: Option<String>,
    pub owner_name: Option<String>,
    pub owner_id: Option<String>,
    pub status: Option<String>,
    pub stage: Option<String>,
    pub created_at: Option<String>,
}

/// Audit row as read from the legacy relational store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationalAudit {
    pub id: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_role: Option<String>,
    pub action: Option<String>,
    pub operation: Option<String>,
    pub entity_id: Option<String>,
    pub before_state: Option<String>,
    pub after_state: Option<String>,
}

/// Initiative object from a flat JSON export or the client-state snapshot.
///
/// Each spelling of a key (`ownerName` / `owner`) decodes into its own field;
/// exports may carry both. Scalars are untyped: snapshots hold epoch millis
/// and plain numbers where text is expected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JsonInitiative {
    pub id: Option<Value>,
    pub title: Option<Value>,
    pub name: Option<Value>,
    pub owner_name: Option<Value>,
    pub owner: Option<Value>,
    pub owner_id: Option<Value>,
    pub status: Option<Value>,
    pub stage: Option<Value>,
    pub created_at: Option<Value>,
    pub created: Option<Value>,
}

/// Audit object from a flat JSON export or the client-state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JsonAudit {
    pub id: Option<Value>,
    pub user_id: Option<Value>,
    pub user_name: Option<Value>,
    pub user_role: Option<Value>,
    pub action: Option<Value>,
    pub operation: Option<Value>,
    pub entity_id: Option<Value>,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    RelationalInitiative(RelationalInitiative),
    RelationalAudit(RelationalAudit),
    JsonInitiative { index: usize, record: JsonInitiative },
    JsonAudit { index: usize, record: JsonAudit },
}

impl SourceRecord {
    pub fn is_initiative(&self) -> bool {
        matches!(self, Self::RelationalInitiative(_) | Self::JsonInitiative { .. })
    }
}

/// Source-tagged, loosely shaped initiative candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub title: Option<String>,
    pub owner_name: Option<String>,
    pub owner_id: Option<String>,
    pub status: Option<String>,
    pub stage: Option<String>,
    pub created_at: Option<String>,
}

/// Source-tagged audit candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudit {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_role: Option<String>,
    pub action: String,
    pub operation: String,
    pub entity_id: Option<String>,
    pub before_state: Option<String>,
    pub after_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalUser {
    pub id: String,
    pub display_name: String,
    pub department: String,
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalInitiative {
    pub id: String,
    pub title: String,
    pub owner_id: String,
    pub owner_name: String,
    pub status: Status,
    pub stage: Stage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalAuditEvent {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_role: Option<String>,
    pub action: String,
    pub operation: String,
    pub entity_id: Option<String>,
    pub before_state: Option<String>,
    pub after_state: Option<String>,
}

/// Entry from the mock employee directory.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmployeeRecord {
    pub id: Option<Value>,
    pub name: Option<Value>,
    pub display_name: Option<Value>,
    pub department: Option<Value>,
    pub locale: Option<Value>,
}

impl EmployeeRecord {
    pub fn resolved_name(&self) -> Option<String> {
        value_to_text(self.name.as_ref()).or_else(|| value_to_text(self.display_name.as_ref()))
    }
}

/// Renders a loosely typed JSON id (number or string) as text.
pub fn value_to_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Renders a loosely typed scalar (string, number or boolean) as trimmed,
/// non-empty text.
pub fn value_to_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Bool(flag) => Some(flag.to_string()),
        other => value_to_id(Some(other)),
    }
}

/// Serializes a before/after state payload for storage; strings pass through.
pub fn value_to_state(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
