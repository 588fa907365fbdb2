use crate::canonical::Mapped;
use crate::db::{stable_user_id, Database, Provenance, UserWrite};
use crate::errors::{AppError, AppResult};
use crate::fingerprint::FingerprintSet;
use crate::models::{
    value_to_id, value_to_text, CanonicalAuditEvent, CanonicalInitiative, CanonicalUser, EmployeeRecord, RawAudit, RawRecord,
    Stage, Status,
};
use uuid::Uuid;

const UNKNOWN_OWNER: &str = "unknown";
const UNTITLED: &str = "untitled";

#[derive(Debug, Clone)]
pub struct UserDefaults {
    pub locale: String,
    pub department: String,
}

/// An initiative candidate after canonicalization and fingerprinting.
#[derive(Debug, Clone)]
pub struct PreparedInitiative {
    pub raw: RawRecord,
    pub stage: Mapped<Stage>,
    pub status: Mapped<Status>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredUser {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiativeOutcome {
    Inserted { id: String, owner_created: bool },
    /// Fingerprint already written earlier in this run.
    DuplicateInRun,
    /// Fingerprint already present in the store from an earlier run.
    AlreadyStored { owner_created: bool },
}

impl InitiativeOutcome {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Inserted { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn skipped(&self) -> bool {
        !matches!(self, Self::Inserted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOutcome {
    pub id: String,
    pub user_created: bool,
}

pub struct UpsertWriter<'a> {
    db: &'a Database,
    defaults: UserDefaults,
}

impl<'a> UpsertWriter<'a> {
    pub fn new(db: &'a Database, defaults: UserDefaults) -> Self {
        Self { db, defaults }
    }

    /// Resolve-or-create. The id is the given one, or derived from the name.
    pub fn ensure_user(&self, id: Option<&str>, name: Option<&str>) -> AppResult<EnsuredUser> {
        let display_name = name
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or_else(|| id.map(str::trim).filter(|value| !value.is_empty()))
            .unwrap_or(UNKNOWN_OWNER);
        let user = CanonicalUser {
            id: stable_user_id(id, display_name),
            display_name: display_name.to_string(),
            department: self.defaults.department.clone(),
            locale: self.defaults.locale.clone(),
        };
        let created = self.db.ensure_user(&user)?;
        if created {
            tracing::debug!(user_id = %user.id, "created canonical user on first reference");
        }
        Ok(EnsuredUser { id: user.id, created })
    }

    /// Writes a new initiative only if its fingerprint is unseen this run and
    /// not already stored. The fingerprint joins `seen` only after a write
    /// attempt resolves, so a failed write does not shadow a later duplicate.
    pub fn upsert_initiative(
        &self,
        seen: &mut FingerprintSet,
        prepared: &PreparedInitiative,
    ) -> AppResult<InitiativeOutcome> {
        if seen.contains(&prepared.fingerprint) {
            return Ok(InitiativeOutcome::DuplicateInRun);
        }

        let raw = &prepared.raw;
        let owner = self.ensure_user(raw.owner_id.as_deref(), raw.owner_name.as_deref())?;
        let owner_name = raw
            .owner_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_OWNER.to_string());
        let initiative = CanonicalInitiative {
            id: Uuid::new_v4().to_string(),
            title: raw.title.clone().unwrap_or_else(|| UNTITLED.to_string()),
            owner_id: owner.id,
            owner_name,
            status: prepared.status.value,
            stage: prepared.stage.value,
        };

        let written = self.db.insert_initiative(
            &initiative,
            &prepared.fingerprint,
            raw.created_at.as_deref(),
            Provenance {
                source: raw.source_kind,
                source_id: &raw.source_id,
            },
        )?;
        seen.insert(prepared.fingerprint.clone());

        if written {
            Ok(InitiativeOutcome::Inserted {
                id: initiative.id,
                owner_created: owner.created,
            })
        } else {
            Ok(InitiativeOutcome::AlreadyStored {
                owner_created: owner.created,
            })
        }
    }

    /// Audit rows are appended as-is. `entity_id` keeps the legacy value and
    /// is not rewritten to ids assigned in this run.
    pub fn write_audit(&self, audit: &RawAudit) -> AppResult<AuditOutcome> {
        let user = if audit.user_id.is_some() || audit.user_name.is_some() {
            Some(self.ensure_user(audit.user_id.as_deref(), audit.user_name.as_deref())?)
        } else {
            None
        };
        let event = CanonicalAuditEvent {
            user_id: user.as_ref().map(|user| user.id.clone()),
            user_name: audit.user_name.clone(),
            user_role: audit.user_role.clone(),
            action: audit.action.clone(),
            operation: audit.operation.clone(),
            entity_id: audit.entity_id.clone(),
            before_state: audit.before_state.clone(),
            after_state: audit.after_state.clone(),
        };
        let id = self.db.insert_audit_event(
            &event,
            Provenance {
                source: audit.source_kind,
                source_id: &audit.source_id,
            },
        )?;
        Ok(AuditOutcome {
            id,
            user_created: user.is_some_and(|user| user.created),
        })
    }

    pub fn upsert_employee(&self, employee: &EmployeeRecord) -> AppResult<UserWrite> {
        let given_id = value_to_id(employee.id.as_ref());
        let name = employee
            .resolved_name()
            .or_else(|| given_id.clone())
            .ok_or_else(|| AppError::Record("employee entry has neither id nor name".to_string()))?;
        let user = CanonicalUser {
            id: stable_user_id(given_id.as_deref(), &name),
            display_name: name,
            department: non_empty_or(value_to_text(employee.department.as_ref()), &self.defaults.department),
            locale: non_empty_or(value_to_text(employee.locale.as_ref()), &self.defaults.locale),
        };
        self.db.upsert_user(&user)
    }
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value.unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::{InitiativeOutcome, PreparedInitiative, UpsertWriter, UserDefaults};
    use crate::canonical::{resolve_stage, resolve_status};
    use crate::db::{Database, UserWrite};
    use crate::fingerprint::{fingerprint, FingerprintSet};
    use crate::models::{EmployeeRecord, RawAudit, RawRecord, SourceKind};
    use serde_json::json;

    fn defaults() -> UserDefaults {
        UserDefaults {
            locale: "ar".to_string(),
            department: "unassigned".to_string(),
        }
    }

    fn prepared(source_kind: SourceKind, owner_id: Option<&str>) -> PreparedInitiative {
        let raw = RawRecord {
            source_kind,
            source_id: "1".to_string(),
            title: Some("Reduce Wait Time".to_string()),
            owner_name: Some("Dr. A".to_string()),
            owner_id: owner_id.map(ToString::to_string),
            status: Some("مسودة".to_string()),
            stage: Some("الفكرة".to_string()),
            created_at: Some("2024-03-01".to_string()),
        };
        PreparedInitiative {
            stage: resolve_stage(raw.stage.as_deref()),
            status: resolve_status(raw.status.as_deref()),
            fingerprint: fingerprint(&raw),
            raw,
        }
    }

    #[test]
    fn second_occurrence_in_a_run_is_skipped() {
        let db = Database::open_in_memory().expect("db");
        let writer = UpsertWriter::new(&db, defaults());
        let mut seen = FingerprintSet::new();

        let first = writer
            .upsert_initiative(&mut seen, &prepared(SourceKind::Relational, None))
            .expect("first");
        assert!(matches!(first, InitiativeOutcome::Inserted { owner_created: true, .. }));
        assert!(first.id().is_some());

        let second = writer
            .upsert_initiative(&mut seen, &prepared(SourceKind::MockData, None))
            .expect("second");
        assert_eq!(second, InitiativeOutcome::DuplicateInRun);
        assert!(second.skipped());
        assert_eq!(db.list_initiatives().expect("list").len(), 1);
    }

    #[test]
    fn fingerprints_stored_by_an_earlier_run_are_not_reinserted() {
        let db = Database::open_in_memory().expect("db");
        let writer = UpsertWriter::new(&db, defaults());
        writer
            .upsert_initiative(&mut FingerprintSet::new(), &prepared(SourceKind::Relational, Some("u-1")))
            .expect("earlier run");

        let outcome = writer
            .upsert_initiative(&mut FingerprintSet::new(), &prepared(SourceKind::Relational, Some("u-1")))
            .expect("later run");
        assert_eq!(outcome, InitiativeOutcome::AlreadyStored { owner_created: false });
    }

    #[test]
    fn audit_for_unknown_user_creates_the_user_first() {
        let db = Database::open_in_memory().expect("db");
        let writer = UpsertWriter::new(&db, defaults());
        let audit = RawAudit {
            source_kind: SourceKind::Relational,
            source_id: "a-1".to_string(),
            user_id: Some("u-77".to_string()),
            user_name: None,
            user_role: Some("judge".to_string()),
            action: "score".to_string(),
            operation: "initiative.score".to_string(),
            entity_id: Some("5".to_string()),
            before_state: None,
            after_state: Some("{\"score\":4}".to_string()),
        };

        let outcome = writer.write_audit(&audit).expect("audit");
        assert!(outcome.user_created);
        let user = db.get_user("u-77").expect("get").expect("created");
        assert_eq!(user.display_name, "u-77");
        assert_eq!(db.list_audit_events().expect("events")[0].entity_id.as_deref(), Some("5"));
    }

    #[test]
    fn employees_refresh_existing_users() {
        let db = Database::open_in_memory().expect("db");
        let writer = UpsertWriter::new(&db, defaults());
        writer.ensure_user(Some("e-1"), Some("Dr. A")).expect("ensure");

        let employee = EmployeeRecord {
            id: Some(json!("e-1")),
            name: Some(json!("Dr. A")),
            department: Some(json!("Emergency")),
            ..EmployeeRecord::default()
        };
        assert_eq!(writer.upsert_employee(&employee).expect("upsert"), UserWrite::Updated);
        let user = db.get_user("e-1").expect("get").expect("exists");
        assert_eq!(user.department, "Emergency");
        assert_eq!(user.locale, "ar");

        assert!(writer.upsert_employee(&EmployeeRecord::default()).is_err());
    }
}
