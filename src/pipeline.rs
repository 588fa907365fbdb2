use crate::canonical::{resolve_stage, resolve_status};
use crate::config::{ReconcileConfig, EMPLOYEES_FILE, MOCK_DATA_FILE, POLICY_FILE, RUBRIC_FILE};
use crate::db::{Database, UserWrite};
use crate::fingerprint::{fingerprint, FingerprintSet};
use crate::models::{value_to_id, RawAudit, RawRecord, SourceKind};
use crate::report::{RunReport, RunReporter, SourceSummary};
use crate::sources::flat_files::{self, EmployeeDirectory};
use crate::sources::{normalize, relational, Candidate, SourceBatch};
use crate::writer::{InitiativeOutcome, PreparedInitiative, UpsertWriter, UserDefaults};
use chrono::{DateTime, Utc};

/// State owned by a single run: the fingerprints written so far and the
/// report counters. A new run starts from a fresh context.
#[derive(Debug)]
pub struct RunContext {
    pub seen: FingerprintSet,
    pub reporter: RunReporter,
}

impl RunContext {
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            seen: FingerprintSet::new(),
            reporter: RunReporter::new(started_at, dry_run),
        }
    }

    pub fn finish(self) -> RunReport {
        self.reporter.finalize(Utc::now())
    }
}

/// Reads every origin in priority order and pushes each record through
/// canonicalize, fingerprint and upsert before moving to the next.
pub fn run_pipeline(config: &ReconcileConfig, db: &Database, ctx: &mut RunContext) {
    let writer = UpsertWriter::new(
        db,
        UserDefaults {
            locale: config.default_locale.clone(),
            department: config.default_department.clone(),
        },
    );

    for kind in SourceKind::PRIORITY {
        match kind {
            SourceKind::Relational => {
                let batch = relational::read(config.legacy_db.as_deref());
                process_batch(&writer, ctx, batch);
            }
            SourceKind::MockData => {
                let directory = flat_files::read_employees(&config.data_file(EMPLOYEES_FILE));
                seed_employees(&writer, ctx, directory);
                for (name, file) in [("policy", POLICY_FILE), ("rubric", RUBRIC_FILE)] {
                    let document = flat_files::read_document(&config.data_file(file));
                    ctx.reporter.record_source(
                        name,
                        SourceSummary {
                            available: document.available,
                            entries: document.entries(),
                            ..SourceSummary::default()
                        },
                    );
                }
                let batch = flat_files::read_export(kind, &config.data_file(MOCK_DATA_FILE));
                process_batch(&writer, ctx, batch);
            }
            SourceKind::ClientState => {
                let batch = flat_files::read_export(kind, &config.client_state_path());
                process_batch(&writer, ctx, batch);
            }
        }
    }
}

pub fn process_batch(writer: &UpsertWriter<'_>, ctx: &mut RunContext, batch: SourceBatch) {
    let source = batch.kind.as_str();
    ctx.reporter.record_source(
        source,
        SourceSummary {
            available: batch.available,
            initiatives: batch.initiative_count(),
            audit_events: batch.audit_count(),
            scores: batch.scores,
            ..SourceSummary::default()
        },
    );
    tracing::info!(
        source,
        available = batch.available,
        initiatives = batch.initiative_count(),
        audit_events = batch.audit_count(),
        "processing source"
    );

    for item in &batch.rejected {
        tracing::warn!(source, id = %item.source_id, error = %item.message, "rejected malformed record");
        ctx.reporter.record_error(source, &item.source_id, item.message.clone());
        if item.initiative_shaped {
            ctx.reporter.record_skipped(false);
        }
    }

    for record in batch.records {
        match normalize(batch.kind, record) {
            Candidate::Initiative(raw) => process_initiative(writer, ctx, raw),
            Candidate::Audit(audit) => process_audit(writer, ctx, audit),
        }
    }
}

fn process_initiative(writer: &UpsertWriter<'_>, ctx: &mut RunContext, raw: RawRecord) {
    let stage = resolve_stage(raw.stage.as_deref());
    let status = resolve_status(raw.status.as_deref());
    ctx.reporter.record_fallbacks(stage.fallback, status.fallback);
    if stage.fallback || status.fallback {
        tracing::debug!(
            source = raw.source_kind.as_str(),
            id = %raw.source_id,
            raw_stage = ?raw.stage,
            raw_status = ?raw.status,
            "applied default stage/status"
        );
    }

    let prepared = PreparedInitiative {
        fingerprint: fingerprint(&raw),
        stage,
        status,
        raw,
    };

    match writer.upsert_initiative(&mut ctx.seen, &prepared) {
        Ok(outcome) => {
            if let InitiativeOutcome::Inserted { owner_created: true, .. }
            | InitiativeOutcome::AlreadyStored { owner_created: true } = outcome
            {
                ctx.reporter.record_user_created();
            }
            match outcome {
                InitiativeOutcome::Inserted { .. } => ctx.reporter.record_inserted(),
                InitiativeOutcome::DuplicateInRun => ctx.reporter.record_skipped(false),
                InitiativeOutcome::AlreadyStored { .. } => ctx.reporter.record_skipped(true),
            }
        }
        Err(error) => {
            let source = prepared.raw.source_kind.as_str();
            tracing::warn!(source, id = %prepared.raw.source_id, error = %error, "initiative write failed");
            ctx.reporter.record_error(source, &prepared.raw.source_id, error.to_string());
            ctx.reporter.record_skipped(false);
        }
    }
}

fn process_audit(writer: &UpsertWriter<'_>, ctx: &mut RunContext, audit: RawAudit) {
    match writer.write_audit(&audit) {
        Ok(outcome) => {
            if outcome.user_created {
                ctx.reporter.record_user_created();
            }
            ctx.reporter.record_audit_event(audit.entity_id.is_some());
        }
        Err(error) => {
            let source = audit.source_kind.as_str();
            tracing::warn!(source, id = %audit.source_id, error = %error, "audit write failed");
            ctx.reporter.record_error(source, &audit.source_id, error.to_string());
        }
    }
}

fn seed_employees(writer: &UpsertWriter<'_>, ctx: &mut RunContext, directory: EmployeeDirectory) {
    ctx.reporter.record_source(
        "employees",
        SourceSummary {
            available: directory.available,
            employees: directory.employees.len() + directory.rejected,
            ..SourceSummary::default()
        },
    );

    for (index, employee) in directory.employees.iter().enumerate() {
        match writer.upsert_employee(employee) {
            Ok(UserWrite::Inserted) => ctx.reporter.record_user_created(),
            Ok(UserWrite::Updated) => ctx.reporter.record_user_updated(),
            Ok(UserWrite::Unchanged) => {}
            Err(error) => {
                let id = value_to_id(employee.id.as_ref()).unwrap_or_else(|| format!("#{index}"));
                tracing::warn!(source = "employees", id = %id, error = %error, "employee upsert failed");
                ctx.reporter.record_error("employees", &id, error.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{process_batch, RunContext};
    use crate::db::Database;
    use crate::models::{JsonInitiative, RelationalInitiative, SourceKind, SourceRecord};
    use crate::sources::{RejectedItem, SourceBatch};
    use crate::writer::{UpsertWriter, UserDefaults};
    use chrono::Utc;
    use serde_json::json;

    fn writer(db: &Database) -> UpsertWriter<'_> {
        UpsertWriter::new(
            db,
            UserDefaults {
                locale: "ar".to_string(),
                department: "unassigned".to_string(),
            },
        )
    }

    #[test]
    fn inserted_plus_skipped_covers_every_candidate() {
        let db = Database::open_in_memory().expect("db");
        let writer = writer(&db);
        let mut ctx = RunContext::new(Utc::now(), false);

        process_batch(
            &writer,
            &mut ctx,
            SourceBatch {
                kind: SourceKind::Relational,
                available: true,
                records: vec![SourceRecord::RelationalInitiative(RelationalInitiative {
                    id: "1".to_string(),
                    title: Some("Reduce Wait Time".to_string()),
                    owner_name: Some("Dr. A".to_string()),
                    stage: Some("الفكرة".to_string()),
                    status: Some("مسودة".to_string()),
                    created_at: Some("2024-03-01".to_string()),
                    ..RelationalInitiative::default()
                })],
                rejected: Vec::new(),
                scores: 0,
            },
        );
        process_batch(
            &writer,
            &mut ctx,
            SourceBatch {
                kind: SourceKind::MockData,
                available: true,
                records: vec![
                    SourceRecord::JsonInitiative {
                        index: 0,
                        record: JsonInitiative {
                            title: Some(json!("Reduce Wait Time")),
                            owner_name: Some(json!("Dr. A")),
                            created_at: Some(json!("2024-03-01")),
                            ..JsonInitiative::default()
                        },
                    },
                    SourceRecord::JsonInitiative {
                        index: 1,
                        record: JsonInitiative {
                            title: Some(json!("Smart Queue")),
                            status: Some(json!("unheard of")),
                            ..JsonInitiative::default()
                        },
                    },
                ],
                rejected: vec![RejectedItem {
                    source_id: "#2".to_string(),
                    initiative_shaped: true,
                    message: "expected a JSON object, found number".to_string(),
                }],
                scores: 0,
            },
        );

        let report = ctx.finish();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.inserted + report.skipped, 4);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.fallbacks.status, 2);
        assert_eq!(report.fallbacks.stage, 2);
        assert_eq!(report.sources["mock-data"].initiatives, 3);
    }
}
