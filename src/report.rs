use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MAX_NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    pub source: String,
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FallbackTally {
    pub stage: usize,
    pub status: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub available: bool,
    pub initiatives: usize,
    pub audit_events: usize,
    pub scores: usize,
    pub employees: usize,
    pub entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub skipped_existing: usize,
    pub users_created: usize,
    pub audit_events: usize,
    pub unlinked_audit_events: usize,
    pub fallbacks: FallbackTally,
    pub errors: Vec<RecordError>,
    pub sources: BTreeMap<String, SourceSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    Initialized,
    Accumulating,
}

/// Counter accumulator for one run. `finalize` consumes the reporter, so a
/// finalized report can no longer change.
#[derive(Debug)]
pub struct RunReporter {
    state: ReporterState,
    started_at: DateTime<Utc>,
    dry_run: bool,
    inserted: usize,
    updated: usize,
    skipped: usize,
    skipped_existing: usize,
    users_created: usize,
    audit_events: usize,
    audit_events_with_entity: usize,
    fallbacks: FallbackTally,
    errors: Vec<RecordError>,
    sources: BTreeMap<String, SourceSummary>,
}

impl RunReporter {
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            state: ReporterState::Initialized,
            started_at,
            dry_run,
            inserted: 0,
            updated: 0,
            skipped: 0,
            skipped_existing: 0,
            users_created: 0,
            audit_events: 0,
            audit_events_with_entity: 0,
            fallbacks: FallbackTally::default(),
            errors: Vec::new(),
            sources: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> ReporterState {
        self.state
    }

    fn touch(&mut self) {
        self.state = ReporterState::Accumulating;
    }

    pub fn record_source(&mut self, name: &str, summary: SourceSummary) {
        self.touch();
        self.sources.insert(name.to_string(), summary);
    }

    pub fn record_inserted(&mut self) {
        self.touch();
        self.inserted += 1;
    }

    /// `existing` marks a fingerprint already persisted by an earlier run.
    pub fn record_skipped(&mut self, existing: bool) {
        self.touch();
        self.skipped += 1;
        if existing {
            self.skipped_existing += 1;
        }
    }

    pub fn record_user_updated(&mut self) {
        self.touch();
        self.updated += 1;
    }

    pub fn record_user_created(&mut self) {
        self.touch();
        self.users_created += 1;
    }

    pub fn record_fallbacks(&mut self, stage: bool, status: bool) {
        self.touch();
        self.fallbacks.stage += usize::from(stage);
        self.fallbacks.status += usize::from(status);
    }

    pub fn record_audit_event(&mut self, has_entity: bool) {
        self.touch();
        self.audit_events += 1;
        if has_entity {
            self.audit_events_with_entity += 1;
        }
    }

    pub fn record_error(&mut self, source: &str, id: &str, message: impl Into<String>) {
        self.touch();
        self.errors.push(RecordError {
            source: source.to_string(),
            id: id.to_string(),
            message: message.into(),
        });
    }

    /// An audit `entityId` can only be stale relative to initiatives that
    /// this run wrote under new ids; with none written nothing is unlinked.
    pub fn finalize(self, finished_at: DateTime<Utc>) -> RunReport {
        RunReport {
            started_at: self.started_at,
            finished_at,
            dry_run: self.dry_run,
            inserted: self.inserted,
            updated: self.updated,
            skipped: self.skipped,
            skipped_existing: self.skipped_existing,
            users_created: self.users_created,
            audit_events: self.audit_events,
            unlinked_audit_events: if self.inserted > 0 {
                self.audit_events_with_entity
            } else {
                0
            },
            fallbacks: self.fallbacks,
            errors: self.errors,
            sources: self.sources,
        }
    }
}

/// Writes the report to `<dir>/reconcile-<start>.json`. The file is opened
/// create-new; on a name clash a short random suffix is added instead of
/// overwriting.
pub fn write_report(report: &RunReport, dir: &Path) -> AppResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|error| AppError::Io(error.to_string()))?;
    let stem = format!(
        "reconcile-{}-{}",
        report.started_at.format("%Y%m%d"),
        report.started_at.format("%H%M%S")
    );
    let bytes = serde_json::to_vec_pretty(report)?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.json")
        } else {
            let short = Uuid::new_v4().simple().to_string();
            format!("{}-{}.json", stem, &short[..4])
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(&bytes).map_err(|error| AppError::Io(error.to_string()))?;
                file.sync_all().map_err(|error| AppError::Io(error.to_string()))?;
                return Ok(path);
            }
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(error) => return Err(AppError::Io(error.to_string())),
        }
    }
    Err(AppError::Io(format!(
        "could not find a free report name for {} in {}",
        stem,
        dir.to_string_lossy()
    )))
}
