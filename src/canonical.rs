use crate::models::{Stage, Status};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const STAGE_LABELS: &[(&str, Stage)] = &[
    ("idea", Stage::IdeaSubmission),
    ("idea submission", Stage::IdeaSubmission),
    ("submission", Stage::IdeaSubmission),
    ("الفكرة", Stage::IdeaSubmission),
    ("فكرة", Stage::IdeaSubmission),
    ("تقديم الفكرة", Stage::IdeaSubmission),
    ("initial review", Stage::InitialReview),
    ("screening", Stage::InitialReview),
    ("review", Stage::InitialReview),
    ("المراجعة الأولية", Stage::InitialReview),
    ("الفرز", Stage::InitialReview),
    ("evaluation", Stage::Evaluation),
    ("assessment", Stage::Evaluation),
    ("التقييم", Stage::Evaluation),
    ("prototype", Stage::Prototyping),
    ("prototyping", Stage::Prototyping),
    ("النموذج الأولي", Stage::Prototyping),
    ("pilot", Stage::Pilot),
    ("pilot testing", Stage::Pilot),
    ("التجربة", Stage::Pilot),
    ("المرحلة التجريبية", Stage::Pilot),
    ("implementation", Stage::Implementation),
    ("execution", Stage::Implementation),
    ("التنفيذ", Stage::Implementation),
    ("التطبيق", Stage::Implementation),
    ("scaling", Stage::Scaling),
    ("scale up", Stage::Scaling),
    ("التوسع", Stage::Scaling),
    ("التعميم", Stage::Scaling),
];

const STATUS_LABELS: &[(&str, Status)] = &[
    ("draft", Status::Draft),
    ("مسودة", Status::Draft),
    ("submitted", Status::Submitted),
    ("new", Status::Submitted),
    ("مقدم", Status::Submitted),
    ("مقدمة", Status::Submitted),
    ("تم التقديم", Status::Submitted),
    ("under review", Status::UnderReview),
    ("in review", Status::UnderReview),
    ("pending", Status::UnderReview),
    ("قيد المراجعة", Status::UnderReview),
    ("قيد التقييم", Status::UnderReview),
    ("approved", Status::Approved),
    ("accepted", Status::Approved),
    ("معتمد", Status::Approved),
    ("معتمدة", Status::Approved),
    ("مقبول", Status::Approved),
    ("تمت الموافقة", Status::Approved),
    ("rejected", Status::Rejected),
    ("declined", Status::Rejected),
    ("مرفوض", Status::Rejected),
    ("مرفوضة", Status::Rejected),
    ("in progress", Status::InProgress),
    ("active", Status::InProgress),
    ("قيد التنفيذ", Status::InProgress),
    ("completed", Status::Completed),
    ("done", Status::Completed),
    ("مكتمل", Status::Completed),
    ("مكتملة", Status::Completed),
    ("on hold", Status::OnHold),
    ("paused", Status::OnHold),
    ("معلق", Status::OnHold),
    ("متوقف", Status::OnHold),
    ("archived", Status::Archived),
    ("مؤرشف", Status::Archived),
];

static STAGE_TABLE: Lazy<HashMap<String, Stage>> = Lazy::new(|| {
    let mut table: HashMap<String, Stage> = STAGE_LABELS
        .iter()
        .map(|(label, stage)| (lookup_key(label), *stage))
        .collect();
    for stage in Stage::ALL {
        table.insert(lookup_key(stage.as_str()), stage);
    }
    table
});

static STATUS_TABLE: Lazy<HashMap<String, Status>> = Lazy::new(|| {
    let mut table: HashMap<String, Status> = STATUS_LABELS
        .iter()
        .map(|(label, status)| (lookup_key(label), *status))
        .collect();
    for status in Status::ALL {
        table.insert(lookup_key(status.as_str()), status);
    }
    table
});

/// Outcome of mapping one raw label. `fallback` is set when the label was
/// missing or unknown and the default value was substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapped<T> {
    pub value: T,
    pub fallback: bool,
}

pub fn resolve_stage(raw: Option<&str>) -> Mapped<Stage> {
    resolve(raw, &STAGE_TABLE)
}

pub fn resolve_status(raw: Option<&str>) -> Mapped<Status> {
    resolve(raw, &STATUS_TABLE)
}

pub fn map_stage(raw: &str) -> Stage {
    resolve_stage(Some(raw)).value
}

pub fn map_status(raw: &str) -> Status {
    resolve_status(Some(raw)).value
}

fn resolve<T: Copy + Default>(raw: Option<&str>, table: &HashMap<String, T>) -> Mapped<T> {
    match raw.map(lookup_key).and_then(|key| table.get(&key).copied()) {
        Some(value) => Mapped { value, fallback: false },
        None => Mapped {
            value: T::default(),
            fallback: true,
        },
    }
}

/// Trims, lowercases and collapses inner whitespace runs to one space.
pub(crate) fn normalize_text(raw: &str) -> String {
    WHITESPACE_RE.replace_all(raw.trim(), " ").to_lowercase()
}

// Underscores and hyphens are spelling variants of a space in legacy labels.
fn lookup_key(raw: &str) -> String {
    normalize_text(&raw.replace(['_', '-'], " "))
}
