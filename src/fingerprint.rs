use crate::canonical::normalize_text;
use crate::models::RawRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Canonical serialization of the dedup key. Field order is fixed and
/// alphabetical so the digest does not depend on the source layout.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintKey<'a> {
    created_at: &'a str,
    owner_name: &'a str,
    title: &'a str,
}

/// Hex-encoded SHA-256 over the normalized `{title, ownerName, createdAt}`.
///
/// Status, stage and any body text are ignored. Missing fields become empty
/// strings, so two sparse records with nothing but a shared title collide.
pub fn fingerprint(record: &RawRecord) -> String {
    fingerprint_parts(
        record.title.as_deref(),
        record.owner_name.as_deref(),
        record.created_at.as_deref(),
    )
}

pub fn fingerprint_parts(title: Option<&str>, owner_name: Option<&str>, created_at: Option<&str>) -> String {
    let title = normalize_text(title.unwrap_or_default());
    let owner_name = normalize_text(owner_name.unwrap_or_default());
    let created_at = normalize_timestamp(created_at.unwrap_or_default());
    let key = FingerprintKey {
        created_at: &created_at,
        owner_name: &owner_name,
        title: &title,
    };
    // Serializing three borrowed strings cannot fail.
    let canonical = serde_json::to_vec(&key).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

// Below this an integer is read as epoch seconds, above it as millis.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Renders any recognised timestamp as RFC 3339 UTC, date-only values as
/// `YYYY-MM-DD`, and leaves anything else trimmed as-is. Bare integers of at
/// least nine digits are epoch seconds or millis, as browser snapshots store them.
fn normalize_timestamp(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(parsed) = parse_epoch(trimmed) {
        return parsed.to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return parsed.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return parsed.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.format("%Y-%m-%d").to_string();
    }
    trimmed.to_string()
}

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    if raw.len() < 9 || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let value: i64 = raw.parse().ok()?;
    if value >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

/// Digests seen during one run. Never persisted; a fresh run starts empty.
#[derive(Debug, Default, Clone)]
pub struct FingerprintSet {
    seen: HashSet<String>,
}

impl FingerprintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.seen.contains(digest)
    }

    /// Returns `false` when the digest was already present.
    pub fn insert(&mut self, digest: String) -> bool {
        self.seen.insert(digest)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
