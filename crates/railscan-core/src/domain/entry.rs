//! History entry: one persisted analysis outcome.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::EntryId;

/// Caller-supplied result data. The store passes it through untouched.
pub type Payload = serde_json::Map<String, Value>;

/// Title shown when neither the report nor the detections name a defect.
pub const DEFAULT_ENTRY_TITLE: &str = "Track Analysis";

/// Keys owned by the envelope. A payload field with the same name is
/// overwritten by the store's value.
const RESERVED_KEYS: [&str; 2] = ["id", "timestamp"];

/// One persisted analysis outcome.
///
/// The persisted form has no wrapper: the payload fields sit at the top level
/// next to `id` and `timestamp`.
///
/// Entries are immutable once created. There are no setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    id: EntryId,
    #[serde(with = "iso_millis")]
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    payload: Payload,
}

impl HistoryEntry {
    pub(crate) fn new(id: EntryId, timestamp: DateTime<Utc>, mut payload: Payload) -> Self {
        for key in RESERVED_KEYS {
            payload.remove(key);
        }
        Self {
            id,
            timestamp,
            payload,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Shortcut for `payload().get(key)`.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Number of detections reported by the inference backend.
    pub fn detection_count(&self) -> usize {
        self.payload
            .get("detections")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// The annotated image reference (usually a data URL), if any.
    pub fn result_image(&self) -> Option<&str> {
        self.payload.get("result_image").and_then(Value::as_str)
    }

    /// What a history list shows for this entry, dated in the local time zone.
    pub fn summary(&self) -> EntrySummary {
        self.summary_in(&Local)
    }

    /// Like [`summary`](Self::summary), dated in `tz`.
    pub fn summary_in<Tz: TimeZone>(&self, tz: &Tz) -> EntrySummary {
        let from_report = self
            .payload
            .get("report")
            .and_then(|report| report.get("defect_summary"))
            .and_then(|summary| summary.get("detected_defect"))
            .and_then(Value::as_str);
        let from_detections = self
            .payload
            .get("detections")
            .and_then(|detections| detections.get(0))
            .and_then(|first| first.get("class"))
            .and_then(Value::as_str);

        let title = from_report
            .filter(|title| !title.is_empty())
            .or(from_detections.filter(|title| !title.is_empty()))
            .unwrap_or(DEFAULT_ENTRY_TITLE)
            .to_string();

        EntrySummary {
            title,
            defect_detected: self.detection_count() > 0,
            date: self.timestamp.with_timezone(tz).date_naive(),
        }
    }
}

/// Display-ready digest of a [`HistoryEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub title: String,
    pub defect_detected: bool,
    /// Calendar date of the entry in the summary's time zone.
    pub date: NaiveDate,
}

/// ISO-8601 with millisecond precision and a `Z` suffix, e.g. `2024-01-01T12:00:00.000Z`.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
