use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::gallery_date_serde;
use crate::schedule::{self, Phase};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Scheduled,
    Archived,
    Cancelled,
}

/// How a happening's date window reads on listing pages: an exhibition
/// run ("March 16–June 20") or a single dated event ("March 28 at 7pm").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DateDisplayMode {
    #[serde(rename = "date-range")]
    DateRange,
    #[serde(rename = "datetime")]
    DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HappeningType {
    pub name: String,
    pub slug: String,
    pub date_display: DateDisplayMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(with = "gallery_date_serde")]
    pub entry: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Happening {
    pub uuid: Uuid,

    #[serde(default)]
    pub id: Option<u64>,

    pub title: String,

    pub status: Status,

    pub type_slug: String,

    #[serde(default, with = "gallery_date_serde::lenient")]
    pub opens_at: Option<DateTime<Utc>>,

    #[serde(default, with = "gallery_date_serde::lenient")]
    pub closes_at: Option<DateTime<Utc>>,

    /// `None`: activity follows the date window. `Some(v)`: pinned to `v`
    /// by hand and the window rule is skipped.
    #[serde(default)]
    pub active_override: Option<bool>,

    #[serde(default)]
    pub venue: Option<String>,

    #[serde(default)]
    pub artists: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(with = "gallery_date_serde")]
    pub entry: DateTime<Utc>,

    #[serde(with = "gallery_date_serde")]
    pub modified: DateTime<Utc>,

    #[serde(default)]
    pub annotations: Vec<Annotation>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Happening {
    pub fn new_scheduled(title: String, type_slug: String, now: DateTime<Utc>, id: u64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: Some(id),
            title,
            status: Status::Scheduled,
            type_slug,
            opens_at: None,
            closes_at: None,
            active_override: None,
            venue: None,
            artists: vec![],
            tags: vec![],
            summary: None,
            entry: now,
            modified: now,
            annotations: vec![],
            extra: BTreeMap::new(),
        }
    }

    /// Recomputed on every read; the stored override wins when set.
    pub fn active(&self, now: DateTime<Utc>) -> bool {
        schedule::is_active(now, self.opens_at, self.closes_at, self.active_override)
    }

    pub fn phase(&self, now: DateTime<Utc>) -> Phase {
        schedule::phase_of(now, self.opens_at, self.closes_at, self.active_override)
    }

    /// An opening with no announced closing date.
    pub fn open_ended(&self) -> bool {
        self.opens_at.is_some() && self.closes_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Happening, Status};
    use crate::display::format_window;
    use crate::happening::DateDisplayMode;

    #[test]
    fn unparseable_closing_date_reads_as_absent() {
        let raw = r#"{
            "uuid": "8f8c8b1e-4b1a-4a62-9d8e-0a4f5f3f2d11",
            "id": 3,
            "title": "Night Pictures",
            "status": "scheduled",
            "type_slug": "exhibition",
            "opens_at": "2024-03-16T12:00:00Z",
            "closes_at": "coming-soon",
            "entry": "2024-02-01T15:00:00Z",
            "modified": "2024-02-01T15:00:00Z"
        }"#;

        let happening: Happening = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(happening.status, Status::Scheduled);
        assert!(happening.opens_at.is_some());
        assert!(happening.closes_at.is_none());

        // Fell through to the single-date branch rather than erroring.
        let shown = format_window(
            happening.opens_at,
            happening.closes_at,
            DateDisplayMode::DateRange,
        );
        assert_eq!(shown, "March 16");
    }

    #[test]
    fn override_wins_on_read() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut happening =
            Happening::new_scheduled("Summer Group Show".to_string(), "exhibition".to_string(), now, 1);
        happening.opens_at = Some(now + chrono::Duration::days(30));

        assert!(!happening.active(now));
        happening.active_override = Some(true);
        assert!(happening.active(now));
    }

    #[test]
    fn unknown_json_keys_survive_round_trips() {
        let raw = r#"{
            "uuid": "8f8c8b1e-4b1a-4a62-9d8e-0a4f5f3f2d11",
            "title": "Night Pictures",
            "status": "scheduled",
            "type_slug": "exhibition",
            "entry": "2024-02-01T15:00:00Z",
            "modified": "2024-02-01T15:00:00Z",
            "heroImage": "pictures/night.jpg"
        }"#;

        let happening: Happening = serde_json::from_str(raw).expect("deserialize");
        let out = serde_json::to_string(&happening).expect("serialize");
        assert!(out.contains("heroImage"));
    }
}
