use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored parsed snapshot could not be turned back into events.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Invalid event snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organizer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    /// PARTSTAT
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// CUTYPE
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

/// Seconds from the Unix epoch back to 0001-01-01T00:00:00Z.
const UNSET_START_SECS: i64 = -62_135_596_800;

/// Start of an event whose `DTSTART` is missing or unreadable:
/// 0001-01-01T00:00:00Z.
pub fn unset_start() -> DateTime<Utc> {
    DateTime::from_timestamp(UNSET_START_SECS, 0).unwrap_or_default()
}

/// One VEVENT block as read from a feed.
///
/// Serialized form is the parsed snapshot persisted per calendar: camelCase
/// keys, empty strings and unset instants omitted, `sequence` omitted at 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub title: String,
    #[serde(default = "unset_start")]
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt_stamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transparency: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub sequence: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<Organizer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            title: String::new(),
            start: unset_start(),
            end: None,
            all_day: false,
            description: String::new(),
            location: String::new(),
            uid: String::new(),
            url: String::new(),
            duration: String::new(),
            dt_stamp: None,
            status: String::new(),
            transparency: String::new(),
            sequence: 0,
            organizer: None,
            attendees: Vec::new(),
            created: None,
            last_modified: None,
        }
    }
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

/// Serialize parsed events into the snapshot stored alongside the raw feed.
pub fn encode_events(events: &[Event]) -> Result<String, serde_json::Error> {
    serde_json::to_string(events)
}

/// Decode a stored parsed snapshot.
pub fn decode_events(snapshot: &str) -> Result<Vec<Event>, SnapshotError> {
    Ok(serde_json::from_str(snapshot)?)
}
