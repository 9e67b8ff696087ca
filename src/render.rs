//! Projection of parsed events into display records.
//!
//! Visibility is decided per calendar, never per event: an unauthenticated
//! viewer of a calendar flagged `hide_details` gets a blank title and blank
//! `description`/`location` extended properties. Every other field (uid,
//! duration, status, organizer and attendee summaries, URL) stays visible.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::feed::{decode_events, Event};
use crate::storage::CalendarSource;

const TEXT_COLOR: &str = "white";
const LOCAL_ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Per-calendar styling and visibility settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarStyle {
    pub color: String,
    pub hide_details: bool,
}

impl From<&CalendarSource> for CalendarStyle {
    fn from(source: &CalendarSource) -> Self {
        Self {
            color: source.color.clone(),
            hide_details: source.hide_details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderEvent {
    pub title: String,
    pub start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    pub all_day: bool,
    pub background_color: String,
    pub border_color: String,
    pub text_color: String,
    pub extended_props: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One calendar in the render payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderCalendar {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub events: Vec<RenderEvent>,
}

/// Project events into render records under the calendar's visibility policy.
pub fn project(events: &[Event], style: &CalendarStyle, is_authenticated: bool) -> Vec<RenderEvent> {
    let redact = !is_authenticated && style.hide_details;

    events
        .iter()
        .map(|event| {
            let mut render = RenderEvent {
                title: event.title.clone(),
                start: format_local(&event.start),
                end: event.end.as_ref().map(format_local),
                all_day: event.all_day,
                background_color: style.color.clone(),
                border_color: style.color.clone(),
                text_color: TEXT_COLOR.to_string(),
                extended_props: extended_props(event),
                url: (!event.url.is_empty()).then(|| event.url.clone()),
            };

            if redact {
                render.title.clear();
                render
                    .extended_props
                    .insert("description".to_string(), String::new());
                render
                    .extended_props
                    .insert("location".to_string(), String::new());
            }

            render
        })
        .collect()
}

/// Build the render payload for a set of calendar sources.
///
/// A source whose parsed snapshot cannot be decoded is logged and left out;
/// the remaining sources are still rendered. A source with no parsed
/// snapshot yet renders with no events.
pub fn build_render_payload(
    sources: &[CalendarSource],
    is_authenticated: bool,
) -> Vec<RenderCalendar> {
    let mut calendars = Vec::with_capacity(sources.len());

    for source in sources {
        let events = match source.events.as_deref() {
            Some(snapshot) if !snapshot.is_empty() => match decode_events(snapshot) {
                Ok(events) => events,
                Err(e) => {
                    tracing::error!(
                        calendar_id = source.id,
                        error = %e,
                        "Failed to decode events, skipping calendar"
                    );
                    continue;
                }
            },
            _ => Vec::new(),
        };

        calendars.push(RenderCalendar {
            id: source.id,
            name: source.name.clone(),
            color: source.color.clone(),
            events: project(&events, &CalendarStyle::from(source), is_authenticated),
        });
    }

    calendars
}

fn format_local(instant: &DateTime<Utc>) -> String {
    instant.format(LOCAL_ISO_FORMAT).to_string()
}

fn extended_props(event: &Event) -> BTreeMap<String, String> {
    let mut props: BTreeMap<String, String> = [
        ("description", event.description.clone()),
        ("location", event.location.clone()),
        ("uid", event.uid.clone()),
        ("duration", event.duration.clone()),
        ("status", event.status.clone()),
        ("transparency", event.transparency.clone()),
        ("sequence", event.sequence.to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect();

    let stamps = [
        ("dtStamp", event.dt_stamp),
        ("created", event.created),
        ("lastModified", event.last_modified),
    ];
    for (key, stamp) in stamps
        .into_iter()
        .filter_map(|(key, stamp)| stamp.map(|s| (key, s)))
    {
        props.insert(key.to_string(), stamp.format(STAMP_FORMAT).to_string());
    }

    if let Some(organizer) = &event.organizer {
        if !organizer.name.is_empty() {
            props.insert("organizerName".to_string(), organizer.name.clone());
        }
        if !organizer.email.is_empty() {
            props.insert("organizerEmail".to_string(), organizer.email.clone());
        }
    }

    if !event.attendees.is_empty() {
        let names: Vec<&str> = event
            .attendees
            .iter()
            .map(|a| a.name.as_str())
            .filter(|name| !name.is_empty())
            .collect();
        let emails: Vec<&str> = event
            .attendees
            .iter()
            .map(|a| a.email.as_str())
            .filter(|email| !email.is_empty())
            .collect();

        if !names.is_empty() {
            props.insert("attendeeNames".to_string(), names.join(", "));
        }
        if !emails.is_empty() {
            props.insert("attendeeEmails".to_string(), emails.join(", "));
        }
        props.insert(
            "attendeeCount".to_string(),
            event.attendees.len().to_string(),
        );
    }

    props
}
