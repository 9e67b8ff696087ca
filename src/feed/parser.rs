//! Line-oriented VEVENT extraction.
//!
//! The parser is deliberately forgiving: it never fails, unknown or
//! unparsable property lines are skipped, and a VEVENT block that is never
//! closed is dropped. Folded continuation lines are not unfolded.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::event::{Attendee, Event, Organizer};

const BEGIN_EVENT: &str = "BEGIN:VEVENT";
const END_EVENT: &str = "END:VEVENT";

/// Fixed-width shape of a date-only value; `#` is one ASCII digit.
const DATE_LAYOUT: &str = "########";

/// Date-time shapes and their chrono formats, tried in order.
const DATE_TIME_FORMATS: [(&str, &str); 2] = [
    ("########T######Z", "%Y%m%dT%H%M%SZ"),
    ("########T######", "%Y%m%dT%H%M%S"),
];

/// Applies one property line to the event under construction.
///
/// Receives the full trimmed line and the text following the matched prefix.
type Setter = fn(&mut Event, &str, &str);

/// Recognized properties. The first prefix the line starts with wins.
const PROPERTIES: &[(&str, Setter)] = &[
    ("SUMMARY:", set_title),
    ("DTSTART", set_start),
    ("DTEND", set_end),
    ("DESCRIPTION:", set_description),
    ("LOCATION:", set_location),
    ("UID:", set_uid),
    ("URL:", set_url),
    ("DURATION:", set_duration),
    ("DTSTAMP:", set_dt_stamp),
    ("STATUS:", set_status),
    ("TRANSP:", set_transparency),
    ("SEQUENCE:", set_sequence),
    ("ORGANIZER", set_organizer),
    ("ATTENDEE", add_attendee),
    ("CREATED:", set_created),
    ("LAST-MODIFIED:", set_last_modified),
];

enum State {
    Outside,
    InEvent(Event),
}

/// Parse raw feed text into events, in the order their blocks appear.
pub fn parse(raw: &str) -> Vec<Event> {
    let mut events = Vec::new();
    let mut state = State::Outside;

    for line in raw.split('\n') {
        let line = line.trim();

        state = match state {
            State::Outside if line == BEGIN_EVENT => State::InEvent(Event::default()),
            State::Outside => State::Outside,
            State::InEvent(event) if line == END_EVENT => {
                events.push(event);
                State::Outside
            }
            // A new block before the current one closed restarts accumulation.
            State::InEvent(_) if line == BEGIN_EVENT => State::InEvent(Event::default()),
            State::InEvent(mut event) => {
                apply_property(&mut event, line);
                State::InEvent(event)
            }
        };
    }

    if let State::InEvent(event) = state {
        tracing::debug!(
            title = %event.title,
            "Dropping VEVENT without END:VEVENT at end of input"
        );
    }

    events
}

fn apply_property(event: &mut Event, line: &str) {
    if let Some((prefix, setter)) = PROPERTIES
        .iter()
        .find(|(prefix, _)| line.starts_with(prefix))
    {
        setter(event, line, &line[prefix.len()..]);
    }
}

fn set_title(event: &mut Event, _line: &str, value: &str) {
    event.title = value.to_string();
}

fn set_start(event: &mut Event, line: &str, _value: &str) {
    if let Some((start, all_day)) = parse_date_property(line) {
        event.start = start;
        event.all_day = all_day;
    }
}

fn set_end(event: &mut Event, line: &str, _value: &str) {
    if let Some((end, _)) = parse_date_property(line) {
        event.end = Some(end);
    }
}

fn set_description(event: &mut Event, _line: &str, value: &str) {
    event.description = value.to_string();
}

fn set_location(event: &mut Event, _line: &str, value: &str) {
    event.location = value.to_string();
}

fn set_uid(event: &mut Event, _line: &str, value: &str) {
    event.uid = value.to_string();
}

fn set_url(event: &mut Event, _line: &str, value: &str) {
    event.url = value.to_string();
}

fn set_duration(event: &mut Event, _line: &str, value: &str) {
    event.duration = value.to_string();
}

fn set_dt_stamp(event: &mut Event, _line: &str, value: &str) {
    if let Some(stamp) = parse_timestamp(value) {
        event.dt_stamp = Some(stamp);
    }
}

fn set_status(event: &mut Event, _line: &str, value: &str) {
    event.status = value.to_string();
}

fn set_transparency(event: &mut Event, _line: &str, value: &str) {
    event.transparency = value.to_string();
}

fn set_sequence(event: &mut Event, _line: &str, value: &str) {
    if let Ok(sequence) = value.parse() {
        event.sequence = sequence;
    }
}

fn set_organizer(event: &mut Event, line: &str, _value: &str) {
    if let Some(organizer) = parse_organizer(line) {
        event.organizer = Some(organizer);
    }
}

fn add_attendee(event: &mut Event, line: &str, _value: &str) {
    if let Some(attendee) = parse_attendee(line) {
        event.attendees.push(attendee);
    }
}

fn set_created(event: &mut Event, _line: &str, value: &str) {
    if let Some(created) = parse_timestamp(value) {
        event.created = Some(created);
    }
}

fn set_last_modified(event: &mut Event, _line: &str, value: &str) {
    if let Some(modified) = parse_timestamp(value) {
        event.last_modified = Some(modified);
    }
}

// ============================================================================
// Date/time values
// ============================================================================

/// Parse a `DTSTART`/`DTEND` line (parameters allowed) into an instant and
/// an all-day flag.
fn parse_date_property(line: &str) -> Option<(DateTime<Utc>, bool)> {
    let (_, value) = line.split_once(':')?;
    if value.is_empty() {
        return None;
    }
    parse_date_value(value)
}

/// Date-only values are exactly eight characters and become midnight of
/// that day. Anything else must be one of [`DATE_TIME_FORMATS`].
fn parse_date_value(value: &str) -> Option<(DateTime<Utc>, bool)> {
    if value.len() == DATE_LAYOUT.len() {
        if !matches_layout(value, DATE_LAYOUT) {
            return None;
        }
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some((midnight.and_utc(), true));
    }

    parse_timestamp(value).map(|instant| (instant, false))
}

/// Floating values (no `Z`) keep their wall-clock time and are anchored to
/// UTC without conversion.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DATE_TIME_FORMATS
        .iter()
        .filter(|(layout, _)| matches_layout(value, layout))
        .find_map(|(_, format)| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// chrono accepts single-digit fields and leading blanks, so the width is
/// checked before parsing.
fn matches_layout(value: &str, layout: &str) -> bool {
    value.len() == layout.len()
        && value
            .bytes()
            .zip(layout.bytes())
            .all(|(v, l)| if l == b'#' { v.is_ascii_digit() } else { v == l })
}

// ============================================================================
// Parameters (ORGANIZER / ATTENDEE)
// ============================================================================

/// A content line split into its parameters and value.
///
/// `ATTENDEE;ROLE=CHAIR;CN=Jane:mailto:jane@example.com` has the parameters
/// `ROLE=CHAIR` and `CN=Jane` and the value `mailto:jane@example.com`.
struct ContentLine<'a> {
    params: Vec<(&'a str, &'a str)>,
    value: &'a str,
}

impl<'a> ContentLine<'a> {
    fn tokenize(line: &'a str) -> Self {
        let (head, value) = match find_unquoted(line, ':') {
            Some(idx) => (&line[..idx], &line[idx + 1..]),
            None => (line, ""),
        };

        let params = split_unquoted(head, ';')
            .into_iter()
            .skip(1) // property name
            .filter_map(|param| param.split_once('='))
            .filter(|(_, value)| !value.is_empty())
            .collect();

        Self { params, value }
    }

    fn param(&self, name: &str) -> Option<&'a str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }

    fn email(&self) -> Option<&'a str> {
        self.value
            .find("mailto:")
            .map(|idx| &self.value[idx + "mailto:".len()..])
            .filter(|email| !email.is_empty())
    }
}

fn find_unquoted(text: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    for (idx, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == needle && !in_quotes => return Some(idx),
            _ => {}
        }
    }
    None
}

fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(idx) = find_unquoted(rest, separator) {
        parts.push(&rest[..idx]);
        rest = &rest[idx + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}

fn owned(value: Option<&str>) -> String {
    value.map(str::to_string).unwrap_or_default()
}

fn parse_organizer(line: &str) -> Option<Organizer> {
    let content = ContentLine::tokenize(line);
    let organizer = Organizer {
        name: owned(content.param("CN")),
        email: owned(content.email()),
    };

    if organizer.name.is_empty() && organizer.email.is_empty() {
        return None;
    }
    Some(organizer)
}

fn parse_attendee(line: &str) -> Option<Attendee> {
    let content = ContentLine::tokenize(line);
    let attendee = Attendee {
        name: owned(content.param("CN")),
        email: owned(content.email()),
        role: owned(content.param("ROLE")),
        status: owned(content.param("PARTSTAT")),
        kind: owned(content.param("CUTYPE")),
    };

    if attendee.name.is_empty() && attendee.email.is_empty() {
        return None;
    }
    Some(attendee)
}
