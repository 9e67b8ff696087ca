//! Subscribe to iCalendar feeds, keep their latest snapshots in SQLite and
//! project the parsed events into a calendar-widget payload.

pub mod config;
pub mod feed;
pub mod render;
pub mod storage;
pub mod transfer;
pub mod util;
