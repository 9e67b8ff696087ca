//! Calendar feed ingestion: fetching, parsing and background refresh.
//!
//! - **Fetching**: a single HTTP GET per feed, with `webcal://` rewritten to `https://`
//! - **Parsing**: a lenient line scanner that turns iCalendar text into [`Event`]s
//! - **Refresh**: fire-and-forget tasks that fetch, parse and persist one calendar each
//!
//! # Architecture
//!
//! - `event` - The [`Event`] record and its JSON snapshot encoding ([`encode_events`], [`decode_events`])
//! - `fetcher` - HTTP retrieval ([`fetch`]) and the shared client ([`build_client`])
//! - `parser` - VEVENT extraction from raw feed text ([`parse`])
//! - `refresh` - The [`Refresher`] orchestrator and its in-flight barrier
//!
//! # Example
//!
//! ```ignore
//! use calfeed::feed::{build_client, Refresher};
//!
//! let refresher = Refresher::new(db, build_client()?);
//! refresher.schedule_refresh(calendar_id, "webcal://example.com/team.ics");
//! refresher.shutdown().await;
//! ```

mod event;
mod fetcher;
mod parser;
mod refresh;

pub use event::{
    decode_events, encode_events, unset_start, Attendee, Event, Organizer, SnapshotError,
};
pub use fetcher::{build_client, fetch, normalize_feed_url, FetchError, FETCH_TIMEOUT};
pub use parser::parse;
pub use refresh::{refresh_calendar, RefreshError, Refresher};
