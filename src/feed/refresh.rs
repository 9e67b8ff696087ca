//! Fire-and-forget refresh of calendar feeds.
//!
//! Each refresh runs as its own tokio task: fetch, store the raw text, parse,
//! store the encoded events. Failures and panics end only that task and are
//! reported through `tracing`; nothing is returned to whoever scheduled it.
//! There is no queue, no concurrency cap and no deduplication; the store
//! keeps whichever write lands last.

use futures::FutureExt;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::feed::event::encode_events;
use crate::feed::fetcher::{fetch, FetchError};
use crate::feed::parser::parse;
use crate::storage::Database;

/// Errors that end a single refresh unit.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Failed to fetch calendar data: {0}")]
    Fetch(#[from] FetchError),
    #[error("Failed to encode parsed events: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to save calendar data: {0}")]
    Database(String),
}

/// Fetch, parse and persist one calendar, returning the number of events.
///
/// The raw snapshot and the parsed snapshot are two separate writes. If the
/// second one fails (or the process stops in between), the store holds new
/// raw text next to the previous events.
pub async fn refresh_calendar(
    db: &Database,
    client: &reqwest::Client,
    calendar_id: i64,
    url: &str,
) -> Result<usize, RefreshError> {
    let bytes = fetch(client, url).await?;
    let raw = String::from_utf8_lossy(&bytes);

    db.set_raw_snapshot(calendar_id, &raw)
        .await
        .map_err(|e| RefreshError::Database(e.to_string()))?;

    let events = parse(&raw);
    let encoded = encode_events(&events)?;

    db.set_parsed_snapshot(calendar_id, &encoded)
        .await
        .map_err(|e| RefreshError::Database(e.to_string()))?;

    tracing::info!(
        calendar_id = calendar_id,
        url = %url,
        bytes = bytes.len(),
        events = events.len(),
        "Calendar refreshed"
    );
    Ok(events.len())
}

// ============================================================================
// In-flight tracking
// ============================================================================

/// Counts running refresh units so shutdown can wait for them.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Held by a running unit; releases its slot on drop, including on panic.
struct InFlightGuard(Arc<InFlight>);

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

// ============================================================================
// Refresher
// ============================================================================

/// Schedules refresh units against a shared store and HTTP client.
///
/// Cloning is cheap; clones share the in-flight counter.
#[derive(Clone)]
pub struct Refresher {
    db: Database,
    client: reqwest::Client,
    in_flight: Arc<InFlight>,
}

impl Refresher {
    pub fn new(db: Database, client: reqwest::Client) -> Self {
        install_panic_trace_hook();
        Self {
            db,
            client,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Start refreshing one calendar in the background and return at once.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_refresh(&self, calendar_id: i64, url: impl Into<String>) {
        let url = url.into();
        let db = self.db.clone();
        let client = self.client.clone();
        let task_url = url.clone();

        self.spawn_unit(calendar_id, url, async move {
            refresh_calendar(&db, &client, calendar_id, &task_url)
                .await
                .map(|_| ())
        });
    }

    /// Schedule one independent refresh per known calendar source.
    ///
    /// Returns how many units were started. Only the initial listing can
    /// fail; the units themselves report through logging.
    pub async fn refresh_all(&self) -> anyhow::Result<usize> {
        let sources = self.db.list_all_sources().await?;
        for source in &sources {
            self.schedule_refresh(source.id, source.url.clone());
        }
        tracing::info!(calendars = sources.len(), "Scheduled refresh of all calendars");
        Ok(sources.len())
    }

    /// Number of refresh units currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until no refresh unit is running.
    pub async fn wait_idle(&self) {
        self.in_flight.wait_idle().await;
    }

    /// Wait for in-flight units, then close the store.
    pub async fn shutdown(self) {
        let pending = self.in_flight();
        if pending > 0 {
            tracing::info!(pending = pending, "Waiting for calendar refreshes to finish");
        }
        self.wait_idle().await;
        self.db.close().await;
    }

    /// Call [`Refresher::refresh_all`] every `period` until `stop` resolves,
    /// returning how many rounds were started.
    ///
    /// The first round starts immediately. A tick that finds units from an
    /// earlier round still running is skipped rather than stacked.
    pub async fn run_every<S>(&self, period: Duration, stop: S) -> usize
    where
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(stop);

        let mut rounds = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    let pending = self.in_flight();
                    if pending > 0 {
                        tracing::warn!(pending = pending, "Calendar refresh already in progress, skipping");
                        continue;
                    }
                    match self.refresh_all().await {
                        Ok(_) => rounds += 1,
                        Err(e) => tracing::error!(error = %e, "Scheduled calendar refresh failed"),
                    }
                }
            }
        }

        tracing::info!(rounds = rounds, "Scheduled refresh stopped");
        rounds
    }

    /// Run `unit` as a supervised task: errors and panics are reported and
    /// never escape the task.
    pub(crate) fn spawn_unit<F>(&self, calendar_id: i64, url: String, unit: F)
    where
        F: Future<Output = Result<(), RefreshError>> + Send + 'static,
    {
        let guard = self.in_flight.enter();

        tokio::spawn(async move {
            let _guard = guard;
            match catch_task_panic(unit).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => report_unit_error(calendar_id, &url, &e.to_string(), None),
                Err(panic_msg) => {
                    // Still on the thread that panicked; nothing ran in between.
                    let trace = take_panic_trace();
                    report_unit_error(
                        calendar_id,
                        &url,
                        &format!("refresh panicked: {panic_msg}"),
                        trace.as_ref(),
                    )
                }
            }
        });
    }
}

/// Wraps a future to catch panics and convert them to errors.
///
/// - `Ok(result)` if the future completes normally
/// - `Err(panic_message)` if the future panics
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                format!("Unknown panic: {:?}", (*panic).type_id())
            }
        })
}

// ============================================================================
// Panic traces
// ============================================================================

thread_local! {
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

/// Chain a panic hook that keeps the panicking thread's backtrace, so the
/// report shows the frames that panicked rather than the reporter's.
fn install_panic_trace_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::capture();
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Take the backtrace recorded by the most recent panic on this thread.
fn take_panic_trace() -> Option<Backtrace> {
    PANIC_TRACE.with(|slot| slot.borrow_mut().take())
}

/// Report a failed unit with its calendar context. `trace` is attached only
/// when it was captured (`RUST_BACKTRACE` set).
fn report_unit_error(calendar_id: i64, url: &str, message: &str, trace: Option<&Backtrace>) {
    let trace = trace
        .filter(|trace| trace.status() == BacktraceStatus::Captured)
        .map(tracing::field::display);
    tracing::error!(
        calendar_id = calendar_id,
        url = %url,
        trace = trace,
        "{message}"
    );
}
