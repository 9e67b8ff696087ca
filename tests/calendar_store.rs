//! Integration tests for the calendar store: create, edit, list, delete and
//! snapshot writes.
//!
//! Each test creates its own in-memory SQLite database for isolation.

use calfeed::storage::{CalendarFields, Database};
use pretty_assertions::assert_eq;

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn fields(name: &str, url: &str) -> CalendarFields {
    CalendarFields {
        name: name.to_string(),
        url: url.to_string(),
        color: "#0084d1".to_string(),
        ..Default::default()
    }
}

/// Longer than the 50-byte visibility threshold.
const FEED_TEXT: &str = "BEGIN:VCALENDAR\nVERSION:2.0\nPRODID:-//Test//EN\nBEGIN:VEVENT\nSUMMARY:A\nEND:VEVENT\nEND:VCALENDAR\n";

// ============================================================================
// Create / Get
// ============================================================================

#[tokio::test]
async fn test_create_source_round_trips_fields() {
    let db = test_db().await;

    let created = CalendarFields {
        name: "Team".to_string(),
        url: "webcal://example.com/team.ics".to_string(),
        color: "#ff0000".to_string(),
        hidden: false,
        hide_details: true,
    };
    let id = db.create_source(&created).await.unwrap();
    assert!(id > 0);

    let source = db.get_source(id).await.unwrap().unwrap();
    assert_eq!(source.name, "Team");
    assert_eq!(source.url, "webcal://example.com/team.ics");
    assert_eq!(source.color, "#ff0000");
    assert!(!source.hidden);
    assert!(source.hide_details);
    assert!(source.data.is_none());
    assert!(source.events.is_none());
}

#[tokio::test]
async fn test_get_missing_source_is_none() {
    let db = test_db().await;
    assert!(db.get_source(42).await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_source_by_url() {
    let db = test_db().await;
    let id = db
        .create_source(&fields("A", "https://example.com/a.ics"))
        .await
        .unwrap();
    db.create_source(&fields("B", "https://example.com/b.ics"))
        .await
        .unwrap();

    let found = db
        .get_source_by_url("https://example.com/a.ics")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, id);
    assert!(db
        .get_source_by_url("https://example.com/missing.ics")
        .await
        .unwrap()
        .is_none());
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_all_sources_in_creation_order() {
    let db = test_db().await;
    for name in ["first", "second", "third"] {
        db.create_source(&fields(name, &format!("https://example.com/{name}.ics")))
            .await
            .unwrap();
    }

    let names: Vec<String> = db
        .list_all_sources()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_visible_sources_require_data_and_not_hidden() {
    let db = test_db().await;

    let never_fetched = db
        .create_source(&fields("never", "https://example.com/never.ics"))
        .await
        .unwrap();
    let tiny = db
        .create_source(&fields("tiny", "https://example.com/tiny.ics"))
        .await
        .unwrap();
    let hidden = db
        .create_source(&CalendarFields {
            hidden: true,
            ..fields("hidden", "https://example.com/hidden.ics")
        })
        .await
        .unwrap();
    let shown = db
        .create_source(&fields("shown", "https://example.com/shown.ics"))
        .await
        .unwrap();

    db.set_raw_snapshot(tiny, "BEGIN:VCALENDAR\nEND:VCALENDAR\n")
        .await
        .unwrap();
    db.set_raw_snapshot(hidden, FEED_TEXT).await.unwrap();
    db.set_raw_snapshot(shown, FEED_TEXT).await.unwrap();

    let visible: Vec<i64> = db
        .list_visible_sources()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(visible, vec![shown]);
    assert!(!visible.contains(&never_fetched));
}

#[tokio::test]
async fn test_visible_threshold_is_strictly_greater_than_fifty() {
    let db = test_db().await;
    let at_limit = db
        .create_source(&fields("fifty", "https://example.com/50.ics"))
        .await
        .unwrap();
    let over_limit = db
        .create_source(&fields("fifty-one", "https://example.com/51.ics"))
        .await
        .unwrap();

    db.set_raw_snapshot(at_limit, &"x".repeat(50)).await.unwrap();
    db.set_raw_snapshot(over_limit, &"x".repeat(51)).await.unwrap();

    let visible: Vec<i64> = db
        .list_visible_sources()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(visible, vec![over_limit]);
}

// ============================================================================
// Update / Delete
// ============================================================================

#[tokio::test]
async fn test_update_source_keeps_snapshots() {
    let db = test_db().await;
    let id = db
        .create_source(&fields("Old", "https://example.com/a.ics"))
        .await
        .unwrap();
    db.set_raw_snapshot(id, FEED_TEXT).await.unwrap();
    db.set_parsed_snapshot(id, "[]").await.unwrap();

    let updated = CalendarFields {
        name: "New".to_string(),
        url: "https://example.com/b.ics".to_string(),
        color: "#00ff00".to_string(),
        hidden: true,
        hide_details: true,
    };
    assert!(db.update_source(id, &updated).await.unwrap());

    let source = db.get_source(id).await.unwrap().unwrap();
    assert_eq!(source.name, "New");
    assert_eq!(source.url, "https://example.com/b.ics");
    assert_eq!(source.color, "#00ff00");
    assert!(source.hidden);
    assert!(source.hide_details);
    assert_eq!(source.data.as_deref(), Some(FEED_TEXT));
    assert_eq!(source.events.as_deref(), Some("[]"));
}

#[tokio::test]
async fn test_update_missing_source_returns_false() {
    let db = test_db().await;
    assert!(!db
        .update_source(7, &fields("x", "https://example.com/x.ics"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_delete_source() {
    let db = test_db().await;
    let id = db
        .create_source(&fields("Gone", "https://example.com/gone.ics"))
        .await
        .unwrap();
    db.set_raw_snapshot(id, FEED_TEXT).await.unwrap();

    assert!(db.delete_source(id).await.unwrap());
    assert!(db.get_source(id).await.unwrap().is_none());
    assert!(db.list_visible_sources().await.unwrap().is_empty());
    assert!(!db.delete_source(id).await.unwrap());
}

// ============================================================================
// Snapshots
// ============================================================================

#[tokio::test]
async fn test_snapshot_writes_are_last_writer_wins() {
    let db = test_db().await;
    let id = db
        .create_source(&fields("Cal", "https://example.com/cal.ics"))
        .await
        .unwrap();

    db.set_raw_snapshot(id, "first").await.unwrap();
    db.set_raw_snapshot(id, "second").await.unwrap();
    db.set_parsed_snapshot(id, "[1]").await.unwrap();
    db.set_parsed_snapshot(id, "[2]").await.unwrap();

    let source = db.get_source(id).await.unwrap().unwrap();
    assert_eq!(source.data.as_deref(), Some("second"));
    assert_eq!(source.events.as_deref(), Some("[2]"));
}

#[tokio::test]
async fn test_raw_and_parsed_snapshots_are_independent() {
    let db = test_db().await;
    let id = db
        .create_source(&fields("Cal", "https://example.com/cal.ics"))
        .await
        .unwrap();

    db.set_raw_snapshot(id, FEED_TEXT).await.unwrap();

    let source = db.get_source(id).await.unwrap().unwrap();
    assert_eq!(source.data.as_deref(), Some(FEED_TEXT));
    assert!(source.events.is_none());
}

#[tokio::test]
async fn test_snapshot_write_bumps_updated_at() {
    let db = test_db().await;
    let id = db
        .create_source(&fields("Cal", "https://example.com/cal.ics"))
        .await
        .unwrap();
    let before = db.get_source(id).await.unwrap().unwrap();

    db.set_raw_snapshot(id, FEED_TEXT).await.unwrap();

    let after = db.get_source(id).await.unwrap().unwrap();
    assert!(after.updated_at >= before.updated_at);
    assert_eq!(after.created_at, before.created_at);
}
