use anyhow::Result;

use super::schema::Database;
use super::types::{CalendarFields, CalendarSource};

/// Raw snapshots at or below this many bytes are treated as empty feeds and
/// kept out of the render set.
const MIN_VISIBLE_DATA_LEN: i64 = 50;

const SOURCE_COLUMNS: &str =
    "id, name, url, color, hidden, hide_details, data, events, created_at, updated_at";

impl Database {
    // ========================================================================
    // Calendar Source Operations
    // ========================================================================

    /// Insert a new calendar source, returning its id
    pub async fn create_source(&self, fields: &CalendarFields) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO calendars (name, url, color, hidden, hide_details, data, events, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, NULL, ?, ?)
            RETURNING id
        "#,
        )
        .bind(&fields.name)
        .bind(&fields.url)
        .bind(&fields.color)
        .bind(fields.hidden)
        .bind(fields.hide_details)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(calendar_id = id, url = %fields.url, "Created calendar source");
        Ok(id)
    }

    /// Get a calendar source by id
    pub async fn get_source(&self, id: i64) -> Result<Option<CalendarSource>> {
        let source = sqlx::query_as::<_, CalendarSource>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM calendars WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    /// Get the first calendar source subscribed to `url`
    pub async fn get_source_by_url(&self, url: &str) -> Result<Option<CalendarSource>> {
        let source = sqlx::query_as::<_, CalendarSource>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM calendars WHERE url = ? ORDER BY id LIMIT 1"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    /// All calendar sources in creation order
    pub async fn list_all_sources(&self) -> Result<Vec<CalendarSource>> {
        let sources = sqlx::query_as::<_, CalendarSource>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM calendars ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    /// Sources eligible for rendering: not hidden and holding a non-trivial
    /// raw snapshot, in creation order
    pub async fn list_visible_sources(&self) -> Result<Vec<CalendarSource>> {
        let sources = sqlx::query_as::<_, CalendarSource>(&format!(
            r#"
            SELECT {SOURCE_COLUMNS} FROM calendars
            WHERE hidden = 0 AND data IS NOT NULL AND LENGTH(data) > ?
            ORDER BY created_at ASC, id ASC
        "#
        ))
        .bind(MIN_VISIBLE_DATA_LEN)
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    /// Replace the editable fields of a source.
    ///
    /// Returns `false` if no source has that id. Snapshots are left as they are.
    pub async fn update_source(&self, id: i64, fields: &CalendarFields) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE calendars
            SET name = ?, url = ?, color = ?, hidden = ?, hide_details = ?, updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(&fields.name)
        .bind(&fields.url)
        .bind(&fields.color)
        .bind(fields.hidden)
        .bind(fields.hide_details)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a source and both of its snapshots. Returns `false` if it did not exist.
    pub async fn delete_source(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM calendars WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Snapshot Operations
    // ========================================================================

    /// Store the raw feed text from the latest fetch (last writer wins)
    pub async fn set_raw_snapshot(&self, id: i64, data: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE calendars SET data = ?, updated_at = ? WHERE id = ?")
            .bind(data)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store the JSON-encoded events parsed from the latest fetch (last writer wins)
    pub async fn set_parsed_snapshot(&self, id: i64, events: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE calendars SET events = ?, updated_at = ? WHERE id = ?")
            .bind(events)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
