use thiserror::Error;

use crate::util::{validate_feed_url, UrlValidationError};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the write lock for longer than the busy timeout
    #[error("The calendar database is locked by another process. Please try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::Locked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6) surface only through their messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
}

/// Rejected calendar fields on create/update.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("URL is required")]
    MissingUrl,
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed calendar feed with its last fetched and parsed snapshots.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CalendarSource {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub color: String,
    /// Excluded from the render set entirely.
    pub hidden: bool,
    /// Redact title/description/location for unauthenticated viewers.
    pub hide_details: bool,
    /// Raw feed text from the last successful fetch.
    pub data: Option<String>,
    /// JSON-encoded events parsed from `data`.
    pub events: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// User-editable fields of a calendar source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarFields {
    pub name: String,
    pub url: String,
    pub color: String,
    pub hidden: bool,
    pub hide_details: bool,
}

impl CalendarFields {
    /// Validate the URL and fill in defaults before the fields reach the store.
    ///
    /// An empty color falls back to `default_color`. The URL is kept as typed
    /// (a `webcal://` URL stays `webcal://` and is rewritten only at fetch time).
    pub fn normalized(mut self, default_color: &str) -> Result<Self, ValidationError> {
        self.url = self.url.trim().to_string();
        if self.url.is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        validate_feed_url(&self.url)?;

        self.name = self.name.trim().to_string();
        self.color = self.color.trim().to_string();
        if self.color.is_empty() {
            self.color = default_color.to_string();
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(url: &str, color: &str) -> CalendarFields {
        CalendarFields {
            name: "  Team  ".to_string(),
            url: url.to_string(),
            color: color.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_color_uses_default() {
        let normalized = fields("https://example.com/a.ics", "")
            .normalized("#0084d1")
            .unwrap();
        assert_eq!(normalized.color, "#0084d1");
        assert_eq!(normalized.name, "Team");
    }

    #[test]
    fn test_explicit_color_is_kept() {
        let normalized = fields("webcal://example.com/a.ics", "#ff0000")
            .normalized("#0084d1")
            .unwrap();
        assert_eq!(normalized.color, "#ff0000");
        assert_eq!(normalized.url, "webcal://example.com/a.ics");
    }

    #[test]
    fn test_missing_url_rejected() {
        assert!(matches!(
            fields("   ", "").normalized("#0084d1"),
            Err(ValidationError::MissingUrl)
        ));
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        assert!(matches!(
            fields("ftp://example.com/a.ics", "").normalized("#0084d1"),
            Err(ValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_lock_messages_detected() {
        assert!(is_lock_message("error returned from database: database is locked"));
        assert!(is_lock_message("SQLITE_BUSY"));
        assert!(!is_lock_message("no such table: calendars"));
    }
}
