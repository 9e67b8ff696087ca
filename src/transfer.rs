//! Export and import of calendar subscriptions as JSON.
//!
//! Only the user-editable fields travel; snapshots are refetched after
//! import. Importing skips any calendar whose URL is already subscribed, so
//! the same file can be imported twice without creating duplicates.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::storage::{CalendarFields, Database};

/// Version tag written into every export.
pub const EXPORT_VERSION: &str = "1.0";

/// One calendar subscription in an export file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedCalendar {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub hide_details: bool,
}

impl From<ExportedCalendar> for CalendarFields {
    fn from(calendar: ExportedCalendar) -> Self {
        Self {
            name: calendar.name,
            url: calendar.url,
            color: calendar.color,
            hidden: calendar.hidden,
            hide_details: calendar.hide_details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarExport {
    pub calendars: Vec<ExportedCalendar>,
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: String,
}

/// A calendar from an import file that was not created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub url: String,
    pub message: String,
}

/// Outcome of [`import_calendars`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Newly created calendars as `(id, url)`.
    pub imported: Vec<(i64, String)>,
    /// Calendars whose URL was already subscribed.
    pub skipped: usize,
    pub errors: Vec<ImportFailure>,
}

/// Collect every calendar subscription, in creation order.
pub async fn export_calendars(db: &Database) -> Result<CalendarExport> {
    let calendars: Vec<ExportedCalendar> = db
        .list_all_sources()
        .await?
        .into_iter()
        .map(|source| ExportedCalendar {
            name: source.name,
            url: source.url,
            color: source.color,
            hidden: source.hidden,
            hide_details: source.hide_details,
        })
        .collect();

    tracing::info!(calendars = calendars.len(), "Exported calendars");
    Ok(CalendarExport {
        calendars,
        exported_at: Some(Utc::now()),
        version: EXPORT_VERSION.to_string(),
    })
}

/// Create the calendars of an export that are not subscribed yet.
///
/// Each entry needs a name and a valid URL; an invalid entry is recorded in
/// [`ImportReport::errors`] and the rest are still imported. Only store
/// failures abort the import.
pub async fn import_calendars(
    db: &Database,
    calendars: Vec<ExportedCalendar>,
    default_color: &str,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for calendar in calendars {
        let url = calendar.url.trim().to_string();
        if calendar.name.trim().is_empty() || url.is_empty() {
            report.errors.push(ImportFailure {
                url,
                message: "Name and URL are required".to_string(),
            });
            continue;
        }

        let fields = match CalendarFields::from(calendar).normalized(default_color) {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Skipping invalid calendar in import");
                report.errors.push(ImportFailure {
                    url,
                    message: e.to_string(),
                });
                continue;
            }
        };

        if db.get_source_by_url(&fields.url).await?.is_some() {
            tracing::debug!(url = %fields.url, "Calendar already subscribed, skipping");
            report.skipped += 1;
            continue;
        }

        let id = db.create_source(&fields).await?;
        report.imported.push((id, fields.url));
    }

    tracing::info!(
        imported = report.imported.len(),
        skipped = report.skipped,
        errors = report.errors.len(),
        "Calendar import completed"
    );
    Ok(report)
}

/// Read an export file written by [`write_export`].
pub async fn read_export(path: &Path) -> Result<CalendarExport> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read export file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid calendar export: {}", path.display()))
}

/// Write an export to `path` through a temporary file and a rename, so the
/// destination never holds a partial export.
pub fn write_export(export: &CalendarExport, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(export)?;
    let temp_path = path.with_extension(format!(
        "tmp.{:016x}",
        Utc::now().timestamp_nanos_opt().unwrap_or(0)
    ));

    std::fs::write(&temp_path, content).with_context(|| {
        format!(
            "Failed to write temporary file '{}': check directory permissions",
            temp_path.display()
        )
    })?;

    std::fs::rename(&temp_path, path).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}'",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}
