use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use calfeed::config::{Config, LogFormat};
use calfeed::feed::{self, Refresher};
use calfeed::render::build_render_payload;
use calfeed::storage::{CalendarFields, Database, DatabaseError};
use calfeed::transfer;

/// Get the config directory path (~/.config/calfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("calfeed"))
}

#[derive(Parser, Debug)]
#[command(name = "calfeed", about = "Subscribe to iCalendar feeds and render their events")]
struct Args {
    /// Config file (defaults to ~/.config/calfeed/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding `database_path` from the config
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a calendar feed and fetch it
    Add {
        /// Feed URL (http, https or webcal)
        url: String,
        #[arg(long, default_value = "")]
        name: String,
        /// Display color; the configured default when omitted
        #[arg(long, default_value = "")]
        color: String,
        /// Leave the calendar out of the render payload
        #[arg(long)]
        hidden: bool,
        /// Redact event details for unauthenticated viewers
        #[arg(long)]
        hide_details: bool,
    },
    /// Change a calendar's settings and fetch it again
    Edit {
        id: i64,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        hidden: Option<bool>,
        #[arg(long)]
        hide_details: Option<bool>,
    },
    /// Delete a calendar and its stored snapshots
    Remove { id: i64 },
    /// List subscribed calendars
    List,
    /// Fetch one calendar, or all of them
    Refresh { id: Option<i64> },
    /// Print the render payload of visible calendars as JSON
    Render {
        /// Show details of calendars marked hide_details
        #[arg(long)]
        authenticated: bool,
    },
    /// Parse a local .ics file and print its events as JSON
    Parse { file: PathBuf },
    /// Refresh every calendar on the configured interval until Ctrl-C
    Watch,
    /// Write calendar subscriptions as JSON
    Export {
        /// Output file; stdout when omitted
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Subscribe to the calendars of an export file, skipping known URLs
    Import { file: PathBuf },
}

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    init_tracing(config.log_format);

    // Parsing a local file needs neither the store nor the network.
    if let Command::Parse { file } = &args.command {
        return print_parsed(file);
    }

    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.database_path_in(&config_dir));
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::Locked) => {
            eprintln!("Error: The calendar database is locked by another process. Please try again.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let client = feed::build_client().context("Failed to build HTTP client")?;
    let refresher = Refresher::new(db.clone(), client);

    let result = run(args.command, &config, &db, &refresher).await;

    // Scheduled refreshes outlive the command that started them.
    refresher.shutdown().await;
    result
}

fn print_parsed(file: &Path) -> Result<()> {
    let raw = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let events = feed::parse(&String::from_utf8_lossy(&raw));
    println!("{}", feed::encode_events(&events)?);
    Ok(())
}

async fn run(command: Command, config: &Config, db: &Database, refresher: &Refresher) -> Result<()> {
    match command {
        Command::Add {
            url,
            name,
            color,
            hidden,
            hide_details,
        } => {
            let fields = CalendarFields {
                name,
                url,
                color,
                hidden,
                hide_details,
            }
            .normalized(&config.default_color)?;
            let id = db.create_source(&fields).await?;
            println!("Added calendar {id}: {}", fields.url);
            refresher.schedule_refresh(id, fields.url);
        }
        Command::Edit {
            id,
            url,
            name,
            color,
            hidden,
            hide_details,
        } => {
            let existing = db
                .get_source(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No calendar with id {id}"))?;
            let fields = CalendarFields {
                name: name.unwrap_or(existing.name),
                url: url.unwrap_or(existing.url),
                color: color.unwrap_or(existing.color),
                hidden: hidden.unwrap_or(existing.hidden),
                hide_details: hide_details.unwrap_or(existing.hide_details),
            }
            .normalized(&config.default_color)?;
            if !db.update_source(id, &fields).await? {
                anyhow::bail!("No calendar with id {id}");
            }
            println!("Updated calendar {id}");
            refresher.schedule_refresh(id, fields.url);
        }
        Command::Remove { id } => {
            if !db.delete_source(id).await? {
                anyhow::bail!("No calendar with id {id}");
            }
            println!("Removed calendar {id}");
        }
        Command::List => {
            for source in db.list_all_sources().await? {
                let mut flags = Vec::new();
                if source.hidden {
                    flags.push("hidden");
                }
                if source.hide_details {
                    flags.push("hide-details");
                }
                if source.events.is_none() {
                    flags.push("never fetched");
                }
                println!(
                    "{:>4}  {:<8}  {:<24}  {}  {}",
                    source.id,
                    source.color,
                    source.name,
                    source.url,
                    flags.join(",")
                );
            }
        }
        Command::Refresh { id: Some(id) } => {
            let source = db
                .get_source(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No calendar with id {id}"))?;
            refresher.schedule_refresh(source.id, source.url);
        }
        Command::Refresh { id: None } => {
            let scheduled = refresher.refresh_all().await?;
            println!("Refreshing {scheduled} calendars");
        }
        Command::Render { authenticated } => {
            let sources = db.list_visible_sources().await?;
            let payload = build_render_payload(&sources, authenticated);
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Command::Parse { file } => print_parsed(&file)?,
        Command::Watch => {
            let period = config.refresh_interval().ok_or_else(|| {
                anyhow::anyhow!("refresh_interval_minutes is 0; scheduled refresh is disabled")
            })?;
            let stop = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            let rounds = refresher.run_every(period, stop).await;
            println!("Stopped after {rounds} refresh rounds");
        }
        Command::Export { output } => {
            let export = transfer::export_calendars(db).await?;
            match output {
                Some(path) => {
                    transfer::write_export(&export, &path)?;
                    println!(
                        "Exported {} calendars to {}",
                        export.calendars.len(),
                        path.display()
                    );
                }
                None => println!("{}", serde_json::to_string_pretty(&export)?),
            }
        }
        Command::Import { file } => {
            let export = transfer::read_export(&file).await?;
            let report =
                transfer::import_calendars(db, export.calendars, &config.default_color).await?;
            for failure in &report.errors {
                eprintln!("Skipped {:?}: {}", failure.url, failure.message);
            }
            println!(
                "Imported {} calendars ({} already subscribed, {} invalid)",
                report.imported.len(),
                report.skipped,
                report.errors.len()
            );
            for (id, url) in report.imported {
                refresher.schedule_refresh(id, url);
            }
        }
    }
    Ok(())
}
