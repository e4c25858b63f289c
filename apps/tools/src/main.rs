use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use client_core::config::{load_settings, normalize_database_url};
use storage::{DraftKvStore, Storage};

#[derive(Parser, Debug)]
struct Cli {
    /// Defaults to `database_url` from portal.toml.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists stored drafts with their age and envelope version.
    List,
    /// Prints one draft envelope as pretty JSON.
    Show { key: String },
    Delete { key: String },
    /// Removes drafts not written for the given number of days.
    Purge {
        #[arg(long)]
        older_than_days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let database_url = cli
        .database_url
        .unwrap_or_else(|| load_settings().database_url);
    let storage = Storage::new(&normalize_database_url(&database_url)).await?;

    match cli.command {
        Command::List => {
            let now = Utc::now();
            for entry in storage.list_entries().await? {
                let version = serde_json::from_str::<serde_json::Value>(&entry.value)
                    .ok()
                    .and_then(|value| value.get("version").and_then(|v| v.as_u64()))
                    .map_or_else(|| "?".to_string(), |v| v.to_string());
                let written = DateTime::<Utc>::from_timestamp_millis(entry.updated_at_ms)
                    .map(|at| format!("{}h ago", (now - at).num_hours()))
                    .unwrap_or_else(|| "unknown".to_string());
                println!("{}  v{version}  {written}", entry.key);
            }
        }
        Command::Show { key } => {
            let Some(raw) = storage.get(&key).await? else {
                bail!("no draft stored under '{key}'");
            };
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => println!("{raw}"),
            }
        }
        Command::Delete { key } => {
            storage.delete(&key).await?;
            println!("deleted {key}");
        }
        Command::Purge { older_than_days } => {
            let cutoff = purge_cutoff(Utc::now(), older_than_days)?;
            let removed = storage.purge_older_than(cutoff.timestamp_millis()).await?;
            println!("purged {removed} draft(s)");
        }
    }

    Ok(())
}

fn purge_cutoff(now: DateTime<Utc>, older_than_days: i64) -> Result<DateTime<Utc>> {
    if older_than_days < 0 {
        bail!("--older-than-days must not be negative");
    }
    let Some(cutoff) =
        Duration::try_days(older_than_days).and_then(|age| now.checked_sub_signed(age))
    else {
        bail!("--older-than-days {older_than_days} is out of range");
    };
    Ok(cutoff)
}
