// SPDX-License-Identifier: MIT

//! `spindle`: the CLI client. Connects to `spindled` over its Unix
//! socket and issues one request per invocation, the way the teacher's
//! `oj` binary drives `ojd`.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod output;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use spindle_core::ItemId;
use spindle_wire::Response;

use client::DaemonClient;
use output::{format_or_json, OutputFormat, Table};

#[derive(Parser)]
#[command(name = "spindle", version, about = "Optical disc ripping and encoding daemon control")]
struct Cli {
    /// Output machine-readable JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon in the background
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status and queue stats
    Status,
    /// Queue inspection and maintenance
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Tail the daemon's log file
    Logs {
        /// Number of recent lines to show
        #[arg(short = 'n', long, default_value_t = 200)]
        limit: usize,
        /// Follow log output as it's written
        #[arg(short, long)]
        follow: bool,
    },
    /// Insert a newly detected disc into the queue
    Insert {
        title: String,
        #[arg(long)]
        source_path: Option<String>,
        fingerprint: String,
        #[arg(long)]
        allow_duplicate: bool,
        #[arg(long, default_value_t = 0)]
        priority: i32,
    },
    /// Pause processing new discs
    Pause,
    /// Resume processing new discs
    Resume,
    /// Check queue database integrity
    DbHealth,
    /// Send a test desktop notification through the daemon
    TestNotification,
}

#[derive(Subcommand)]
enum QueueCommand {
    /// List queue items, optionally filtered by status
    List {
        #[arg(long = "status")]
        statuses: Vec<String>,
    },
    /// Show full detail for one queue item
    Describe { id: u64 },
    /// Remove every item from the queue
    Clear,
    /// Remove completed items from the queue
    ClearCompleted,
    /// Remove failed items from the queue
    ClearFailed,
    /// Remove specific items by id
    Remove { ids: Vec<u64> },
    /// Reset items stuck mid-processing back to pending
    Reset,
    /// Retry failed items (all, if no ids given)
    Retry { ids: Vec<u64> },
    /// Retry one failed episode within a multi-episode item
    RetryEpisode { id: u64, episode_key: String },
    /// Stop specific in-progress items
    Stop { ids: Vec<u64> },
}

fn format_to_output(json: bool) -> OutputFormat {
    if json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = format_to_output(cli.json);

    match cli.command {
        Command::Start => start().await,
        Command::Stop => stop(format).await,
        Command::Status => status(format).await,
        Command::Queue(cmd) => queue(cmd, format).await,
        Command::Insert { title, source_path, fingerprint, allow_duplicate, priority } => {
            insert(title, source_path, fingerprint, allow_duplicate, priority, format).await
        }
        Command::Logs { limit, follow } => logs(limit, follow, format).await,
        Command::Pause => {
            let client = connect().await?;
            match client.disc_pause().await? {
                Response::Paused { message } => println!("{}", message),
                other => return Err(unexpected(other)),
            }
            Ok(())
        }
        Command::Resume => {
            let client = connect().await?;
            match client.disc_resume().await? {
                Response::Resumed { message } => println!("{}", message),
                other => return Err(unexpected(other)),
            }
            Ok(())
        }
        Command::DbHealth => db_health(format).await,
        Command::TestNotification => {
            let client = connect().await?;
            match client.test_notification().await? {
                Response::TestNotificationSent { message, .. } => println!("{}", message),
                other => return Err(unexpected(other)),
            }
            Ok(())
        }
    }
}

async fn connect() -> Result<DaemonClient> {
    DaemonClient::connect().await.map_err(|e| anyhow!("{}", e))
}

async fn start() -> Result<()> {
    let client = DaemonClient::connect_or_start().await.map_err(|e| anyhow!("{}", e))?;
    let version = client.hello().await.unwrap_or_else(|_| "unknown".to_string());
    println!("Daemon running (version {})", version);
    Ok(())
}

async fn stop(format: OutputFormat) -> Result<()> {
    let client = match DaemonClient::connect().await {
        Ok(c) => c,
        Err(e) if e.is_not_running() => {
            return format_or_json(format, &serde_json::json!({"status": "not_running"}), || {
                println!("Daemon not running")
            });
        }
        Err(e) => return Err(anyhow!("{}", e)),
    };
    let message = client.stop().await.map_err(|e| anyhow!("{}", e))?;
    format_or_json(format, &serde_json::json!({"status": "stopped", "message": message}), || println!("{}", message))
}

async fn status(format: OutputFormat) -> Result<()> {
    let client = match DaemonClient::connect().await {
        Ok(c) => c,
        Err(e) if e.is_not_running() => {
            return format_or_json(format, &serde_json::json!({"status": "not_running"}), || {
                println!("Daemon not running")
            });
        }
        Err(e) => return Err(anyhow!("{}", e)),
    };

    match client.status().await.map_err(|e| anyhow!("{}", e))? {
        Response::Status { running, disc_paused, queue_stats, last_error, last_item, pid, stage_health, dependencies, .. } => {
            format_or_json(
                format,
                &serde_json::json!({
                    "running": running,
                    "disc_paused": disc_paused,
                    "queue_stats": queue_stats,
                    "last_error": last_error,
                    "last_item": last_item,
                    "pid": pid,
                    "stage_health": stage_health,
                    "dependencies": dependencies,
                }),
                || {
                    println!("Status: {}", if running { "running" } else { "stopped" });
                    println!("PID: {}", pid);
                    println!("Disc processing: {}", if disc_paused { "paused" } else { "active" });
                    println!(
                        "Queue: {} total, {} pending, {} processing, {} needs_review, {} completed, {} failed",
                        queue_stats.get("total").unwrap_or(&0),
                        queue_stats.get("pending").unwrap_or(&0),
                        queue_stats.get("processing").unwrap_or(&0),
                        queue_stats.get("needs_review").unwrap_or(&0),
                        queue_stats.get("completed").unwrap_or(&0),
                        queue_stats.get("failed").unwrap_or(&0),
                    );
                    if let Some(err) = &last_error {
                        println!("Last error: {}", err);
                    }
                    if let Some(item) = last_item {
                        println!("Last item: {}", item);
                    }
                    println!("Known dependencies: {}", dependencies.join(", "));
                    for entry in &stage_health {
                        let detail = entry.detail.as_deref().unwrap_or("-");
                        println!("  {:<12} {}  {}", entry.stage, if entry.healthy { "ok" } else { "degraded" }, detail);
                    }
                },
            )
        }
        other => Err(unexpected(other)),
    }
}

async fn queue(cmd: QueueCommand, format: OutputFormat) -> Result<()> {
    let client = connect().await?;
    match cmd {
        QueueCommand::List { statuses } => {
            let statuses = if statuses.is_empty() { None } else { Some(statuses) };
            match client.queue_list(statuses).await.map_err(|e| anyhow!("{}", e))? {
                Response::QueueItems { items } => format_or_json(format, &items, || {
                    if items.is_empty() {
                        println!("No items in queue");
                        return;
                    }
                    let mut table = Table::new(vec!["ID", "TITLE", "STATUS", "PROGRESS", "UPDATED"]);
                    for item in &items {
                        table.row(vec![
                            item.id.get().to_string(),
                            item.disc_title.clone(),
                            item.status.to_string(),
                            format!("{} {:.0}%", item.progress.stage_label, item.progress.percent),
                            item.updated_at.clone(),
                        ]);
                    }
                    table.render();
                }),
                other => Err(unexpected(other)),
            }
        }
        QueueCommand::Describe { id } => {
            match client.queue_describe(ItemId::new(id)).await.map_err(|e| anyhow!("{}", e))? {
                Response::QueueItem { found, item } => {
                    if !found {
                        println!("No item with id {}", id);
                        return Ok(());
                    }
                    format_or_json(format, &item, || println!("{:#?}", item))
                }
                other => Err(unexpected(other)),
            }
        }
        QueueCommand::Clear => report_removed(client.queue_clear().await, format).await,
        QueueCommand::ClearCompleted => report_removed(client.queue_clear_completed().await, format).await,
        QueueCommand::ClearFailed => report_removed(client.queue_clear_failed().await, format).await,
        QueueCommand::Remove { ids } => {
            let ids = ids.into_iter().map(ItemId::new).collect();
            report_removed(client.queue_remove(ids).await, format).await
        }
        QueueCommand::Reset => report_updated(client.queue_reset().await, format).await,
        QueueCommand::Retry { ids } => {
            let ids = if ids.is_empty() { None } else { Some(ids.into_iter().map(ItemId::new).collect()) };
            report_updated(client.queue_retry(ids).await, format).await
        }
        QueueCommand::RetryEpisode { id, episode_key } => {
            match client.queue_retry_episode(ItemId::new(id), episode_key).await.map_err(|e| anyhow!("{}", e))? {
                Response::RetryEpisodeResult { outcome, new_status } => format_or_json(
                    format,
                    &serde_json::json!({"outcome": outcome, "new_status": new_status}),
                    || println!("{} (new status: {})", outcome, new_status.as_deref().unwrap_or("-")),
                ),
                other => Err(unexpected(other)),
            }
        }
        QueueCommand::Stop { ids } => {
            let ids = ids.into_iter().map(ItemId::new).collect();
            report_updated(client.queue_stop(ids).await, format).await
        }
    }
}

async fn report_removed(result: Result<Response, client::ClientError>, format: OutputFormat) -> Result<()> {
    match result.map_err(|e| anyhow!("{}", e))? {
        Response::Removed { removed } => {
            format_or_json(format, &serde_json::json!({"removed": removed}), || println!("Removed {} item(s)", removed))
        }
        other => Err(unexpected(other)),
    }
}

async fn report_updated(result: Result<Response, client::ClientError>, format: OutputFormat) -> Result<()> {
    match result.map_err(|e| anyhow!("{}", e))? {
        Response::Updated { updated } => {
            format_or_json(format, &serde_json::json!({"updated": updated}), || println!("Updated {} item(s)", updated))
        }
        other => Err(unexpected(other)),
    }
}

async fn logs(limit: usize, follow: bool, format: OutputFormat) -> Result<()> {
    let client = connect().await?;
    let mut offset: i64 = -1;
    loop {
        match client.log_tail(offset, limit, follow, 5_000).await.map_err(|e| anyhow!("{}", e))? {
            Response::LogLines { lines, offset: next } => {
                if lines.is_empty() && !follow {
                    format_or_json(format, &Vec::<String>::new(), || println!("(no log lines)"))?;
                    return Ok(());
                }
                for line in &lines {
                    println!("{}", line);
                }
                offset = next;
                if !follow {
                    return Ok(());
                }
            }
            other => return Err(unexpected(other)),
        }
    }
}

async fn insert(
    title: String,
    source_path: Option<String>,
    fingerprint: String,
    allow_duplicate: bool,
    priority: i32,
    format: OutputFormat,
) -> Result<()> {
    let client = connect().await?;
    match client.disc_insert(title, source_path, fingerprint, allow_duplicate, priority).await.map_err(|e| anyhow!("{}", e))? {
        Response::QueueItem { found: true, item: Some(item) } => format_or_json(format, &item, || {
            println!("Inserted item {} ({}) -> {}", item.id.get(), item.disc_title, item.status);
        }),
        Response::Error { message } => Err(anyhow!("{}", message)),
        other => Err(unexpected(other)),
    }
}

async fn db_health(format: OutputFormat) -> Result<()> {
    let client = connect().await?;
    match client.database_health().await.map_err(|e| anyhow!("{}", e))? {
        Response::DatabaseHealth {
            db_path,
            exists,
            readable,
            schema_version,
            columns_present,
            missing_columns,
            total_items,
            integrity_check,
            error,
        } => format_or_json(
            format,
            &serde_json::json!({
                "db_path": db_path,
                "exists": exists,
                "readable": readable,
                "schema_version": schema_version,
                "columns_present": columns_present,
                "missing_columns": missing_columns,
                "total_items": total_items,
                "integrity_check": integrity_check,
                "error": error,
            }),
            || {
                println!("Database: {}", db_path);
                println!("Exists: {}  Readable: {}  Schema: v{}", exists, readable, schema_version);
                println!("Items: {}  Integrity ok: {}", total_items, integrity_check);
                if !missing_columns.is_empty() {
                    println!("Missing columns: {}", missing_columns.join(", "));
                }
                if let Some(err) = &error {
                    println!("Error: {}", err);
                }
            },
        ),
        other => Err(unexpected(other)),
    }
}

fn unexpected(response: Response) -> anyhow::Error {
    anyhow!("unexpected response: {:?}", response)
}
