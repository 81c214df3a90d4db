//! CLI command definitions and handlers.
//!
//! Each subcommand is implemented as a function that takes the parsed
//! arguments and returns an `anyhow::Result<()>`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::db;
use crate::dedup::{Deduplicator, DetectionStart};
use crate::model::GroupStatus;

/// Music Curator CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database path (defaults to the configured library database)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a duplicate detection pass over the library
    Detect,
    /// List duplicate groups
    Groups {
        /// Lifecycle state to list: unresolved, resolved, ignored
        #[arg(long, default_value = "unresolved")]
        status: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one duplicate group with its members
    Show {
        /// Group id
        group_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge a group, keeping one entry and discarding the rest
    Merge {
        /// Group id
        group_id: i64,
        /// Entry to keep (defaults to the recommended master)
        #[arg(long)]
        keep: Option<i64>,
        /// Also delete the discarded files from disk
        #[arg(long)]
        delete_files: bool,
    },
    /// Merge every unresolved group into its recommended master
    MergeAll {
        /// Also delete the discarded files from disk
        #[arg(long)]
        delete_files: bool,
    },
    /// Mark a group as ignored (not actually duplicates)
    Ignore {
        /// Group id
        group_id: i64,
    },
    /// Score entries and recommend which copy to keep
    Best {
        /// Entry ids to compare
        #[arg(required = true)]
        entry_ids: Vec<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show duplicate statistics for the library
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = config::load();

    match &cli.command {
        Commands::Detect => rt.block_on(cmd_detect(cli.db.as_deref(), &config)),
        Commands::Groups { status, json } => {
            rt.block_on(cmd_groups(cli.db.as_deref(), &config, status, *json))
        }
        Commands::Show { group_id, json } => {
            rt.block_on(cmd_show(cli.db.as_deref(), &config, *group_id, *json))
        }
        Commands::Merge {
            group_id,
            keep,
            delete_files,
        } => rt.block_on(cmd_merge(
            cli.db.as_deref(),
            &config,
            *group_id,
            *keep,
            *delete_files,
        )),
        Commands::MergeAll { delete_files } => {
            rt.block_on(cmd_merge_all(cli.db.as_deref(), &config, *delete_files))
        }
        Commands::Ignore { group_id } => {
            rt.block_on(cmd_ignore(cli.db.as_deref(), &config, *group_id))
        }
        Commands::Best { entry_ids, json } => {
            rt.block_on(cmd_best(cli.db.as_deref(), &config, entry_ids, *json))
        }
        Commands::Stats { json } => rt.block_on(cmd_stats(cli.db.as_deref(), &config, *json)),
    }
}

async fn open_engine(db: Option<&Path>, config: &Config) -> anyhow::Result<Deduplicator> {
    let db_path = db.unwrap_or(&config.library.db_path);
    let url = db::db_url(Some(db_path));
    let pool = db::init_db(&url)
        .await
        .with_context(|| format!("opening database at {}", db_path.display()))?;
    Ok(Deduplicator::new(pool, config.dedup.clone()))
}

async fn cmd_detect(db: Option<&Path>, config: &Config) -> anyhow::Result<()> {
    let engine = open_engine(db, config).await?;

    let handle = match engine.start_detection() {
        DetectionStart::Started(handle) => handle,
        DetectionStart::AlreadyRunning(progress) => {
            anyhow::bail!(
                "a detection pass is already running ({}, {:.0}%)",
                progress.phase.as_str(),
                progress.percent()
            );
        }
    };

    loop {
        let progress = engine.progress();
        print!(
            "\r{} {:.0}% ({} groups)",
            progress.phase.as_str(),
            progress.percent(),
            progress.groups_found
        );
        use std::io::Write;
        let _ = std::io::stdout().flush();
        if !progress.running {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
    println!();

    let summary = handle.await.context("detection task panicked")??;
    println!(
        "Scanned {} entries: {} groups, {} duplicates",
        summary.total_entries, summary.groups_found, summary.duplicates_found
    );
    println!(
        "  exact: {}, fuzzy: {}, duration: {}",
        summary.exact_groups, summary.fuzzy_groups, summary.duration_groups
    );
    Ok(())
}

fn parse_status(status: &str) -> anyhow::Result<GroupStatus> {
    GroupStatus::parse(status)
        .ok_or_else(|| anyhow::anyhow!("unknown status {status:?} (expected unresolved, resolved, or ignored)"))
}

async fn cmd_groups(
    db: Option<&Path>,
    config: &Config,
    status: &str,
    json: bool,
) -> anyhow::Result<()> {
    let engine = open_engine(db, config).await?;
    let groups = engine.list_groups(parse_status(status)?).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    if groups.is_empty() {
        println!("No {status} groups.");
        return Ok(());
    }
    for group in &groups {
        println!(
            "#{} [{}] {} members - {}",
            group.id,
            group.detection_type,
            group.member_count,
            group.detection_reason.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_show(
    db: Option<&Path>,
    config: &Config,
    group_id: i64,
    json: bool,
) -> anyhow::Result<()> {
    let engine = open_engine(db, config).await?;
    let group = engine.get_group(group_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&group)?);
        return Ok(());
    }

    println!(
        "Group #{} [{}] - {} ({})",
        group.id,
        group.detection_type,
        group.detection_reason.as_deref().unwrap_or(""),
        group.status
    );
    for member in &group.members {
        let marker = if member.is_master { "*" } else { " " };
        println!(
            " {} {:>6.2}  {} - {} ({})",
            marker,
            member.quality_score,
            member.artist.as_deref().unwrap_or("?"),
            member.title.as_deref().unwrap_or("?"),
            member.path.as_deref().unwrap_or("entry deleted")
        );
    }
    Ok(())
}

async fn cmd_merge(
    db: Option<&Path>,
    config: &Config,
    group_id: i64,
    keep: Option<i64>,
    delete_files: bool,
) -> anyhow::Result<()> {
    let engine = open_engine(db, config).await?;

    let keep = match keep {
        Some(id) => id,
        None => {
            let group = engine.get_group(group_id).await?;
            group
                .master_entry_id
                .ok_or_else(|| anyhow::anyhow!("group {group_id} has no recommended master; pass --keep"))?
        }
    };

    let outcome = engine.merge(group_id, keep, delete_files).await?;
    println!(
        "Merged group #{}: kept entry {}, discarded {} entries, removed {} files",
        outcome.group_id,
        outcome.kept_entry_id,
        outcome.discarded_entry_ids.len(),
        outcome.deleted_files.len()
    );
    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

async fn cmd_merge_all(
    db: Option<&Path>,
    config: &Config,
    delete_files: bool,
) -> anyhow::Result<()> {
    let engine = open_engine(db, config).await?;

    let groups = engine.list_groups(GroupStatus::Unresolved).await?;
    let requests: Vec<(i64, i64)> = groups
        .iter()
        .filter_map(|g| g.master_entry_id.map(|master| (g.id, master)))
        .collect();

    if requests.is_empty() {
        println!("Nothing to merge.");
        return Ok(());
    }

    let outcome = engine.bulk_merge(&requests, delete_files).await;
    println!(
        "Merged {} groups, {} failed",
        outcome.merged.len(),
        outcome.failed.len()
    );
    for failure in &outcome.failed {
        eprintln!("group #{}: {}", failure.group_id, failure.error);
    }
    Ok(())
}

async fn cmd_ignore(db: Option<&Path>, config: &Config, group_id: i64) -> anyhow::Result<()> {
    let engine = open_engine(db, config).await?;
    engine.ignore(group_id).await?;
    println!("Group #{group_id} ignored.");
    Ok(())
}

async fn cmd_best(
    db: Option<&Path>,
    config: &Config,
    entry_ids: &[i64],
    json: bool,
) -> anyhow::Result<()> {
    let engine = open_engine(db, config).await?;
    let selection = engine.auto_select_best(entry_ids).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&selection)?);
        return Ok(());
    }

    for scored in &selection.scores {
        let marker = if scored.entry_id == selection.keep_entry_id {
            "*"
        } else {
            " "
        };
        println!(" {} entry {} -> {:.2}", marker, scored.entry_id, scored.quality_score);
    }
    Ok(())
}

async fn cmd_stats(db: Option<&Path>, config: &Config, json: bool) -> anyhow::Result<()> {
    let engine = open_engine(db, config).await?;
    let stats = engine.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Duplicate groups: {}", stats.total_groups);
    println!("  unresolved: {}", stats.unresolved);
    println!("  resolved:   {}", stats.resolved);
    println!("  ignored:    {}", stats.ignored);
    println!(
        "Potential space savings: {:.1} MB",
        stats.potential_space_savings_bytes as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_detect() {
        let cli = Cli::try_parse_from(["music-curator", "detect"]).unwrap();
        assert!(matches!(cli.command, Commands::Detect));
    }

    #[test]
    fn test_cli_parses_merge_with_keep() {
        let cli = Cli::try_parse_from(["music-curator", "merge", "3", "--keep", "7"]).unwrap();
        match cli.command {
            Commands::Merge {
                group_id,
                keep,
                delete_files,
            } => {
                assert_eq!(group_id, 3);
                assert_eq!(keep, Some(7));
                assert!(!delete_files);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_cli_global_db_flag() {
        let cli = Cli::try_parse_from(["music-curator", "stats", "--db", "/tmp/x.db"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
    }

    #[test]
    fn test_cli_best_requires_entries() {
        assert!(Cli::try_parse_from(["music-curator", "best"]).is_err());
    }

    #[test]
    fn test_parse_status_rejects_unknown() {
        assert!(parse_status("unresolved").is_ok());
        assert!(parse_status("bogus").is_err());
    }

    #[tokio::test]
    async fn test_open_engine_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cli.db");
        let config = Config::default();

        let engine = open_engine(Some(db_path.as_path()), &config).await.unwrap();
        assert!(db_path.exists());
        assert!(!engine.progress().running);
    }
}
