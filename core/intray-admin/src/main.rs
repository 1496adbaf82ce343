//! intray-admin: operator tool for tmux-intray storage.
//!
//! ## Subcommands
//!
//! - `verify`: Compare the flat file against the SQLite database
//! - `seed`: Copy flat-file history into an empty database
//! - `cleanup`: Remove old dismissed notifications from the configured backend
//! - `groups`: Print active notifications grouped by session, pane, message...

mod error;
mod logging;

use clap::{Parser, Subcommand};
use intray_core::escape::escape_message;
use intray_core::{
    group_notifications, open_backend, parse_criteria, parse_window, ConsistencyReport,
    DedupOptions, DualWriter, Filter, GroupByMode, GroupResult, IntrayConfig, SqliteStorage,
    StorageBackend, TsvStorage,
};
use std::path::PathBuf;

use error::AdminError;

#[derive(Parser)]
#[command(name = "intray-admin")]
#[command(about = "Verify and maintain tmux-intray notification storage")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $TMUX_INTRAY_CONFIG_PATH or the XDG location)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the state directory from config
    #[arg(long, global = true, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare flat-file and SQLite storage without modifying either
    Verify {
        /// Records to compare field by field (0 compares all)
        #[arg(long, value_name = "N")]
        sample: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy flat-file records into the SQLite database if it is empty
    Seed,

    /// Remove dismissed notifications older than N days
    Cleanup {
        /// Age threshold in days (defaults to auto_cleanup_days)
        #[arg(long, value_name = "N")]
        days: Option<u32>,

        /// Only report how many notifications would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Group active notifications
    Groups {
        /// none | session | window | pane | level | message
        #[arg(long, value_name = "MODE")]
        by: String,

        /// Dedup criteria for message grouping
        #[arg(long, value_name = "CRITERIA")]
        criteria: Option<String>,

        /// Dedup time window for message grouping, e.g. 5m
        #[arg(long, value_name = "DURATION")]
        window: Option<String>,

        /// Print the groups as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            let _guard = logging::init(None);
            tracing::error!(error = %err, "intray-admin: failed to load config");
            std::process::exit(err.exit_code());
        }
    };
    let log_dir = config.log_dir();
    let _logging_guard = logging::init(logging::file_log_dir(&log_dir));

    if let Err(err) = run(cli.command, &config) {
        match err {
            AdminError::Inconsistent => tracing::warn!("intray-admin: {}", err),
            _ => tracing::error!(error = %err, "intray-admin failed"),
        }
        std::process::exit(err.exit_code());
    }
}

fn load_config(cli: &Cli) -> Result<IntrayConfig, AdminError> {
    let mut config = IntrayConfig::load(cli.config.clone())?;
    if let Some(state_dir) = &cli.state_dir {
        config.state_dir = state_dir.clone();
    }
    Ok(config)
}

fn run(command: Commands, config: &IntrayConfig) -> Result<(), AdminError> {
    match command {
        Commands::Verify { sample, json } => verify(config, sample, json),
        Commands::Seed => seed(config),
        Commands::Cleanup { days, dry_run } => cleanup(config, days, dry_run),
        Commands::Groups {
            by,
            criteria,
            window,
            json,
        } => groups(config, &by, criteria.as_deref(), window.as_deref(), json),
    }
}

/// Flat file as primary, SQLite as secondary, regardless of the configured
/// backend. Nothing is seeded here.
fn open_pair(config: &IntrayConfig) -> Result<DualWriter, AdminError> {
    let tsv = TsvStorage::from_config(config)?;
    let sqlite = SqliteStorage::from_config(config)?;
    Ok(DualWriter::new(
        Box::new(tsv),
        Box::new(sqlite),
        config.dual_options(),
    ))
}

fn verify(config: &IntrayConfig, sample: Option<usize>, json: bool) -> Result<(), AdminError> {
    let dual = open_pair(config)?;
    let report = match sample {
        Some(sample) => dual.verify_consistency(sample)?,
        None => dual.verify_consistency_default()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }

    if report.consistent {
        Ok(())
    } else {
        Err(AdminError::Inconsistent)
    }
}

fn seed(config: &IntrayConfig) -> Result<(), AdminError> {
    let dual = open_pair(config)?;
    let seeded = dual.seed_secondary_if_empty()?;
    if seeded == 0 {
        println!("secondary not empty or nothing to copy; no records seeded");
    } else {
        println!("seeded {} records into {}", seeded, config.db_path().display());
    }
    Ok(())
}

fn cleanup(config: &IntrayConfig, days: Option<u32>, dry_run: bool) -> Result<(), AdminError> {
    let storage = open_backend(config)?;
    let days = days.unwrap_or(config.auto_cleanup_days);
    let removed = storage.cleanup(days, dry_run)?;
    tracing::info!(backend = storage.name(), days, dry_run, removed, "cleanup finished");

    let verb = if dry_run { "would remove" } else { "removed" };
    println!(
        "{} {} dismissed notifications older than {} days",
        verb, removed, days
    );
    Ok(())
}

fn groups(
    config: &IntrayConfig,
    by: &str,
    criteria: Option<&str>,
    window: Option<&str>,
    json: bool,
) -> Result<(), AdminError> {
    let dedup = dedup_options(config, criteria, window)?;
    let storage = open_backend(config)?;
    let notifications = storage.list(&Filter::active())?;
    let result = group_notifications(&notifications, GroupByMode::parse(by), &dedup);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_groups(&result));
    }
    Ok(())
}

/// Config dedup settings with command-line overrides applied.
fn dedup_options(
    config: &IntrayConfig,
    criteria: Option<&str>,
    window: Option<&str>,
) -> Result<DedupOptions, AdminError> {
    let mut options = config.dedup_options()?;
    if let Some(criteria) = criteria {
        options.criteria = parse_criteria(criteria);
    }
    if let Some(window) = window {
        options.window = parse_window(window)?;
    }
    Ok(options)
}

fn render_report(report: &ConsistencyReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "records: primary {} / secondary {}\n",
        report.primary_count, report.secondary_count
    ));
    out.push_str(&format!(
        "active:  primary {} / secondary {}\n",
        report.primary_active_count, report.secondary_active_count
    ));
    if !report.missing_in_secondary.is_empty() {
        out.push_str(&format!(
            "missing in secondary: {}\n",
            join_ids(&report.missing_in_secondary)
        ));
    }
    if !report.missing_in_primary.is_empty() {
        out.push_str(&format!(
            "missing in primary: {}\n",
            join_ids(&report.missing_in_primary)
        ));
    }
    out.push_str(&format!("sampled: {}\n", report.sampled_records));
    for diff in &report.record_diffs {
        for field in &diff.fields {
            out.push_str(&format!(
                "  id {} {}: {:?} != {:?}\n",
                diff.id, field.field, field.primary, field.secondary
            ));
        }
    }
    if !report.secondary_failures.is_empty() {
        out.push_str(&format!(
            "secondary failures: {}\n",
            report.secondary_failures.len()
        ));
    }
    out.push_str(if report.consistent {
        "status: consistent\n"
    } else {
        "status: INCONSISTENT\n"
    });
    out
}

fn render_groups(result: &GroupResult) -> String {
    let mut out = format!(
        "{} notifications, {} unread, by {}\n",
        result.total_count,
        result.total_unread,
        result.mode.as_str()
    );
    for group in &result.groups {
        out.push_str(&format!(
            "{:>5} {:>5}  {}\n",
            group.count,
            group.unread_count,
            escape_message(&group.display_name)
        ));
    }
    out
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use intray_core::{Criteria, NewNotification, NotificationLevel};
    use std::time::Duration;

    #[test]
    fn parses_verify_flags() {
        let cli = Cli::try_parse_from(["intray-admin", "verify", "--sample", "0", "--json"])
            .expect("parse verify");
        match cli.command {
            Commands::Verify { sample, json } => {
                assert_eq!(sample, Some(0));
                assert!(json);
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "intray-admin",
            "cleanup",
            "--days",
            "7",
            "--dry-run",
            "--state-dir",
            "/tmp/intray",
        ])
        .expect("parse cleanup");
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/intray")));
        assert!(matches!(
            cli.command,
            Commands::Cleanup {
                days: Some(7),
                dry_run: true
            }
        ));
    }

    #[test]
    fn groups_requires_mode() {
        assert!(Cli::try_parse_from(["intray-admin", "groups"]).is_err());
    }

    #[test]
    fn command_line_overrides_dedup_config() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config = IntrayConfig::for_state_dir(temp_dir.path());

        let options =
            dedup_options(&config, Some("message_level"), Some("90s")).expect("options");
        assert_eq!(options.criteria, Criteria::MessageLevel);
        assert_eq!(options.window, Duration::from_secs(90));

        assert!(dedup_options(&config, None, Some("soon")).is_err());
    }

    #[test]
    fn verify_flags_unseeded_database() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config = IntrayConfig::for_state_dir(temp_dir.path());
        TsvStorage::from_config(&config)
            .expect("open tsv")
            .add(NewNotification::new("only in tsv", NotificationLevel::Info))
            .expect("add");

        let err = verify(&config, Some(0), true).expect_err("drift");
        assert_eq!(err.exit_code(), 2);

        seed(&config).expect("seed");
        verify(&config, Some(0), true).expect("consistent after seed");
    }

    #[test]
    fn renders_group_names_on_one_line() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let storage = TsvStorage::new(
            temp_dir.path().join("notifications.tsv"),
            temp_dir.path().join("notifications.seq"),
        )
        .expect("open tsv");
        storage
            .add(NewNotification::new("two\nlines", NotificationLevel::Info))
            .expect("add");
        let notifications = storage.list(&Filter::active()).expect("list");

        let result =
            group_notifications(&notifications, GroupByMode::Message, &DedupOptions::default());
        let rendered = render_groups(&result);
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.contains("two\\nlines"));
    }
}
