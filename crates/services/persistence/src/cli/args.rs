//! CLI argument definitions.

use clap::{Parser, Subcommand};

/// Persistence maintenance for the project/task platform
#[derive(Parser, Debug)]
#[command(name = "persistence")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run database migrations
    Migrate(MigrateArgs),

    /// Check database and repository health
    Health,

    /// Print row counts and cache statistics
    Stats,

    /// Remove data past its retention window
    Cleanup(CleanupArgs),
}

/// Arguments for the migrate command
#[derive(Parser, Debug)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub action: MigrateAction,
}

/// Migration actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateAction {
    /// Run pending migrations
    Up,
    /// Rollback last migration
    Down,
    /// Show migration status
    Status,
    /// Drop all tables and re-run every migration
    Fresh,
}

/// Arguments for the cleanup command
#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Days of activity logs to keep (defaults to ACTIVITY_LOG_RETENTION_DAYS)
    #[arg(long)]
    pub retention_days: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_migrate_actions() {
        let cli = Cli::try_parse_from(["persistence", "migrate", "status"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Migrate(MigrateArgs {
                action: MigrateAction::Status
            })
        ));
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["persistence", "stats", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Stats));
    }

    #[test]
    fn cleanup_takes_retention() {
        let cli = Cli::try_parse_from(["persistence", "cleanup", "--retention-days", "7"]).unwrap();
        match cli.command {
            Commands::Cleanup(args) => assert_eq!(args.retention_days, Some(7)),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn unknown_migrate_action_is_rejected() {
        assert!(Cli::try_parse_from(["persistence", "migrate", "sideways"]).is_err());
    }
}
