//! Cleanup command - Retention-based data removal.

use common::{AppResult, CleanupConfig};

use crate::cli::args::CleanupArgs;
use crate::config::Config;
use crate::manager::RepositoryManager;

/// Execute the cleanup command
pub async fn execute(args: CleanupArgs, config: Config) -> AppResult<()> {
    let cleanup = cleanup_config(&args, &config);
    let manager = RepositoryManager::from_config(&config).await?;

    let report = manager.cleanup_old_data(&cleanup).await?;
    manager.close().await?;

    println!(
        "removed {} activity logs older than {} days",
        report.activity_logs_removed, report.retention_days
    );
    Ok(())
}

/// The command line wins over the environment
fn cleanup_config(args: &CleanupArgs, config: &Config) -> CleanupConfig {
    CleanupConfig {
        activity_log_retention_days: args
            .retention_days
            .unwrap_or(config.cleanup.activity_log_retention_days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_configured_retention() {
        let config = Config::default();
        let args = CleanupArgs {
            retention_days: Some(90),
        };
        assert_eq!(cleanup_config(&args, &config).activity_log_retention_days, 90);

        let args = CleanupArgs {
            retention_days: None,
        };
        assert_eq!(
            cleanup_config(&args, &config).activity_log_retention_days,
            config.cleanup.activity_log_retention_days
        );
    }
}
