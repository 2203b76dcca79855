//! Health command - Database ping and per-repository checks.

use common::{AppError, AppResult};

use crate::config::Config;
use crate::manager::{HealthStatus, RepositoryManager};

/// Execute the health command
pub async fn execute(config: Config) -> AppResult<()> {
    let manager = RepositoryManager::from_config(&config).await?;

    manager.health().await?;
    println!("database: healthy");

    let report = manager.repository_health().await;
    let mut failing = 0;
    for (repository, health) in &report {
        match health.status {
            HealthStatus::Healthy => println!("{}: healthy", repository),
            HealthStatus::Unhealthy => {
                failing += 1;
                println!(
                    "{}: unhealthy ({})",
                    repository,
                    health.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    manager.close().await?;

    if failing > 0 {
        return Err(AppError::internal(format!(
            "{} of {} repositories unhealthy",
            failing,
            report.len()
        )));
    }
    Ok(())
}
