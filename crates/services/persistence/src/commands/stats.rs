//! Stats command - Row counts and cache usage.

use common::AppResult;

use crate::config::Config;
use crate::manager::{ManagerStats, RepositoryManager};

/// Execute the stats command
pub async fn execute(config: Config) -> AppResult<()> {
    let manager = RepositoryManager::from_config(&config).await?;
    let stats = manager.stats().await;
    manager.close().await?;

    for line in render(&stats) {
        println!("{}", line);
    }
    Ok(())
}

fn render(stats: &ManagerStats) -> Vec<String> {
    let mut lines: Vec<String> = stats
        .entity_counts
        .iter()
        .map(|(table, count)| match count {
            -1 => format!("{}: unavailable", table),
            count => format!("{}: {}", table, count),
        })
        .collect();

    match &stats.cache {
        Some(cache) => lines.push(format!(
            "cache: {} items ({} active, {} expired)",
            cache.total_items, cache.active_items, cache.expired_items
        )),
        None => lines.push("cache: no statistics".to_string()),
    }
    lines
}
