//! One-off data repair and seeding tasks run by `shop-maintenance <task>`.

pub mod category_cleanup;
pub mod image_mapping;
pub mod stock_reconciliation;

use crate::config::AppConfig;
use crate::database::MongoDB;
use crate::seeds;
use crate::utils::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    ReconcileStock,
    MapImages,
    CleanupCategories,
    Seed,
}

impl Task {
    pub const ALL: [Task; 4] = [Task::ReconcileStock, Task::MapImages, Task::CleanupCategories, Task::Seed];

    pub fn name(&self) -> &'static str {
        match self {
            Task::ReconcileStock => "reconcile-stock",
            Task::MapImages => "map-images",
            Task::CleanupCategories => "cleanup-categories",
            Task::Seed => "seed",
        }
    }

    pub fn parse(name: &str) -> Option<Task> {
        Task::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// Runs `task` and returns a one-line summary. `args` are the positional
/// arguments after the task name.
pub async fn run(db: &MongoDB, config: &AppConfig, task: Task, args: &[String]) -> AppResult<String> {
    log::info!("🛠️ Running {}", task.name());
    let summary = match task {
        Task::ReconcileStock => stock_reconciliation::run(db).await?.to_string(),
        Task::MapImages => {
            let dir = args.first().map(String::as_str);
            image_mapping::run(db, &config.upload_dir, dir).await?.to_string()
        }
        Task::CleanupCategories => category_cleanup::run(db).await?.to_string(),
        Task::Seed => seeds::seed_sample_data(db).await?.to_string(),
    };
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_names_round_trip() {
        for task in Task::ALL {
            assert_eq!(Task::parse(task.name()), Some(task));
        }
        assert_eq!(Task::parse("reindex"), None);
        assert_eq!(Task::parse(""), None);
    }
}
