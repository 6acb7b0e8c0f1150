use perf_dashboard::config::DashboardConfig;
use perf_dashboard::data::sqlite::SqlitePool;
use perf_dashboard::{DashboardService, Result, ServiceSlot};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Settings {
    pub path: PathBuf,
    pub config: DashboardConfig,
}

// connection pool + service
pub fn build_service(settings: &Settings) -> Result<DashboardService> {
    let pool = SqlitePool::open(&settings.path, &settings.config.pool)?;
    info!(
        db = %settings.path.display(),
        max_connections = settings.config.pool.max_size,
        "opened dashboard database"
    );
    Ok(DashboardService::new(Arc::new(pool), settings.config.clone()))
}

/// Slot that (re)opens the database on demand.
pub fn service_slot(settings: Settings) -> ServiceSlot {
    ServiceSlot::new(move || build_service(&settings))
}
