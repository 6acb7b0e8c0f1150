//! Lazily built, shared dashboard service.
//!
//! Concurrent first callers wait on the same build instead of each opening a
//! pool. A pool failure drops the cached service so the next call rebuilds it.

use crate::error::{DashboardError, Result};
use crate::service::dashboard::DashboardService;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

type Factory = Box<dyn Fn() -> Result<DashboardService> + Send + Sync>;

pub struct ServiceSlot {
    current: Mutex<Option<Arc<DashboardService>>>,
    factory: Factory,
}

impl ServiceSlot {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<DashboardService> + Send + Sync + 'static,
    {
        Self {
            current: Mutex::new(None),
            factory: Box::new(factory),
        }
    }

    /// The live service, building it if there is none.
    pub async fn get(&self) -> Result<Arc<DashboardService>> {
        let mut current = self.current.lock().await;
        if let Some(service) = current.as_ref() {
            return Ok(Arc::clone(service));
        }
        let service = Arc::new((self.factory)()?);
        info!("dashboard service initialised");
        *current = Some(Arc::clone(&service));
        Ok(service)
    }

    /// Drop `used` from the slot if `result` is a pool failure and `used` is
    /// still the cached instance. A late failure from a replaced service
    /// leaves the new one alone.
    pub async fn observe<T>(&self, used: &Arc<DashboardService>, result: &Result<T>) {
        if !matches!(result, Err(DashboardError::Pool(_))) {
            return;
        }
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|live| Arc::ptr_eq(live, used)) {
            *current = None;
            warn!("dashboard service invalidated after pool failure");
        }
    }
}
