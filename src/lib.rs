pub mod config;
pub mod error;

pub mod data {
    pub mod executor;
    pub mod projection;
    pub mod sqlite;
    pub mod utils;
}

pub mod query {
    pub mod input;
    pub mod intent;
    pub mod merge;
    pub mod synth;
}

pub mod plot {
    pub mod series;
}

pub mod service {
    pub mod dashboard;
    pub mod slot;
}

pub use error::{DashboardError, Result, ValidationError};
pub use service::dashboard::DashboardService;
pub use service::slot::ServiceSlot;
