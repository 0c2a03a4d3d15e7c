//! Application services for companion task orchestration.

mod config;
mod service;

pub use config::{TaskServiceConfig, TaskServiceConfigError};
pub use service::{
    AppliedResult, ProvisionTask, TaskService, TaskServiceError, TaskServiceResult,
};
