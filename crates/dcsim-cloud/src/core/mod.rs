//! Components of the cloud model.

pub mod broker;
pub mod common;
pub mod config;
pub mod datacenter;
pub mod events;
pub mod host;
pub mod placement;
pub mod record;
pub mod resource;
pub mod resource_pool;
pub mod task;
pub mod task_scheduler;
pub mod utilization;
pub mod vm;
