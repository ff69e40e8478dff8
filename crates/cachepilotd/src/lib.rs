//! CachePilot Daemon library v2.2.0
//!
//! The maintenance pipeline and the host-side collaborators it drives.
//! The `cachepilotd` binary is a thin CLI over this crate.

pub mod alerts;
pub mod backups;
pub mod certs;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod health_checks;
pub mod lock;
pub mod metrics;
pub mod orchestrator;
pub mod reporting;
pub mod retention;
pub mod steps;
pub mod tenants;

pub use collaborators::Collaborators;
pub use config::Config;
pub use orchestrator::MaintenanceOrchestrator;
pub use steps::{MaintenanceRun, MaintenanceSummary, RunState, StepName, StepOutcome, StepPolicy};
