// sitepanel-engine: per-site Docker deployment orchestration.
//
// Turns a (domain, runtime, version, boilerplate) request into a running,
// nginx-proxied, health-checked container group, and can tear it down or
// migrate it later. The HTTP API, database, DNS and mail layers live in the
// panel itself and drive this crate through `DeploymentCoordinator`.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod models;
pub mod scaffold;
pub mod state;
pub mod system;
pub mod templates;

pub use config::Config;
pub use coordinator::{DeploymentCoordinator, DeploymentKey, MigrationReport, StatusStore};
pub use engine::{DeployEngine, DestroyReport};
pub use error::DeployError;
pub use models::{Boilerplate, Runtime, Site, SiteStatus};
pub use state::{DeploymentPhase, DeploymentTracker, DeploymentView};
