use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Unknown runtime: {0}")]
    UnknownRuntime(String),
    #[error("Template not found: {0}")]
    TemplateNotFound(PathBuf),
    #[error("Container startup failed with exit code {0}")]
    ContainerStartFailure(i32),
    #[error("Container did not become healthy within {0}s")]
    HealthTimeout(u64),
    #[error("Nginx config validation failed: {0}")]
    ProxyValidationFailure(String),
    #[error("Failed to reload nginx: {0}")]
    ProxyReloadFailure(String),
    #[error("Filesystem operation failed: {0}")]
    Filesystem(#[from] std::io::Error),
    #[error("A deployment is already in progress for {domain} (site {site_id})")]
    DeploymentInProgress { domain: String, site_id: i64 },
    #[error("Site id {site_id} does not fit the port space above base port {base_port}")]
    SiteIdOutOfRange { site_id: i64, base_port: u16 },
}
