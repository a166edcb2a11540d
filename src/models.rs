use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_DOCKER_IMAGE: &str = "node:18-alpine";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Node,
    Python,
    Php,
}

impl Runtime {
    // Hard-coded contract with the scaffold: php-apache and wordpress images
    // serve HTTP on 80, the Node and Python scaffolds listen on 3000.
    pub fn container_port(&self) -> u16 {
        match self {
            Runtime::Php => 80,
            Runtime::Node | Runtime::Python => 3000,
        }
    }

    // PHP serves its landing page at /, the other scaffolds expose /health.
    pub fn health_endpoint(&self) -> &'static str {
        match self {
            Runtime::Php => "/",
            Runtime::Node | Runtime::Python => "/health",
        }
    }

    pub fn default_version(&self) -> &'static str {
        match self {
            Runtime::Node => "node18",
            Runtime::Python => "python311",
            Runtime::Php => "php82",
        }
    }
}

impl FromStr for Runtime {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Runtime::Node),
            "python" => Ok(Runtime::Python),
            "php" => Ok(Runtime::Php),
            other => Err(DeployError::UnknownRuntime(other.to_string())),
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runtime::Node => write!(f, "node"),
            Runtime::Python => write!(f, "python"),
            Runtime::Php => write!(f, "php"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boilerplate {
    Blank,
    Wordpress,
}

impl Default for Boilerplate {
    fn default() -> Self {
        Boilerplate::Blank
    }
}

// Durable site status owned by the panel's database; the coordinator only
// reports terminal transitions through the StatusStore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Deploying,
    Active,
    Stopped,
    Failed,
}

// Version tag to Docker image mapping, one pinned image per runtime.
pub fn docker_image(version: &str) -> &'static str {
    match version {
        "node18" => "node:18-alpine",
        "python311" => "python:3.11-slim",
        "php82" => "php:8.2-apache",
        // Unknown version strings fall back to the Node default
        _ => DEFAULT_DOCKER_IMAGE,
    }
}

pub fn friendly_version_label(version: &str) -> &str {
    match version {
        "node18" => "Node.js 18 (LTS)",
        "node20" => "Node.js 20 (LTS)",
        "node21" => "Node.js 21 (Current)",
        "php82" => "PHP 8.2",
        "php83" => "PHP 8.3",
        "python310" => "Python 3.10",
        "python311" => "Python 3.11",
        "python312" => "Python 3.12",
        other => other,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub site_id: i64,
    pub domain: String,
    pub runtime: Runtime,
    pub version: String,
    pub boilerplate: Boilerplate,
}

impl Site {
    pub fn new(
        site_id: i64,
        domain: impl Into<String>,
        runtime: Runtime,
        version: Option<String>,
        boilerplate: Option<Boilerplate>,
    ) -> Self {
        Site {
            site_id,
            domain: domain.into(),
            runtime,
            version: version.unwrap_or_else(|| runtime.default_version().to_string()),
            boilerplate: boilerplate.unwrap_or_default(),
        }
    }

    pub fn docker_image(&self) -> &'static str {
        docker_image(&self.version)
    }

    // Host-side port the reverse proxy forwards to. site_id values are
    // unique and monotonically issued by the panel database, so distinct
    // sites never collide; ids that would leave the u16 port space are
    // rejected rather than wrapped onto another site's port.
    pub fn upstream_port(&self, base_port: u16) -> Result<u16, DeployError> {
        u32::try_from(self.site_id)
            .ok()
            .and_then(|id| u32::from(base_port).checked_add(id))
            .and_then(|port| u16::try_from(port).ok())
            .ok_or(DeployError::SiteIdOutOfRange {
                site_id: self.site_id,
                base_port,
            })
    }
}
