use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Filesystem layout
    pub sites_dir: PathBuf,
    pub templates_dir: PathBuf,

    // Reverse proxy
    pub nginx_available_dir: PathBuf,
    pub nginx_enabled_dir: PathBuf,

    // Port assignment: upstream port = base_port + site_id
    pub base_port: u16,

    // Health probing
    pub health_timeout: Duration,
    pub health_poll_interval: Duration,

    // How long a finished deployment stays queryable before retirement
    pub retire_after: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Config {
            sites_dir: env::var("SITES_DIR")
                .unwrap_or_else(|_| "/srv/sitepanel/sites".to_string())
                .into(),
            templates_dir: env::var("TEMPLATES_DIR")
                .unwrap_or_else(|_| "/etc/sitepanel/templates".to_string())
                .into(),
            nginx_available_dir: env::var("NGINX_AVAILABLE_DIR")
                .unwrap_or_else(|_| "/etc/nginx/sites-available".to_string())
                .into(),
            nginx_enabled_dir: env::var("NGINX_ENABLED_DIR")
                .unwrap_or_else(|_| "/etc/nginx/sites-enabled".to_string())
                .into(),
            base_port: env::var("BASE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            health_timeout: Duration::from_secs(
                env::var("HEALTH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
            health_poll_interval: Duration::from_secs(
                env::var("HEALTH_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            ),
            retire_after: Duration::from_secs(
                env::var("DEPLOYMENT_RETIRE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
