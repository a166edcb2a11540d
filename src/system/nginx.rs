// Reverse-proxy provisioning: per-domain nginx server blocks written to
// sites-available and activated through a sites-enabled symlink.
use crate::error::DeployError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct NginxManager {
    available_dir: PathBuf,
    enabled_dir: PathBuf,
}

impl NginxManager {
    pub fn new(available_dir: PathBuf, enabled_dir: PathBuf) -> Self {
        NginxManager {
            available_dir,
            enabled_dir,
        }
    }

    fn available_path(&self, domain: &str) -> PathBuf {
        self.available_dir.join(format!("{}.conf", domain))
    }

    fn enabled_path(&self, domain: &str) -> PathBuf {
        self.enabled_dir.join(format!("{}.conf", domain))
    }

    // Upstream points at the site's deterministic host port. The ACME
    // well-known path stays reachable for certificate issuance, and dot-files
    // are never served.
    pub fn render_site_config(&self, domain: &str, data_dir: &Path, upstream_port: u16) -> String {
        let upstream = domain.replace('.', "_");
        format!(
            r#"upstream {upstream} {{
    server 127.0.0.1:{upstream_port};
    keepalive 64;
}}

server {{
    listen 80;
    listen [::]:80;
    server_name {domain} www.{domain};
    root {root};

    # Let's Encrypt
    location /.well-known/acme-challenge/ {{
        allow all;
    }}

    # Proxy to application
    location / {{
        proxy_pass http://{upstream};
        proxy_http_version 1.1;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_set_header Connection "";
        proxy_buffering off;
    }}

    # Deny access to sensitive files
    location ~ /\. {{
        deny all;
        access_log off;
        log_not_found off;
    }}

    access_log /var/log/nginx/{domain}.access.log;
    error_log /var/log/nginx/{domain}.error.log;
}}
"#,
            root = data_dir.display(),
        )
    }

    // Write the config to sites-available and (re)point the sites-enabled
    // symlink at it. An existing symlink is replaced, so re-deploys converge.
    pub async fn deploy_site_config(
        &self,
        domain: &str,
        data_dir: &Path,
        upstream_port: u16,
    ) -> Result<(), DeployError> {
        let config = self.render_site_config(domain, data_dir, upstream_port);
        let config_file = self.available_path(domain);
        fs::write(&config_file, config).await?;

        let symlink = self.enabled_path(domain);
        if fs::symlink_metadata(&symlink).await.is_ok() {
            fs::remove_file(&symlink).await?;
        }

        #[cfg(unix)]
        std::os::unix::fs::symlink(&config_file, &symlink)?;

        info!("Generated nginx config for {}", domain);
        Ok(())
    }

    pub async fn remove_enabled_symlink(&self, domain: &str) -> Result<(), DeployError> {
        let symlink = self.enabled_path(domain);
        if fs::symlink_metadata(&symlink).await.is_ok() {
            fs::remove_file(&symlink).await?;
            info!("Removed nginx symlink: {}", symlink.display());
        }
        Ok(())
    }

    pub async fn remove_available_config(&self, domain: &str) -> Result<(), DeployError> {
        let config_file = self.available_path(domain);
        if fs::metadata(&config_file).await.is_ok() {
            fs::remove_file(&config_file).await?;
            info!("Removed nginx config: {}", config_file.display());
        }
        Ok(())
    }

    // `nginx -t` over the complete live configuration. A broken config is
    // reported and never reloaded.
    pub async fn validate(&self) -> Result<(), DeployError> {
        let output = Command::new("nginx").arg("-t").output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            error!("Nginx config error: {}", stderr);
            return Err(DeployError::ProxyValidationFailure(stderr));
        }
        info!("Nginx config valid");
        Ok(())
    }

    pub async fn reload(&self) -> Result<(), DeployError> {
        self.validate().await?;

        let output = Command::new("systemctl").args(["reload", "nginx"]).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            error!("Failed to reload nginx: {}", stderr);
            return Err(DeployError::ProxyReloadFailure(stderr));
        }
        info!("Nginx reloaded");
        Ok(())
    }
}
