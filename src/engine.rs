// One DeployEngine instance owns one deployment attempt for one site:
// directories, scaffold, compose manifest, container lifecycle, health
// probing and nginx wiring, with progress reported through its tracker.
use crate::config::Config;
use crate::error::DeployError;
use crate::models::Site;
use crate::scaffold;
use crate::state::{DeploymentPhase, DeploymentTracker};
use crate::system::docker::{ContainerStatus, DockerManager};
use crate::system::health::HealthProber;
use crate::system::nginx::NginxManager;
use crate::templates::{self, ComposeContext};
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct DeployEngine {
    site: Site,
    config: Config,
    site_dir: PathBuf,
    data_dir: PathBuf,
    compose_file: PathBuf,
    upstream_port: u16,
    tracker: DeploymentTracker,
    docker: DockerManager,
    nginx: NginxManager,
}

// Outcome of a destroy run. Cleanup is best-effort: every step runs, errors
// are collected, and only the critical ones (container stop, config file
// removal, site directory removal) flip the overall result.
#[derive(Debug, Default)]
pub struct DestroyReport {
    pub critical_errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl DestroyReport {
    pub fn is_ok(&self) -> bool {
        self.critical_errors.is_empty()
    }
}

impl DeployEngine {
    pub fn new(site: Site, config: Config) -> Result<Self, DeployError> {
        let site_dir = config.sites_dir.join(&site.domain);
        let data_dir = site_dir.join("data");
        let compose_file = site_dir.join("compose.yml");
        let upstream_port = site.upstream_port(config.base_port)?;
        let docker = DockerManager::new(site.domain.clone(), site_dir.clone(), compose_file.clone());
        let nginx = NginxManager::new(
            config.nginx_available_dir.clone(),
            config.nginx_enabled_dir.clone(),
        );

        info!(
            "DeployEngine initialized: domain={}, runtime={}, version={}, boilerplate={:?}, image={}",
            site.domain,
            site.runtime,
            site.version,
            site.boilerplate,
            site.docker_image()
        );

        Ok(DeployEngine {
            site,
            config,
            site_dir,
            data_dir,
            compose_file,
            upstream_port,
            tracker: DeploymentTracker::new(),
            docker,
            nginx,
        })
    }

    pub fn tracker(&self) -> DeploymentTracker {
        self.tracker.clone()
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn upstream_port(&self) -> u16 {
        self.upstream_port
    }

    async fn create_directories(&self) -> Result<(), DeployError> {
        fs::create_dir_all(&self.data_dir).await?;
        info!("Created directories for {}", self.site.domain);
        Ok(())
    }

    async fn generate_compose_file(&self) -> Result<(), DeployError> {
        let template_name =
            templates::select_compose_template(self.site.runtime, self.site.boilerplate);
        let ctx = ComposeContext {
            domain: &self.site.domain,
            data_dir: &self.data_dir,
            docker_image: self.site.docker_image(),
            upstream_port: self.upstream_port,
            container_port: self.site.runtime.container_port(),
        };
        templates::render_compose_file(&self.config.templates_dir, template_name, &ctx, &self.compose_file)
            .await
    }

    fn health_prober(&self) -> HealthProber {
        HealthProber {
            port: self.upstream_port,
            endpoint: self.site.runtime.health_endpoint().to_string(),
            timeout: self.config.health_timeout,
            poll_interval: self.config.health_poll_interval,
            container_name: Some(self.docker.app_container_name()),
        }
    }

    // Full deployment. The container is started and health-checked before any
    // nginx config exists, so live traffic is never pointed at an application
    // that has not answered a readiness probe.
    pub async fn deploy(&self) -> Result<(), DeployError> {
        match self.run_deploy().await {
            Ok(()) => {
                self.tracker.complete().await;
                self.tracker
                    .log(format!(
                        "Successfully deployed {} on port {}",
                        self.site.domain, self.upstream_port
                    ))
                    .await;
                info!("Successfully deployed {} on port {}", self.site.domain, self.upstream_port);
                Ok(())
            }
            Err(e) => {
                self.tracker.log(format!("ERROR: Deployment failed: {}", e)).await;
                self.tracker.fail().await;
                error!("Deployment failed for {}: {}", self.site.domain, e);
                Err(e)
            }
        }
    }

    async fn run_deploy(&self) -> Result<(), DeployError> {
        self.tracker.set_phase(DeploymentPhase::Initializing).await;
        self.tracker.log(format!("Starting deployment for {}", self.site.domain)).await;

        self.tracker.set_phase(DeploymentPhase::CreatingDirectories).await;
        self.tracker.set_progress(5).await;
        self.create_directories().await?;
        self.tracker.log("Created site directories").await;

        self.tracker.set_phase(DeploymentPhase::CreatingBoilerplate).await;
        self.tracker
            .log(format!("Creating {:?} boilerplate code", self.site.boilerplate))
            .await;
        scaffold::create_boilerplate(&self.site, &self.data_dir).await?;

        self.tracker.set_phase(DeploymentPhase::GeneratingCompose).await;
        self.tracker.log("Generating docker-compose configuration").await;
        self.generate_compose_file().await?;

        self.docker.start(&self.tracker).await?;

        self.health_prober().wait_healthy(&self.tracker).await?;

        self.tracker.set_phase(DeploymentPhase::ConfiguringNginx).await;
        self.tracker.set_progress(97).await;
        self.tracker.log("Configuring nginx reverse proxy").await;
        self.nginx
            .deploy_site_config(&self.site.domain, &self.data_dir, self.upstream_port)
            .await?;
        self.nginx.reload().await?;

        Ok(())
    }

    // Reverse provisioning. Does not abort on a failed step: the proxy may
    // already be in an inconsistent state and cleanup has to keep going.
    // The enabled symlink goes first so a later reload never references a
    // file that is mid-removal.
    pub async fn destroy(&self) -> DestroyReport {
        let mut report = DestroyReport::default();

        if let Err(e) = self.docker.stop().await {
            let msg = format!("Failed to stop container: {}", e);
            error!("{}", msg);
            report.critical_errors.push(msg);
        }

        if let Err(e) = self.nginx.remove_enabled_symlink(&self.site.domain).await {
            let msg = format!("Failed to remove nginx symlink: {}", e);
            error!("{}", msg);
            report.warnings.push(msg);
        }

        if let Err(e) = self.nginx.remove_available_config(&self.site.domain).await {
            let msg = format!("Failed to remove nginx config: {}", e);
            error!("{}", msg);
            report.critical_errors.push(msg);
        }

        match self.nginx.reload().await {
            Ok(()) => info!("Reloaded nginx after removing {}", self.site.domain),
            Err(e) => {
                let msg = format!("Nginx reload failed: {}", e);
                warn!("{}", msg);
                report.warnings.push(msg);
            }
        }

        if fs::metadata(&self.site_dir).await.is_ok() {
            if let Err(e) = fs::remove_dir_all(&self.site_dir).await {
                let msg = format!("Failed to remove site directory: {}", e);
                error!("{}", msg);
                report.critical_errors.push(msg);
            } else {
                info!("Removed site directory: {}", self.site_dir.display());
            }
        }

        if report.is_ok() {
            info!("Successfully destroyed site {}", self.site.domain);
        } else {
            error!(
                "Destruction of {} had errors: {}",
                self.site.domain,
                report.critical_errors.join("; ")
            );
        }
        report
    }

    // Re-apply current templates and scaffolds to an already-deployed site
    // and restart it. The nginx config is assumed unchanged across a
    // migration, and no health probe is re-run.
    pub async fn migrate(&self) -> Result<(), DeployError> {
        info!("Migrating existing deployment for {}", self.site.domain);

        self.docker.stop().await?;
        scaffold::create_boilerplate(&self.site, &self.data_dir).await?;
        self.generate_compose_file().await?;
        self.docker.start(&self.tracker).await?;

        info!("Successfully migrated {}", self.site.domain);
        Ok(())
    }

    pub async fn stop_container(&self) -> Result<(), DeployError> {
        self.docker.stop().await
    }

    pub async fn start_container(&self) -> Result<(), DeployError> {
        self.docker.start(&self.tracker).await
    }

    pub async fn container_status(&self) -> ContainerStatus {
        self.docker.status().await
    }
}
