// Docker Compose lifecycle management for one site's container group.
use crate::error::DeployError;
use crate::state::{DeploymentPhase, DeploymentTracker};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Stopped,
    Error,
}

#[derive(Debug, Clone)]
pub struct DockerManager {
    domain: String,
    site_dir: PathBuf,
    compose_file: PathBuf,
}

impl DockerManager {
    pub fn new(domain: impl Into<String>, site_dir: PathBuf, compose_file: PathBuf) -> Self {
        DockerManager {
            domain: domain.into(),
            site_dir,
            compose_file,
        }
    }

    // The compose templates name the app container "<domain>-app"; the
    // remaining patterns cover names older compose releases generated.
    // Single point of change if the naming convention moves again.
    fn fallback_container_names(&self) -> Vec<String> {
        let flat = self.domain.replace('.', "");
        vec![
            format!("{}-app", self.domain),
            format!("{}-app-1", flat),
            format!("{}_app_1", flat),
        ]
    }

    pub fn app_container_name(&self) -> String {
        format!("{}-app", self.domain)
    }

    // Run `docker compose up -d`, streaming combined output into the
    // deployment log. Phase/progress updates from the stream are a
    // best-effort heuristic; the outcome is decided by the exit status alone.
    pub async fn start(&self, tracker: &DeploymentTracker) -> Result<(), DeployError> {
        tracker.set_phase(DeploymentPhase::PullingImage).await;
        tracker.set_progress(10).await;
        tracker.log(format!("Starting deployment for {}...", self.domain)).await;

        let mut child = Command::new("docker")
            .args(["compose", "-f"])
            .arg(&self.compose_file)
            .args(["up", "-d"])
            .current_dir(&self.site_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tokio::join!(
            self.stream_output(stdout, tracker),
            self.stream_output(stderr, tracker),
        );

        let status = child.wait().await?;
        if !status.success() {
            let code = status.code().unwrap_or(-1);
            tracker
                .log(format!("ERROR: Container startup failed with exit code {}", code))
                .await;
            error!("Failed to start container for {}", self.domain);
            return Err(DeployError::ContainerStartFailure(code));
        }

        tracker.set_phase(DeploymentPhase::InstallingDependencies).await;
        tracker.set_progress(85).await;
        tracker.log("Container started, waiting for application to be ready...").await;
        info!("Started container for {}", self.domain);
        Ok(())
    }

    async fn stream_output<R: AsyncRead + Unpin>(
        &self,
        pipe: Option<R>,
        tracker: &DeploymentTracker,
    ) {
        let Some(pipe) = pipe else { return };
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tracker.log(line).await;

            if line.contains("Pulling") || line.contains("Downloading") {
                tracker.set_phase(DeploymentPhase::PullingImage).await;
                tracker.bump_progress(5, 60).await;
            } else if line.contains("Creating") || line.contains("Starting") {
                tracker.set_phase(DeploymentPhase::StartingContainer).await;
                tracker.set_progress(70).await;
            } else if line.contains("Started") || line.contains("Created") {
                tracker.set_phase(DeploymentPhase::ContainerStarted).await;
                tracker.set_progress(80).await;
            }
        }
    }

    // Stop the site's containers. Stopping an already-stopped site is not an
    // error: `compose down` on nothing succeeds, and when the compose file is
    // gone we fall back to guessed container names and treat "no match" as
    // done.
    pub async fn stop(&self) -> Result<(), DeployError> {
        if self.compose_file.exists() {
            Command::new("docker")
                .args(["compose", "-f"])
                .arg(&self.compose_file)
                .arg("down")
                .current_dir(&self.site_dir)
                .output()
                .await?;
            info!("Stopped container for {} via compose", self.domain);
            return Ok(());
        }

        for name in self.fallback_container_names() {
            let output = Command::new("docker").args(["stop", &name]).output().await?;
            if output.status.success() {
                info!("Stopped container {} for {}", name, self.domain);
                Command::new("docker").args(["rm", &name]).output().await.ok();
                return Ok(());
            }
        }

        warn!("Could not find running container for {}, continuing with cleanup", self.domain);
        Ok(())
    }

    // Never raises: tool invocation failure maps to ContainerStatus::Error.
    pub async fn status(&self) -> ContainerStatus {
        let result = Command::new("docker")
            .args(["compose", "-f"])
            .arg(&self.compose_file)
            .args(["ps", "--quiet"])
            .current_dir(&self.site_dir)
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => {
                if String::from_utf8_lossy(&output.stdout).trim().is_empty() {
                    ContainerStatus::Stopped
                } else {
                    ContainerStatus::Running
                }
            }
            Ok(_) => ContainerStatus::Stopped,
            Err(e) => {
                error!("Failed to get container status for {}: {}", self.domain, e);
                ContainerStatus::Error
            }
        }
    }
}

// Check whether a container with the given name is up. Used by the health
// prober before it bothers the HTTP endpoint.
pub async fn container_is_up(name: &str) -> bool {
    let result = Command::new("docker")
        .args(["ps", "--filter", &format!("name={}", name), "--format", "{{.Status}}"])
        .output()
        .await;

    match result {
        Ok(output) => output.status.success() && String::from_utf8_lossy(&output.stdout).contains("Up"),
        Err(_) => false,
    }
}
