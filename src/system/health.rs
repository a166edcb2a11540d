// Readiness probing: wait for the container to come up and for the app
// behind it to answer HTTP. The long default timeout (300s, set in Config)
// absorbs first-time image pulls and npm/pip installs.
use crate::error::DeployError;
use crate::state::{DeploymentPhase, DeploymentTracker};
use crate::system::docker;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct HealthProber {
    pub port: u16,
    pub endpoint: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    // When set, the probe first requires this container to report "Up".
    // Left unset in tests that stand in their own HTTP listener.
    pub container_name: Option<String>,
}

impl HealthProber {
    pub async fn wait_healthy(&self, tracker: &DeploymentTracker) -> Result<(), DeployError> {
        tracker.set_phase(DeploymentPhase::CheckingHealth).await;
        tracker.set_progress(90).await;
        tracker
            .log(format!(
                "Waiting for container to become healthy (timeout={}s)...",
                self.timeout.as_secs()
            ))
            .await;

        let client = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{}{}", self.port, self.endpoint);

        let started = Instant::now();
        let mut attempt: u32 = 0;
        while started.elapsed() < self.timeout {
            attempt += 1;

            let container_up = match &self.container_name {
                Some(name) => docker::container_is_up(name).await,
                None => true,
            };

            if container_up {
                // Any HTTP response counts as alive, error statuses included:
                // the web server answered. Only connection-level failures mean
                // the app is not ready yet.
                // Bounded per-request timeout so one hung probe cannot eat
                // the whole deployment window.
                match client.get(&url).timeout(Duration::from_secs(2)).send().await {
                    Ok(_) => {
                        tracker
                            .log(format!(
                                "Container is healthy and responding on port {}",
                                self.port
                            ))
                            .await;
                        info!("Container is healthy and responding on port {}", self.port);
                        tracker.set_phase(DeploymentPhase::Healthy).await;
                        tracker.set_progress(95).await;
                        return Ok(());
                    }
                    Err(e) => {
                        if attempt % 10 == 0 {
                            debug!("Health endpoint not ready: {}", e);
                            tracker
                                .log(format!(
                                    "Waiting for application to start responding on port {}...",
                                    self.port
                                ))
                                .await;
                        }
                    }
                }
            } else if attempt % 10 == 0 {
                tracker.log("Waiting for container to start...").await;
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        tracker
            .log(format!(
                "ERROR: Container did not become healthy within {}s",
                self.timeout.as_secs()
            ))
            .await;
        error!("Container did not become healthy within {}s", self.timeout.as_secs());
        Err(DeployError::HealthTimeout(self.timeout.as_secs()))
    }
}
