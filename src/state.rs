use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

// Linear deployment state machine. `Failed` is reachable from any step;
// once `Completed` or `Failed` is set the state no longer changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentPhase {
    Initializing,
    CreatingDirectories,
    CreatingBoilerplate,
    GeneratingCompose,
    PullingImage,
    StartingContainer,
    ContainerStarted,
    InstallingDependencies,
    CheckingHealth,
    Healthy,
    ConfiguringNginx,
    Completed,
    Failed,
}

impl DeploymentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentPhase::Completed | DeploymentPhase::Failed)
    }
}

#[derive(Debug)]
struct DeploymentState {
    phase: DeploymentPhase,
    progress: u8,
    logs: Vec<String>,
}

// Snapshot handed to the panel's status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentView {
    pub phase: DeploymentPhase,
    pub progress: u8,
    pub logs: Vec<String>,
    pub completed: bool,
}

// Progress and log trail for one in-flight deployment. Cloned handles share
// the same state so the engine can write from its background task while the
// coordinator serves status queries.
#[derive(Debug, Clone)]
pub struct DeploymentTracker {
    inner: Arc<RwLock<DeploymentState>>,
}

impl DeploymentTracker {
    pub fn new() -> Self {
        DeploymentTracker {
            inner: Arc::new(RwLock::new(DeploymentState {
                phase: DeploymentPhase::Initializing,
                progress: 0,
                logs: Vec::new(),
            })),
        }
    }

    pub async fn set_phase(&self, phase: DeploymentPhase) {
        let mut state = self.inner.write().await;
        if !state.phase.is_terminal() {
            state.phase = phase;
        }
    }

    // Progress only ever moves forward within a run.
    pub async fn set_progress(&self, progress: u8) {
        let mut state = self.inner.write().await;
        if !state.phase.is_terminal() {
            state.progress = state.progress.max(progress.min(100));
        }
    }

    pub async fn bump_progress(&self, by: u8, cap: u8) {
        let mut state = self.inner.write().await;
        if !state.phase.is_terminal() {
            state.progress = state.progress.saturating_add(by).min(cap).max(state.progress);
        }
    }

    pub async fn log(&self, message: impl AsRef<str>) {
        let entry = format!("[{}] {}", Local::now().format("%H:%M:%S"), message.as_ref());
        tracing::debug!("deployment log: {}", entry);
        self.inner.write().await.logs.push(entry);
    }

    pub async fn complete(&self) {
        let mut state = self.inner.write().await;
        if !state.phase.is_terminal() {
            state.phase = DeploymentPhase::Completed;
            state.progress = 100;
        }
    }

    pub async fn fail(&self) {
        let mut state = self.inner.write().await;
        if !state.phase.is_terminal() {
            state.phase = DeploymentPhase::Failed;
        }
    }

    pub async fn phase(&self) -> DeploymentPhase {
        self.inner.read().await.phase
    }

    pub async fn view(&self) -> DeploymentView {
        let state = self.inner.read().await;
        DeploymentView {
            phase: state.phase,
            progress: state.progress,
            logs: state.logs.clone(),
            completed: state.phase.is_terminal(),
        }
    }

    // Joined log trail, stored as the failure detail for diagnostics.
    pub async fn log_dump(&self) -> String {
        self.inner.read().await.logs.join("\n")
    }
}

impl Default for DeploymentTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let tracker = DeploymentTracker::new();
        tracker.set_progress(40).await;
        tracker.set_progress(10).await;
        assert_eq!(tracker.view().await.progress, 40);
        tracker.bump_progress(5, 60).await;
        assert_eq!(tracker.view().await.progress, 45);
        tracker.bump_progress(50, 60).await;
        assert_eq!(tracker.view().await.progress, 60);
    }

    #[tokio::test]
    async fn test_terminal_state_is_immutable() {
        let tracker = DeploymentTracker::new();
        tracker.fail().await;
        tracker.set_phase(DeploymentPhase::CheckingHealth).await;
        tracker.set_progress(90).await;
        tracker.complete().await;
        let view = tracker.view().await;
        assert_eq!(view.phase, DeploymentPhase::Failed);
        assert_eq!(view.progress, 0);
        assert!(view.completed);
    }

    #[tokio::test]
    async fn test_completed_sets_full_progress() {
        let tracker = DeploymentTracker::new();
        tracker.set_progress(97).await;
        tracker.complete().await;
        let view = tracker.view().await;
        assert_eq!(view.phase, DeploymentPhase::Completed);
        assert_eq!(view.progress, 100);
    }

    #[tokio::test]
    async fn test_logs_are_timestamped_and_ordered() {
        let tracker = DeploymentTracker::new();
        tracker.log("first").await;
        tracker.log("second").await;
        let view = tracker.view().await;
        assert_eq!(view.logs.len(), 2);
        assert!(view.logs[0].starts_with('['));
        assert!(view.logs[0].contains("first"));
        assert!(view.logs[1].contains("second"));
    }
}
