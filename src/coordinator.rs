// Runs deployments on background tasks and keeps them queryable while they
// are live. Terminal site status is persisted through the injected
// StatusStore; phase/progress/log detail stays in-process and is retired a
// grace window after completion so late pollers still see the final state.
use crate::config::Config;
use crate::engine::{DeployEngine, DestroyReport};
use crate::error::DeployError;
use crate::models::{Site, SiteStatus};
use crate::state::{DeploymentTracker, DeploymentView};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{error, info, warn};

pub type DeploymentKey = (i64, i64); // (domain_id, site_id)

// Persistence callback owned by the panel: the coordinator reports terminal
// transitions (active / failed / stopped) and never touches the database
// itself. Failure detail carries the joined deployment log for diagnosis.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn set_site_status(&self, site_id: i64, status: SiteStatus, detail: Option<String>);
}

struct DeploymentEntry {
    tracker: DeploymentTracker,
    finished_at: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub migrated: usize,
    pub failed: usize,
    pub failures: Vec<(String, String)>, // (domain, reason)
}

#[derive(Clone)]
pub struct DeploymentCoordinator {
    config: Config,
    status_store: Arc<dyn StatusStore>,
    registry: Arc<RwLock<HashMap<DeploymentKey, DeploymentEntry>>>,
    // Serializes deploy/stop/restart/destroy/migrate against one site. The
    // registry alone would only catch concurrent deploys.
    site_locks: Arc<Mutex<HashMap<DeploymentKey, Arc<Mutex<()>>>>>,
}

impl DeploymentCoordinator {
    pub fn new(config: Config, status_store: Arc<dyn StatusStore>) -> Self {
        DeploymentCoordinator {
            config,
            status_store,
            registry: Arc::new(RwLock::new(HashMap::new())),
            site_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn site_lock(&self, key: DeploymentKey) -> Arc<Mutex<()>> {
        let mut locks = self.site_locks.lock().await;
        // A lock only held by the map itself belongs to a site with no
        // in-flight operation; prune those so the map does not grow with
        // every site ever touched.
        locks.retain(|k, lock| *k == key || Arc::strong_count(lock) > 1);
        locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    // Drop entries whose grace window has elapsed. Runs on the same
    // synchronized path as insertion and lookup; nothing sleeps just to
    // delete an entry.
    async fn evict_expired(&self) {
        let retire_after = self.config.retire_after;
        let mut registry = self.registry.write().await;
        registry.retain(|_, entry| match entry.finished_at {
            Some(finished) => finished.elapsed() < retire_after,
            None => true,
        });
    }

    // Launch a deployment on a background task and register it for status
    // polling. Refuses a second in-flight deployment for the same site.
    pub async fn begin_deploy(
        &self,
        domain_id: i64,
        site: Site,
    ) -> Result<DeploymentKey, DeployError> {
        self.evict_expired().await;

        let key = (domain_id, site.site_id);
        let engine = DeployEngine::new(site, self.config.clone())?;
        let tracker = engine.tracker();

        {
            let mut registry = self.registry.write().await;
            if let Some(existing) = registry.get(&key) {
                if !existing.tracker.view().await.completed {
                    let site = engine.site();
                    warn!(
                        "Rejecting deploy for {}: deployment already in progress",
                        site.domain
                    );
                    return Err(DeployError::DeploymentInProgress {
                        domain: site.domain.clone(),
                        site_id: site.site_id,
                    });
                }
            }
            registry.insert(
                key,
                DeploymentEntry {
                    tracker: tracker.clone(),
                    finished_at: None,
                },
            );
        }

        let coordinator = self.clone();
        tokio::spawn(async move {
            let lock = coordinator.site_lock(key).await;
            let _guard = lock.lock().await;

            let site_id = engine.site().site_id;
            let domain = engine.site().domain.clone();

            match engine.deploy().await {
                Ok(()) => {
                    coordinator
                        .status_store
                        .set_site_status(site_id, SiteStatus::Active, None)
                        .await;
                }
                Err(e) => {
                    error!("Background deploy failed for {}: {}", domain, e);
                    let detail = format!("Deployment failed. Logs:\n{}", tracker.log_dump().await);
                    coordinator
                        .status_store
                        .set_site_status(site_id, SiteStatus::Failed, Some(detail))
                        .await;
                }
            }

            let mut registry = coordinator.registry.write().await;
            if let Some(entry) = registry.get_mut(&key) {
                entry.finished_at = Some(Instant::now());
            }
        });

        Ok(key)
    }

    // Live status for polling clients. None once the entry is retired (or
    // never existed); the panel then falls back to the durable site status.
    pub async fn get_status(&self, key: DeploymentKey) -> Option<DeploymentView> {
        self.evict_expired().await;
        let registry = self.registry.read().await;
        match registry.get(&key) {
            Some(entry) => Some(entry.tracker.view().await),
            None => None,
        }
    }

    pub async fn stop(&self, domain_id: i64, site: Site) -> Result<(), DeployError> {
        let key = (domain_id, site.site_id);
        let lock = self.site_lock(key).await;
        let _guard = lock.lock().await;

        let site_id = site.site_id;
        let engine = DeployEngine::new(site, self.config.clone())?;
        engine.stop_container().await?;
        self.status_store
            .set_site_status(site_id, SiteStatus::Stopped, None)
            .await;
        Ok(())
    }

    pub async fn restart(&self, domain_id: i64, site: Site) -> Result<(), DeployError> {
        let key = (domain_id, site.site_id);
        let lock = self.site_lock(key).await;
        let _guard = lock.lock().await;

        let site_id = site.site_id;
        let engine = DeployEngine::new(site, self.config.clone())?;
        engine.stop_container().await?;
        engine.start_container().await?;
        self.status_store
            .set_site_status(site_id, SiteStatus::Active, None)
            .await;
        Ok(())
    }

    pub async fn destroy(&self, domain_id: i64, site: Site) -> DestroyReport {
        let key = (domain_id, site.site_id);
        let lock = self.site_lock(key).await;
        let _guard = lock.lock().await;

        let engine = match DeployEngine::new(site, self.config.clone()) {
            Ok(engine) => engine,
            Err(e) => {
                let mut report = DestroyReport::default();
                report.critical_errors.push(format!("Cannot initialize engine: {}", e));
                return report;
            }
        };
        let report = engine.destroy().await;

        // A destroyed site has nothing left worth polling.
        self.registry.write().await.remove(&key);
        report
    }

    // Re-apply current templates and boilerplate to every given site. One
    // site's failure never blocks the rest; the report carries the reasons.
    pub async fn migrate_all(&self, sites: Vec<(i64, Site)>) -> MigrationReport {
        let mut report = MigrationReport::default();

        for (domain_id, site) in sites {
            let key = (domain_id, site.site_id);
            let lock = self.site_lock(key).await;
            let _guard = lock.lock().await;

            let domain = site.domain.clone();
            let outcome = match DeployEngine::new(site, self.config.clone()) {
                Ok(engine) => engine.migrate().await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    report.migrated += 1;
                    info!("Successfully migrated {}", domain);
                }
                Err(e) => {
                    report.failed += 1;
                    error!("Failed to migrate {}: {}", domain, e);
                    report.failures.push((domain, e.to_string()));
                }
            }
        }

        info!(
            "Migration complete: {} succeeded, {} failed",
            report.migrated, report.failed
        );
        report
    }

    #[cfg(test)]
    async fn register_for_test(&self, key: DeploymentKey, tracker: DeploymentTracker, finished: bool) {
        let mut registry = self.registry.write().await;
        registry.insert(
            key,
            DeploymentEntry {
                tracker,
                finished_at: finished.then(Instant::now),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Runtime;
    use crate::state::DeploymentPhase;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct RecordingStore {
        events: AsyncMutex<Vec<(i64, SiteStatus, Option<String>)>>,
    }

    #[async_trait]
    impl StatusStore for RecordingStore {
        async fn set_site_status(&self, site_id: i64, status: SiteStatus, detail: Option<String>) {
            self.events.lock().await.push((site_id, status, detail));
        }
    }

    struct TestEnv {
        _dirs: Vec<TempDir>,
        config: Config,
    }

    fn test_env(retire_after: Duration) -> TestEnv {
        let sites = TempDir::new().unwrap();
        let templates = TempDir::new().unwrap();
        let available = TempDir::new().unwrap();
        let enabled = TempDir::new().unwrap();
        let config = Config {
            sites_dir: sites.path().to_path_buf(),
            templates_dir: templates.path().to_path_buf(),
            nginx_available_dir: available.path().to_path_buf(),
            nginx_enabled_dir: enabled.path().to_path_buf(),
            base_port: 3000,
            health_timeout: Duration::from_secs(2),
            health_poll_interval: Duration::from_millis(100),
            retire_after,
        };
        TestEnv {
            _dirs: vec![sites, templates, available, enabled],
            config,
        }
    }

    #[tokio::test]
    async fn test_failed_deploy_reports_through_store() {
        // Empty templates dir makes the engine fail fast with
        // TemplateNotFound; the worker must persist the failure.
        let env = test_env(Duration::from_secs(60));
        let store = Arc::new(RecordingStore::default());
        let coordinator = DeploymentCoordinator::new(env.config.clone(), store.clone());

        let site = Site::new(9, "fail.test", Runtime::Node, None, None);
        let key = coordinator.begin_deploy(1, site).await.unwrap();

        // Poll until the background task reaches a terminal phase.
        let mut completed = false;
        for _ in 0..100 {
            if let Some(view) = coordinator.get_status(key).await {
                if view.completed {
                    assert_eq!(view.phase, DeploymentPhase::Failed);
                    completed = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(completed);

        // Store callback can land just after the tracker goes terminal.
        let mut recorded = None;
        for _ in 0..100 {
            if let Some(event) = store.events.lock().await.first().cloned() {
                recorded = Some(event);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let (site_id, status, detail) = recorded.expect("status was persisted");
        assert_eq!(site_id, 9);
        assert_eq!(status, SiteStatus::Failed);
        assert!(detail.unwrap().contains("Deployment failed. Logs:"));

        // Entry stays queryable within the grace window
        assert!(coordinator.get_status(key).await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_deploy_for_same_site_is_rejected() {
        let env = test_env(Duration::from_secs(60));
        let store = Arc::new(RecordingStore::default());
        let coordinator = DeploymentCoordinator::new(env.config.clone(), store);

        let key = (1, 5);
        coordinator
            .register_for_test(key, DeploymentTracker::new(), false)
            .await;

        let site = Site::new(5, "busy.test", Runtime::Node, None, None);
        let err = coordinator.begin_deploy(1, site).await.unwrap_err();
        assert!(matches!(err, DeployError::DeploymentInProgress { site_id: 5, .. }));
    }

    #[tokio::test]
    async fn test_finished_entry_allows_redeploy() {
        let env = test_env(Duration::from_secs(60));
        let store = Arc::new(RecordingStore::default());
        let coordinator = DeploymentCoordinator::new(env.config.clone(), store);

        let tracker = DeploymentTracker::new();
        tracker.fail().await;
        coordinator.register_for_test((1, 5), tracker, true).await;

        let site = Site::new(5, "redeploy.test", Runtime::Node, None, None);
        assert!(coordinator.begin_deploy(1, site).await.is_ok());
    }

    #[tokio::test]
    async fn test_retirement_evicts_on_lookup() {
        let env = test_env(Duration::from_millis(0));
        let store = Arc::new(RecordingStore::default());
        let coordinator = DeploymentCoordinator::new(env.config.clone(), store);

        let tracker = DeploymentTracker::new();
        tracker.complete().await;
        coordinator.register_for_test((2, 7), tracker, true).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(coordinator.get_status((2, 7)).await.is_none());
    }

    #[tokio::test]
    async fn test_migrate_all_continues_past_failures() {
        // No site directories or templates exist, so every migration fails
        // early; the loop must still visit every site and record a reason
        // per domain instead of aborting on the first error.
        let env = test_env(Duration::from_secs(60));
        let store = Arc::new(RecordingStore::default());
        let coordinator = DeploymentCoordinator::new(env.config.clone(), store);

        let sites = vec![
            (1, Site::new(11, "first.test", Runtime::Node, None, None)),
            (1, Site::new(12, "second.test", Runtime::Python, None, None)),
            // Out of port range, fails before the engine is even built
            (1, Site::new(65_536, "third.test", Runtime::Node, None, None)),
        ];
        let report = coordinator.migrate_all(sites).await;

        assert_eq!(report.migrated, 0);
        assert_eq!(report.failed, 3);
        let domains: Vec<&str> = report.failures.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(domains, vec!["first.test", "second.test", "third.test"]);
        assert!(report.failures.iter().all(|(_, reason)| !reason.is_empty()));
        assert!(report.failures[2].1.contains("port space"));
    }

    #[tokio::test]
    async fn test_stale_site_locks_are_pruned() {
        let env = test_env(Duration::from_secs(60));
        let store = Arc::new(RecordingStore::default());
        let coordinator = DeploymentCoordinator::new(env.config.clone(), store);

        {
            let lock = coordinator.site_lock((1, 1)).await;
            let _guard = lock.lock().await;
            // Held locks survive pruning from another acquisition.
            let _other = coordinator.site_lock((1, 2)).await;
            assert_eq!(coordinator.site_locks.lock().await.len(), 2);
        }

        // Both earlier locks are unreferenced now; the next acquisition
        // keeps only itself.
        let _lock = coordinator.site_lock((1, 3)).await;
        let locks = coordinator.site_locks.lock().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key(&(1, 3)));
    }

    #[tokio::test]
    async fn test_unfinished_entry_survives_eviction() {
        let env = test_env(Duration::from_millis(0));
        let store = Arc::new(RecordingStore::default());
        let coordinator = DeploymentCoordinator::new(env.config.clone(), store);

        coordinator
            .register_for_test((2, 8), DeploymentTracker::new(), false)
            .await;
        assert!(coordinator.get_status((2, 8)).await.is_some());
    }
}
