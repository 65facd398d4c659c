use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use swift_eventbus::Topic;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cluster::Cluster;
use crate::config::ClusterConfig;
use crate::domain::JobConfig;
use crate::error::ClusterError;
use crate::job_package::JobPackageSource;

/// Manager side of the JobConfig reconciler (spec §4.4): scans `Jobs/` on
/// disk, extracts any undiscovered `.zip` packages, and publishes the
/// resulting configs to KV. The only writer of
/// `Swift/<cluster>/Jobs/<name>/Config`.
pub struct ManagerJobConfigReconciler {
    cluster: Arc<Cluster>,
    config: ClusterConfig,
    package_source: Arc<dyn JobPackageSource>,
    cancel: CancellationToken,
}

impl ManagerJobConfigReconciler {
    pub fn new(cluster: Arc<Cluster>, config: ClusterConfig, package_source: Arc<dyn JobPackageSource>) -> Self {
        Self {
            cluster,
            config,
            package_source,
            cancel: CancellationToken::new(),
        }
    }

    pub fn start_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let reconciler = self.clone();
        let token = self.cancel.clone();
        let initial_delay = Duration::from_secs(self.config.job_config_reconcile_initial_delay_secs);
        let period = Duration::from_secs(self.config.job_config_reconcile_period_secs);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = reconciler.reconcile().await {
                            tracing::warn!(error = %e, "manager job-config reconcile failed");
                        }
                    }
                }
            }
        })
    }

    pub fn stop_monitor(&self) {
        self.cancel.cancel();
    }

    pub async fn reconcile(&self) -> Result<(), ClusterError> {
        let _guard = self.cluster.refresh_lock.lock().await;

        for name in self.package_source.list_archives().await? {
            match self.package_source.config_dir_exists(&name).await {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) = self.package_source.extract_config(&name).await {
                        tracing::warn!(package = %name, error = %e, "job package config extraction failed");
                    }
                }
                Err(e) => tracing::warn!(package = %name, error = %e, "failed to probe config directory"),
            }
        }

        let mut disk_configs = Vec::new();
        for name in self.package_source.list_config_dirs().await? {
            match self.package_source.read_config(&name).await {
                Ok(value) => match decode_disk_config(&name, &value) {
                    Ok(cfg) => disk_configs.push(cfg),
                    Err(e) => tracing::warn!(job = %name, error = %e, "malformed job config on disk"),
                },
                Err(e) => tracing::warn!(job = %name, error = %e, "failed to read job config"),
            }
        }

        self.apply_diff(disk_configs).await;
        Ok(())
    }

    async fn apply_diff(&self, disk_configs: Vec<JobConfig>) {
        let disk_names: HashSet<&str> = disk_configs.iter().map(|c| c.name.as_str()).collect();

        let removed: Vec<JobConfig> = {
            let configs = self.cluster.snapshot_job_configs().await;
            configs
                .into_iter()
                .filter(|c| !disk_names.contains(c.name.as_str()))
                .collect()
        };

        let mut joined = Vec::new();
        for disk_cfg in &disk_configs {
            let exists = {
                let configs = self.cluster.job_configs_mut().await;
                configs.iter().any(|c| c.name == disk_cfg.name)
            };

            if !exists {
                if self.publish(disk_cfg).await {
                    let mut configs = self.cluster.job_configs_mut().await;
                    configs.push(disk_cfg.clone());
                    joined.push(disk_cfg.clone());
                }
                continue;
            }

            let mut configs = self.cluster.job_configs_mut().await;
            if let Some(existing) = configs.iter_mut().find(|c| c.name == disk_cfg.name) {
                if !existing.content_eq(disk_cfg) {
                    existing.run_time_plan = disk_cfg.run_time_plan.clone();
                    existing.settings = disk_cfg.settings.clone();
                    existing.last_record_id = disk_cfg.last_record_id.clone();
                    existing.last_record_start_time = disk_cfg.last_record_start_time;
                }
            }
        }

        {
            let mut configs = self.cluster.job_configs_mut().await;
            configs.retain(|c| disk_names.contains(c.name.as_str()));
        }
        for removed_cfg in &removed {
            if let Err(e) = self.cluster.kv.delete_tree(&self.cluster.job_prefix(&removed_cfg.name)).await {
                tracing::warn!(job = %removed_cfg.name, error = %e, "failed to delete job config tree");
            }
        }

        for cfg in joined {
            self.cluster.job_config_events.publish(Topic::Join, cfg).await;
        }
        for cfg in removed {
            self.cluster.job_config_events.publish(Topic::Remove, cfg).await;
        }
    }

    async fn publish(&self, cfg: &JobConfig) -> bool {
        let key = self.cluster.job_config_key(&cfg.name);
        let encoded = match cfg.to_json_string() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(job = %cfg.name, error = %e, "failed to encode job config");
                return false;
            }
        };
        let created = match self.cluster.kv.create(&key).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(job = %cfg.name, error = %e, "failed to create job config key");
                return false;
            }
        };
        match self.cluster.kv.cas(&key, encoded, created.modify_index).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(job = %cfg.name, "cas conflict publishing new job config");
                false
            }
            Err(e) => {
                tracing::warn!(job = %cfg.name, error = %e, "failed to publish job config");
                false
            }
        }
    }
}

/// Worker side of the JobConfig reconciler (spec §4.5): lists
/// `Swift/<cluster>/Jobs/` and keeps an in-memory mirror of every
/// `.../Config` entry, never writing back.
pub struct WorkerJobConfigReconciler {
    cluster: Arc<Cluster>,
    config: ClusterConfig,
    cancel: CancellationToken,
}

impl WorkerJobConfigReconciler {
    pub fn new(cluster: Arc<Cluster>, config: ClusterConfig) -> Self {
        Self {
            cluster,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn start_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let reconciler = self.clone();
        let token = self.cancel.clone();
        let initial_delay = Duration::from_secs(self.config.job_config_reconcile_initial_delay_secs);
        let period = Duration::from_secs(self.config.job_config_reconcile_period_secs);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = reconciler.reconcile().await {
                            tracing::warn!(error = %e, "worker job-config reconcile failed");
                        }
                    }
                }
            }
        })
    }

    pub fn stop_monitor(&self) {
        self.cancel.cancel();
    }

    pub async fn reconcile(&self) -> Result<(), ClusterError> {
        let _guard = self.cluster.refresh_lock.lock().await;

        let keys = self.cluster.kv.keys(&self.cluster.jobs_prefix()).await?;
        let mut fetched = Vec::new();
        for key in keys.iter().filter(|k| k.ends_with("/Config")) {
            match self.cluster.kv.get(key).await {
                Ok(Some(stored)) => match JobConfig::from_json_str(&stored.value) {
                    Ok(mut cfg) => {
                        cfg.modify_index = stored.modify_index;
                        fetched.push(cfg);
                    }
                    Err(e) => tracing::warn!(key = %key, error = %e, "malformed job config in kv"),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "failed to fetch job config"),
            }
        }

        self.apply_diff(fetched).await;
        Ok(())
    }

    async fn apply_diff(&self, fetched: Vec<JobConfig>) {
        let fetched_names: HashSet<&str> = fetched.iter().map(|c| c.name.as_str()).collect();

        let removed: Vec<JobConfig> = {
            let configs = self.cluster.snapshot_job_configs().await;
            configs
                .into_iter()
                .filter(|c| !fetched_names.contains(c.name.as_str()))
                .collect()
        };
        let joined: Vec<JobConfig> = {
            let configs = self.cluster.job_configs_mut().await;
            let existing_names: HashSet<&str> = configs.iter().map(|c| c.name.as_str()).collect();
            fetched
                .iter()
                .filter(|c| !existing_names.contains(c.name.as_str()))
                .cloned()
                .collect()
        };

        {
            let mut configs = self.cluster.job_configs_mut().await;
            for fetched_cfg in &fetched {
                if let Some(existing) = configs.iter_mut().find(|c| c.name == fetched_cfg.name) {
                    if existing.modify_index != fetched_cfg.modify_index {
                        existing.run_time_plan = fetched_cfg.run_time_plan.clone();
                        existing.settings = fetched_cfg.settings.clone();
                        existing.last_record_id = fetched_cfg.last_record_id.clone();
                        existing.last_record_start_time = fetched_cfg.last_record_start_time;
                        existing.modify_index = fetched_cfg.modify_index;
                    }
                }
            }
            configs.retain(|c| fetched_names.contains(c.name.as_str()));
            for cfg in &joined {
                configs.push(cfg.clone());
            }
        }

        for cfg in joined {
            self.cluster.job_config_events.publish(Topic::Join, cfg).await;
        }
        for cfg in removed {
            self.cluster.job_config_events.publish(Topic::Remove, cfg).await;
        }
    }
}

fn decode_disk_config(dir_name: &str, raw: &serde_json::Value) -> Result<JobConfig, String> {
    let mut value = raw.clone();
    if let serde_json::Value::Object(ref mut map) = value {
        map.entry("name".to_string())
            .or_insert_with(|| serde_json::Value::String(dir_name.to_string()));
        map.entry("runTimePlan".to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
    }
    let mut cfg: JobConfig = serde_json::from_value(value).map_err(|e| e.to_string())?;
    cfg.name = dir_name.to_string();
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_package::JobPackageSource;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use swift_kv::{InMemoryKvStore, InMemoryServiceRegistry};

    #[derive(Default)]
    struct FakePackageSource {
        archives: StdMutex<Vec<String>>,
        configs: StdMutex<std::collections::HashMap<String, serde_json::Value>>,
        extracted: StdMutex<HashSet<String>>,
    }

    #[async_trait]
    impl JobPackageSource for FakePackageSource {
        async fn list_archives(&self) -> Result<Vec<String>, ClusterError> {
            Ok(self.archives.lock().unwrap().clone())
        }

        async fn config_dir_exists(&self, name: &str) -> Result<bool, ClusterError> {
            Ok(self.extracted.lock().unwrap().contains(name))
        }

        async fn extract_config(&self, name: &str) -> Result<(), ClusterError> {
            self.extracted.lock().unwrap().insert(name.to_string());
            Ok(())
        }

        async fn list_config_dirs(&self) -> Result<Vec<String>, ClusterError> {
            Ok(self.configs.lock().unwrap().keys().cloned().collect())
        }

        async fn read_config(&self, name: &str) -> Result<serde_json::Value, ClusterError> {
            self.configs
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| ClusterError::MalformedKvValue(name.to_string(), "missing".to_string()))
        }

        async fn write_config(&self, name: &str, contents: &serde_json::Value) -> Result<(), ClusterError> {
            self.configs.lock().unwrap().insert(name.to_string(), contents.clone());
            Ok(())
        }
    }

    fn make_cluster() -> Arc<Cluster> {
        Arc::new(Cluster::new(
            "c1".to_string(),
            "10.0.0.1".to_string(),
            crate::domain::MemberRole::Manager,
            Arc::new(InMemoryKvStore::new()),
            Arc::new(InMemoryServiceRegistry::new()),
        ))
    }

    fn config() -> ClusterConfig {
        serde_yaml::from_str("cluster_name: c1\n").unwrap()
    }

    #[tokio::test]
    async fn manager_publishes_new_config_from_disk() {
        let cluster = make_cluster();
        let source = Arc::new(FakePackageSource::default());
        source
            .configs
            .lock()
            .unwrap()
            .insert("nightly".to_string(), serde_json::json!({"runTimePlan": ["12:00"]}));

        let reconciler = ManagerJobConfigReconciler::new(cluster.clone(), config(), source);
        reconciler.reconcile().await.unwrap();

        let configs = cluster.snapshot_job_configs().await;
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "nightly");

        let stored = cluster.kv.get(&cluster.job_config_key("nightly")).await.unwrap().unwrap();
        let published: JobConfig = JobConfig::from_json_str(&stored.value).unwrap();
        assert_eq!(published.run_time_plan, vec!["12:00".to_string()]);
    }

    #[tokio::test]
    async fn manager_removes_config_whose_disk_file_disappeared() {
        let cluster = make_cluster();
        let source = Arc::new(FakePackageSource::default());
        source
            .configs
            .lock()
            .unwrap()
            .insert("nightly".to_string(), serde_json::json!({"runTimePlan": ["12:00"]}));
        let reconciler = ManagerJobConfigReconciler::new(cluster.clone(), config(), source.clone());
        reconciler.reconcile().await.unwrap();
        assert_eq!(cluster.snapshot_job_configs().await.len(), 1);

        source.configs.lock().unwrap().clear();
        reconciler.reconcile().await.unwrap();
        assert!(cluster.snapshot_job_configs().await.is_empty());
        assert!(cluster.kv.get(&cluster.job_config_key("nightly")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn manager_extracts_undiscovered_archives_once() {
        let cluster = make_cluster();
        let source = Arc::new(FakePackageSource::default());
        source.archives.lock().unwrap().push("pkg".to_string());

        let reconciler = ManagerJobConfigReconciler::new(cluster, config(), source.clone());
        reconciler.reconcile().await.unwrap();
        assert!(source.extracted.lock().unwrap().contains("pkg"));
    }

    #[tokio::test]
    async fn worker_mirrors_published_configs_without_writing_back() {
        let cluster = make_cluster();
        let key = cluster.job_config_key("nightly");
        let cfg = JobConfig::new("nightly".to_string(), vec!["12:00".to_string()], serde_json::json!({}));
        let created = cluster.kv.create(&key).await.unwrap();
        cluster.kv.cas(&key, cfg.to_json_string().unwrap(), created.modify_index).await.unwrap();

        let reconciler = WorkerJobConfigReconciler::new(cluster.clone(), config());
        reconciler.reconcile().await.unwrap();

        let configs = cluster.snapshot_job_configs().await;
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "nightly");

        reconciler.reconcile().await.unwrap();
        assert_eq!(cluster.snapshot_job_configs().await.len(), 1);
    }

    #[tokio::test]
    async fn worker_removes_config_deleted_from_kv() {
        let cluster = make_cluster();
        let key = cluster.job_config_key("nightly");
        let cfg = JobConfig::new("nightly".to_string(), vec!["12:00".to_string()], serde_json::json!({}));
        let created = cluster.kv.create(&key).await.unwrap();
        cluster.kv.cas(&key, cfg.to_json_string().unwrap(), created.modify_index).await.unwrap();

        let reconciler = WorkerJobConfigReconciler::new(cluster.clone(), config());
        reconciler.reconcile().await.unwrap();
        assert_eq!(cluster.snapshot_job_configs().await.len(), 1);

        cluster.kv.delete_tree(&cluster.job_prefix("nightly")).await.unwrap();
        reconciler.reconcile().await.unwrap();
        assert!(cluster.snapshot_job_configs().await.is_empty());
    }
}
