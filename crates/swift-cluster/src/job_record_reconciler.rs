use std::sync::Arc;
use std::time::Duration;

use swift_eventbus::Topic;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cluster::Cluster;
use crate::config::ClusterConfig;
use crate::domain::JobRecord;
use crate::error::ClusterError;

/// Owns the in-memory mirror of each active job's current record (spec
/// §4.6): evicts any record whose id no longer matches its config's
/// `lastRecordId`, then joins/updates/removes the current one against KV.
/// Updates happen in place on the stored `Vec` entry — never by replacing
/// the element — so a reference obtained via `snapshot_job_records`
/// reflects what the struct looked like at the time it was cloned, while
/// the reconciler's own copy keeps accumulating field updates across
/// ticks instead of being torn down and rebuilt each time.
pub struct JobRecordReconciler {
    cluster: Arc<Cluster>,
    config: ClusterConfig,
    cancel: CancellationToken,
}

impl JobRecordReconciler {
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
        let initial_delay = Duration::from_secs(self.config.job_record_reconcile_initial_delay_secs);
        let period = Duration::from_secs(self.config.job_record_reconcile_period_secs);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => reconciler.reconcile().await,
                }
            }
        })
    }

    pub fn stop_monitor(&self) {
        self.cancel.cancel();
    }

    pub async fn reconcile(&self) {
        let _guard = self.cluster.refresh_lock.lock().await;
        let configs = self.cluster.snapshot_job_configs().await;
        for config in &configs {
            self.reconcile_one(&config.name, config.last_record_id.as_deref()).await;
        }
    }

    async fn reconcile_one(&self, job_name: &str, last_record_id: Option<&str>) {
        let evicted = self.evict_stale(job_name, last_record_id).await;
        for record in evicted {
            self.cluster.job_record_events.publish(Topic::Remove, record).await;
        }

        let Some(record_id) = last_record_id else {
            return;
        };

        let key = self.cluster.job_record_key(job_name, record_id);
        match self.cluster.kv.get(&key).await {
            Ok(Some(stored)) => self.apply_present(record_id, stored).await,
            Ok(None) => self.apply_absent(record_id).await,
            Err(e) => tracing::warn!(job = %job_name, record = %record_id, error = %e, "failed to fetch job record"),
        }
    }

    async fn evict_stale(&self, job_name: &str, keep_id: Option<&str>) -> Vec<JobRecord> {
        let mut records = self.cluster.job_records_mut().await;
        let mut evicted = Vec::new();
        records.retain(|r| {
            if r.job_name == job_name && Some(r.id.as_str()) != keep_id {
                evicted.push(r.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    async fn apply_present(&self, record_id: &str, stored: swift_kv::StoredValue) {
        let mut to_join = None;
        {
            let mut records = self.cluster.job_records_mut().await;
            if let Some(existing) = records.iter_mut().find(|r| r.id == record_id) {
                if existing.modify_index != stored.modify_index {
                    match JobRecord::from_json_str(&stored.value) {
                        Ok(decoded) => {
                            existing.status = decoded.status;
                            existing.task_plan = decoded.task_plan;
                            existing.job_name = decoded.job_name;
                            existing.modify_index = stored.modify_index;
                        }
                        Err(e) => tracing::warn!(record = %record_id, error = %e, "malformed job record in kv"),
                    }
                }
            } else {
                match JobRecord::from_json_str(&stored.value) {
                    Ok(mut decoded) => {
                        decoded.modify_index = stored.modify_index;
                        to_join = Some(decoded.clone());
                        records.push(decoded);
                    }
                    Err(e) => tracing::warn!(record = %record_id, error = %e, "malformed job record in kv"),
                }
            }
        }
        if let Some(record) = to_join {
            self.cluster.job_record_events.publish(Topic::Join, record).await;
        }
    }

    async fn apply_absent(&self, record_id: &str) {
        let removed = {
            let mut records = self.cluster.job_records_mut().await;
            records
                .iter()
                .position(|r| r.id == record_id)
                .map(|pos| records.remove(pos))
        };
        if let Some(record) = removed {
            self.cluster.job_record_events.publish(Topic::Remove, record).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobConfig, JobRecordStatus, MemberRole};
    use swift_kv::{InMemoryKvStore, InMemoryServiceRegistry};

    fn make_cluster() -> Arc<Cluster> {
        Arc::new(Cluster::new(
            "c1".to_string(),
            "10.0.0.1".to_string(),
            MemberRole::Manager,
            Arc::new(InMemoryKvStore::new()),
            Arc::new(InMemoryServiceRegistry::new()),
        ))
    }

    fn config() -> ClusterConfig {
        serde_yaml::from_str("cluster_name: c1\n").unwrap()
    }

    async fn push_config(cluster: &Cluster, name: &str, last_record_id: Option<&str>) {
        let mut cfg = JobConfig::new(name.to_string(), vec![], serde_json::json!({}));
        cfg.last_record_id = last_record_id.map(|s| s.to_string());
        cluster.job_configs_mut().await.push(cfg);
    }

    #[tokio::test]
    async fn joins_a_record_newly_visible_in_kv() {
        let cluster = make_cluster();
        push_config(&cluster, "nightly", Some("r1")).await;
        let record = JobRecord::new_pending("r1".to_string(), "nightly".to_string());
        let key = cluster.job_record_key("nightly", "r1");
        let created = cluster.kv.create(&key).await.unwrap();
        cluster.kv.cas(&key, record.to_json_string().unwrap(), created.modify_index).await.unwrap();

        let reconciler = JobRecordReconciler::new(cluster.clone(), config());
        reconciler.reconcile().await;

        let records = cluster.snapshot_job_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "r1");
    }

    #[tokio::test]
    async fn evicts_record_whose_id_no_longer_matches_last_record_id() {
        let cluster = make_cluster();
        cluster
            .job_records_mut()
            .await
            .push(JobRecord::new_pending("stale".to_string(), "nightly".to_string()));
        push_config(&cluster, "nightly", Some("fresh")).await;

        let key = cluster.job_record_key("nightly", "fresh");
        let record = JobRecord::new_pending("fresh".to_string(), "nightly".to_string());
        let created = cluster.kv.create(&key).await.unwrap();
        cluster.kv.cas(&key, record.to_json_string().unwrap(), created.modify_index).await.unwrap();

        let reconciler = JobRecordReconciler::new(cluster.clone(), config());
        reconciler.reconcile().await;

        let records = cluster.snapshot_job_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "fresh");
    }

    #[tokio::test]
    async fn update_refreshes_fields_in_place_without_replacing_the_entry() {
        let cluster = make_cluster();
        push_config(&cluster, "nightly", Some("r1")).await;
        let key = cluster.job_record_key("nightly", "r1");
        let record = JobRecord::new_pending("r1".to_string(), "nightly".to_string());
        let created = cluster.kv.create(&key).await.unwrap();
        cluster.kv.cas(&key, record.to_json_string().unwrap(), created.modify_index).await.unwrap();

        let reconciler = JobRecordReconciler::new(cluster.clone(), config());
        reconciler.reconcile().await;
        assert_eq!(cluster.snapshot_job_records().await[0].status, JobRecordStatus::Pending);

        let mut updated = record.clone();
        updated.status = JobRecordStatus::TaskMerged;
        let stored = cluster.kv.get(&key).await.unwrap().unwrap();
        cluster.kv.cas(&key, updated.to_json_string().unwrap(), stored.modify_index).await.unwrap();

        reconciler.reconcile().await;
        let records = cluster.snapshot_job_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, JobRecordStatus::TaskMerged);
    }

    #[tokio::test]
    async fn record_removed_from_kv_is_dropped_from_memory() {
        let cluster = make_cluster();
        push_config(&cluster, "nightly", Some("r1")).await;
        let key = cluster.job_record_key("nightly", "r1");
        let record = JobRecord::new_pending("r1".to_string(), "nightly".to_string());
        let created = cluster.kv.create(&key).await.unwrap();
        cluster.kv.cas(&key, record.to_json_string().unwrap(), created.modify_index).await.unwrap();

        let reconciler = JobRecordReconciler::new(cluster.clone(), config());
        reconciler.reconcile().await;
        assert_eq!(cluster.snapshot_job_records().await.len(), 1);

        cluster.kv.delete_tree(&cluster.job_prefix("nightly")).await.unwrap();
        reconciler.reconcile().await;
        assert!(cluster.snapshot_job_records().await.is_empty());
    }
}
