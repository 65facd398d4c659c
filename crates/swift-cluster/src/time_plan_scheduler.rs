use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cluster::Cluster;
use crate::config::ClusterConfig;
use crate::domain::{JobConfig, JobRecord};
use crate::error::ClusterError;
use crate::job_package::JobPackageSource;

/// Manager-only: turns a `JobConfig`'s `runTimePlan` into new `JobRecord`s
/// (spec §4.8). Shares `Cluster::refresh_lock` with the config/record/task
/// reconcilers so a config's `lastRecordId` never gets read mid-update by
/// the JobConfig reconciler.
pub struct TimePlanScheduler {
    cluster: Arc<Cluster>,
    config: ClusterConfig,
    package_source: Arc<dyn JobPackageSource>,
    cancel: CancellationToken,
}

impl TimePlanScheduler {
    pub fn new(cluster: Arc<Cluster>, config: ClusterConfig, package_source: Arc<dyn JobPackageSource>) -> Self {
        Self {
            cluster,
            config,
            package_source,
            cancel: CancellationToken::new(),
        }
    }

    pub fn start_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = self.clone();
        let token = self.cancel.clone();
        let initial_delay = Duration::from_secs(self.config.time_plan_initial_delay_secs);
        let period = Duration::from_secs(self.config.time_plan_period_secs);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => scheduler.reconcile().await,
                }
            }
        })
    }

    pub fn stop_monitor(&self) {
        self.cancel.cancel();
    }

    pub async fn reconcile(&self) {
        self.reconcile_at(Utc::now()).await;
    }

    /// Separated from `reconcile` so tests can drive the time-plan match
    /// and the `TaskMerged` gate with a synthetic wall clock instead of
    /// sleeping for the hours the spec's scenarios span.
    pub async fn reconcile_at(&self, now: DateTime<Utc>) {
        let _guard = self.cluster.refresh_lock.lock().await;
        let configs = self.cluster.snapshot_job_configs().await;
        for config in &configs {
            self.maybe_create_record(config, now).await;
        }
    }

    async fn maybe_create_record(&self, config: &JobConfig, now: DateTime<Utc>) {
        if let Some(record_id) = &config.last_record_id {
            match self.previous_record_allows_creation(&config.name, record_id).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    tracing::warn!(job = %config.name, error = %e, "failed to check previous job record");
                    return;
                }
            }
        }

        if !matches_time_plan(&config.run_time_plan, now) {
            return;
        }

        if let Err(e) = self.create_record(config, now).await {
            tracing::warn!(job = %config.name, error = %e, "failed to create job record");
        }
    }

    async fn previous_record_allows_creation(&self, job_name: &str, record_id: &str) -> Result<bool, ClusterError> {
        let key = self.cluster.job_record_key(job_name, record_id);
        match self.cluster.kv.get(&key).await {
            Ok(Some(stored)) => match JobRecord::from_json_str(&stored.value) {
                Ok(record) => Ok(record.status.allows_next_creation()),
                Err(e) => Err(ClusterError::MalformedKvValue(record_id.to_string(), e.to_string())),
            },
            // A lastRecordId that no longer resolves is treated as stale
            // and purged, per spec §3 — it does not block the next run.
            Ok(None) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_record(&self, config: &JobConfig, now: DateTime<Utc>) -> Result<(), ClusterError> {
        let new_id = Uuid::new_v4().to_string();
        let record = JobRecord::new_pending(new_id.clone(), config.name.clone());
        let record_key = self.cluster.job_record_key(&config.name, &new_id);
        let encoded = record
            .to_json_string()
            .map_err(|e| ClusterError::MalformedKvValue(new_id.clone(), e.to_string()))?;

        let created = self.cluster.kv.create(&record_key).await?;
        if !self.cluster.kv.cas(&record_key, encoded, created.modify_index).await? {
            return Err(ClusterError::CasConflict(record_key));
        }

        let config_key = self.cluster.job_config_key(&config.name);
        let stored_cfg = self
            .cluster
            .kv
            .get(&config_key)
            .await?
            .ok_or_else(|| ClusterError::MalformedKvValue(config_key.clone(), "config missing in kv".to_string()))?;
        let mut kv_config = JobConfig::from_json_str(&stored_cfg.value)
            .map_err(|e| ClusterError::MalformedKvValue(config_key.clone(), e.to_string()))?;
        kv_config.last_record_id = Some(new_id.clone());
        kv_config.last_record_start_time = Some(now);

        let encoded_cfg = kv_config
            .to_json_string()
            .map_err(|e| ClusterError::MalformedKvValue(config_key.clone(), e.to_string()))?;
        if !self.cluster.kv.cas(&config_key, encoded_cfg, stored_cfg.modify_index).await? {
            return Err(ClusterError::CasConflict(config_key));
        }

        {
            let mut configs = self.cluster.job_configs_mut().await;
            if let Some(existing) = configs.iter_mut().find(|c| c.name == config.name) {
                existing.last_record_id = Some(new_id.clone());
                existing.last_record_start_time = Some(now);
            }
        }

        let mirror = serde_json::to_value(&kv_config)
            .map_err(|e| ClusterError::MalformedKvValue(config.name.clone(), e.to_string()))?;
        if let Err(e) = self.package_source.write_config(&config.name, &mirror).await {
            tracing::warn!(job = %config.name, error = %e, "failed to mirror advanced config to disk");
        }

        tracing::info!(job = %config.name, record = %new_id, "created job record from time plan");
        Ok(())
    }
}

fn matches_time_plan(run_time_plan: &[String], now: DateTime<Utc>) -> bool {
    let hh_mm = now.format("%H:%M").to_string();
    run_time_plan.iter().any(|slot| slot == &hh_mm)
}
