use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use swift_eventbus::Topic;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cluster::Cluster;
use crate::config::ClusterConfig;
use crate::domain::{JobRecordStatus, TaskInstance};

/// Derives the flat set of in-flight tasks from every active job record's
/// `taskPlan` (spec §4.7) and diffs it against the previous tick's set.
/// A record whose plan isn't made yet (`Pending`/`PlanMaking`) contributes
/// nothing.
pub struct TaskExtractor {
    cluster: Arc<Cluster>,
    config: ClusterConfig,
    cancel: CancellationToken,
}

impl TaskExtractor {
    pub fn new(cluster: Arc<Cluster>, config: ClusterConfig) -> Self {
        Self {
            cluster,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn start_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let extractor = self.clone();
        let token = self.cancel.clone();
        let initial_delay = Duration::from_secs(self.config.task_extract_initial_delay_secs);
        let period = Duration::from_secs(self.config.task_extract_period_secs);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => extractor.reconcile().await,
                }
            }
        })
    }

    pub fn stop_monitor(&self) {
        self.cancel.cancel();
    }

    pub async fn reconcile(&self) {
        let _guard = self.cluster.refresh_lock.lock().await;
        let records = self.cluster.snapshot_job_records().await;
        let latest = extract_tasks(&records);
        self.apply_diff(latest).await;
    }

    async fn apply_diff(&self, latest: HashSet<TaskInstance>) {
        let (joined, removed) = {
            let mut active = self.cluster.active_tasks_mut().await;
            let joined: Vec<TaskInstance> = latest.difference(&active).cloned().collect();
            let removed: Vec<TaskInstance> = active.difference(&latest).cloned().collect();
            *active = latest;
            (joined, removed)
        };

        for task in joined {
            self.cluster.task_events.publish(Topic::Join, task).await;
        }
        for task in removed {
            self.cluster.task_events.publish(Topic::Remove, task).await;
        }
    }
}

fn extract_tasks(records: &[crate::domain::JobRecord]) -> HashSet<TaskInstance> {
    let mut latest = HashSet::new();
    for record in records {
        if matches!(record.status, JobRecordStatus::Pending | JobRecordStatus::PlanMaking) {
            continue;
        }
        for tasks in record.task_plan.values() {
            for task in tasks {
                latest.insert(TaskInstance::new(
                    record.id.clone(),
                    task.id.clone(),
                    task.assigned_member_id.clone(),
                ));
            }
        }
    }
    latest
}
