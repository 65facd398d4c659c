use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use swift_eventbus::{EventBus, EventBusConfig};
use swift_kv::{KvStore, ServiceRegistry};

use crate::domain::{JobConfig, JobRecord, Member, MemberRole, TaskInstance};

/// Everything one cluster participant knows about its cluster: the KV
/// namespace it coordinates through, its own identity and role, and the
/// in-memory snapshots every reconciler reads and writes. A process holds
/// exactly one `Cluster`; nothing here is a singleton.
///
/// Members do not hold a reference back to their owning `Cluster` — the
/// only use for one would be looking up sibling members, and callers can
/// do that through `Cluster::snapshot_members` instead. A back-reference
/// would either own the cluster (a cycle) or borrow it (a lifetime that
/// every reconciler would have to thread through), for no offsetting
/// benefit.
pub struct Cluster {
    pub name: String,
    pub local_id: String,
    pub local_role: MemberRole,

    pub(crate) kv: Arc<dyn KvStore>,
    pub(crate) registry: Arc<dyn ServiceRegistry>,

    /// Serializes every reconciler's in-memory mutation except the member
    /// registry's, which guards itself with its own re-entrancy flag
    /// because health probes can take seconds.
    pub(crate) refresh_lock: Arc<Mutex<()>>,

    members: RwLock<Vec<Member>>,
    job_configs: RwLock<Vec<JobConfig>>,
    job_records: RwLock<Vec<JobRecord>>,
    active_tasks: RwLock<HashSet<TaskInstance>>,

    pub member_events: Arc<EventBus<Member>>,
    pub job_config_events: Arc<EventBus<JobConfig>>,
    pub job_record_events: Arc<EventBus<JobRecord>>,
    pub task_events: Arc<EventBus<TaskInstance>>,
}

impl Cluster {
    pub fn new(
        name: String,
        local_id: String,
        local_role: MemberRole,
        kv: Arc<dyn KvStore>,
        registry: Arc<dyn ServiceRegistry>,
    ) -> Self {
        Self {
            name,
            local_id,
            local_role,
            kv,
            registry,
            refresh_lock: Arc::new(Mutex::new(())),
            members: RwLock::new(Vec::new()),
            job_configs: RwLock::new(Vec::new()),
            job_records: RwLock::new(Vec::new()),
            active_tasks: RwLock::new(HashSet::new()),
            member_events: Arc::new(EventBus::new(EventBusConfig::new())),
            job_config_events: Arc::new(EventBus::new(EventBusConfig::new())),
            job_record_events: Arc::new(EventBus::new(EventBusConfig::new())),
            task_events: Arc::new(EventBus::new(EventBusConfig::new())),
        }
    }

    pub fn members_key(&self) -> String {
        format!("Swift/{}/Members", self.name)
    }

    pub fn job_config_key(&self, job_name: &str) -> String {
        format!("Swift/{}/Jobs/{}/Config", self.name, job_name)
    }

    pub fn job_prefix(&self, job_name: &str) -> String {
        format!("Swift/{}/Jobs/{}", self.name, job_name)
    }

    pub fn job_record_key(&self, job_name: &str, record_id: &str) -> String {
        format!("Swift/{}/Jobs/{}/Records/{}", self.name, job_name, record_id)
    }

    pub fn jobs_prefix(&self) -> String {
        format!("Swift/{}/Jobs/", self.name)
    }

    pub async fn snapshot_members(&self) -> Vec<Member> {
        self.members.read().await.clone()
    }

    pub(crate) async fn members_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, Vec<Member>> {
        self.members.write().await
    }

    pub async fn snapshot_job_configs(&self) -> Vec<JobConfig> {
        self.job_configs.read().await.clone()
    }

    pub(crate) async fn job_configs_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, Vec<JobConfig>> {
        self.job_configs.write().await
    }

    pub async fn snapshot_job_records(&self) -> Vec<JobRecord> {
        self.job_records.read().await.clone()
    }

    pub(crate) async fn job_records_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, Vec<JobRecord>> {
        self.job_records.write().await
    }

    pub async fn snapshot_active_tasks(&self) -> HashSet<TaskInstance> {
        self.active_tasks.read().await.clone()
    }

    pub(crate) async fn active_tasks_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, HashSet<TaskInstance>> {
        self.active_tasks.write().await
    }

    /// The member whose id equals `local_id`, if the registry has picked
    /// it up yet.
    pub async fn current_member(&self) -> Option<Member> {
        self.members
            .read()
            .await
            .iter()
            .find(|m| m.id == self.local_id)
            .cloned()
    }

    /// The cluster's Manager, if one is currently registered.
    pub async fn manager(&self) -> Option<Member> {
        self.members
            .read()
            .await
            .iter()
            .find(|m| m.role == MemberRole::Manager)
            .cloned()
    }

    pub async fn workers(&self) -> Vec<Member> {
        self.members
            .read()
            .await
            .iter()
            .filter(|m| m.role == MemberRole::Worker)
            .cloned()
            .collect()
    }

    pub fn is_manager(&self) -> bool {
        self.local_role == MemberRole::Manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use swift_kv::{InMemoryKvStore, InMemoryServiceRegistry};

    fn make_cluster(role: MemberRole) -> Cluster {
        Cluster::new(
            "c1".to_string(),
            "10.0.0.1".to_string(),
            role,
            Arc::new(InMemoryKvStore::new()),
            Arc::new(InMemoryServiceRegistry::new()),
        )
    }

    #[test]
    fn builds_namespaced_kv_keys() {
        let cluster = make_cluster(MemberRole::Worker);
        assert_eq!(cluster.members_key(), "Swift/c1/Members");
        assert_eq!(cluster.job_config_key("nightly"), "Swift/c1/Jobs/nightly/Config");
        assert_eq!(
            cluster.job_record_key("nightly", "r1"),
            "Swift/c1/Jobs/nightly/Records/r1"
        );
    }

    #[tokio::test]
    async fn current_member_manager_and_workers_are_derived_from_snapshot() {
        let cluster = make_cluster(MemberRole::Worker);
        let now = Utc::now();
        {
            let mut members = cluster.members_mut().await;
            members.push(Member::new_online("10.0.0.1".to_string(), MemberRole::Worker, now));
            members.push(Member::new_online("10.0.0.2".to_string(), MemberRole::Manager, now));
        }

        assert_eq!(cluster.current_member().await.unwrap().id, "10.0.0.1");
        assert_eq!(cluster.manager().await.unwrap().id, "10.0.0.2");
        assert_eq!(cluster.workers().await.len(), 1);
        assert!(!cluster.is_manager());
    }
}
