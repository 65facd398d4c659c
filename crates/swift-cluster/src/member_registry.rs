use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use swift_eventbus::Topic;
use swift_kv::{KvStore, StoredValue};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cluster::Cluster;
use crate::config::ClusterConfig;
use crate::domain::{Member, MemberRole};
use crate::error::ClusterError;

const INNER_CAS_RETRY_BACKOFF: Duration = Duration::from_secs(1);
const REGISTER_ATTEMPT_RETRIES: u32 = 3;
const REGISTER_ATTEMPT_BACKOFF: Duration = Duration::from_secs(2);

/// Owns the cluster-wide member list at `Swift/<cluster>/Members`:
/// registration, the periodic health/prune reconcile, and the derived
/// `currentMember`/`manager`/`workers` views on `Cluster`.
pub struct MemberRegistry {
    cluster: Arc<Cluster>,
    config: ClusterConfig,
    /// Non-blocking re-entrancy guard for the reconcile tick. Deliberately
    /// not the shared `refreshLock`: health probes can take seconds and
    /// must never serialize against the faster config/record timers.
    reconciling: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl MemberRegistry {
    pub fn new(cluster: Arc<Cluster>, config: ClusterConfig) -> Self {
        Self {
            cluster,
            config,
            reconciling: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    /// Ensures `member_id` appears in the members list with status online,
    /// retrying the whole attempt on transport errors and looping the
    /// inner CAS on conflict until it lands.
    pub async fn register(&self, member_id: &str, role: MemberRole) -> Result<Member, ClusterError> {
        let mut attempt = 0;
        loop {
            match self.register_once(member_id, role).await {
                Ok(member) => return Ok(member),
                Err(ClusterError::ManagerTaken(id)) => return Err(ClusterError::ManagerTaken(id)),
                Err(err) => {
                    attempt += 1;
                    if attempt >= REGISTER_ATTEMPT_RETRIES {
                        return Err(err);
                    }
                    tracing::warn!(error = %err, attempt, "register attempt failed, retrying");
                    tokio::time::sleep(REGISTER_ATTEMPT_BACKOFF).await;
                }
            }
        }
    }

    async fn register_once(&self, member_id: &str, role: MemberRole) -> Result<Member, ClusterError> {
        loop {
            let stored = self.read_members().await?;
            let mut members = decode_members(&stored.value)?;
            let now = Utc::now();

            if role == MemberRole::Manager {
                if let Some(existing) = members
                    .iter()
                    .find(|m| m.role == MemberRole::Manager && m.online && m.id != member_id)
                {
                    return Err(ClusterError::ManagerTaken(existing.id.clone()));
                }
            }

            let registered = if let Some(existing) = members.iter_mut().find(|m| m.id == member_id) {
                existing.role = role;
                existing.mark_online(now);
                existing.clone()
            } else {
                let member = Member::new_online(member_id.to_string(), role, now);
                members.push(member.clone());
                member
            };

            let encoded = encode_members(&members)?;
            match self
                .cluster
                .kv
                .cas(&self.cluster.members_key(), encoded, stored.modify_index)
                .await
            {
                Ok(true) => return Ok(registered),
                Ok(false) => {
                    tokio::time::sleep(INNER_CAS_RETRY_BACKOFF).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn snapshot(&self) -> Vec<Member> {
        self.cluster.snapshot_members().await
    }

    pub fn start_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = self.clone();
        let token = self.cancel.clone();
        let initial_delay = Duration::from_secs(self.config.member_reconcile_initial_delay_secs);
        let period = Duration::from_secs(self.config.member_reconcile_period_secs);

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
                        if let Err(e) = registry.reconcile().await {
                            tracing::warn!(error = %e, "member reconcile failed");
                        }
                    }
                }
            }
        })
    }

    pub fn stop_monitor(&self) {
        self.cancel.cancel();
    }

    async fn reconcile(&self) -> Result<(), ClusterError> {
        if self.reconciling.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.reconcile_inner().await;
        self.reconciling.store(false, Ordering::SeqCst);
        result
    }

    async fn reconcile_inner(&self) -> Result<(), ClusterError> {
        loop {
            let stored = self.read_members().await?;
            let mut fetched = decode_members(&stored.value)?;
            let mut dirty = false;
            let now = Utc::now();
            let prune_after = self.config.member_offline_prune_after();

            let mut survivors = Vec::with_capacity(fetched.len());
            for mut member in fetched.drain(..) {
                let healthy = match self.cluster.registry.check_health(&member.id).await {
                    Ok(h) => h,
                    Err(e) => {
                        tracing::warn!(member = %member.id, error = %e, "health probe failed");
                        false
                    }
                };

                if healthy {
                    if !member.online {
                        dirty = true;
                    }
                    member.mark_online(now);
                } else {
                    let was_online = member.online;
                    let had_offline_time = member.offline_time.is_some();
                    member.mark_offline(now);
                    if was_online || !had_offline_time {
                        dirty = true;
                    }
                    if member.offline_past(now, prune_after) {
                        dirty = true;
                        continue;
                    }
                }
                survivors.push(member);
            }

            if dirty {
                let encoded = encode_members(&survivors)?;
                match self
                    .cluster
                    .kv
                    .cas(&self.cluster.members_key(), encoded, stored.modify_index)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        tokio::time::sleep(INNER_CAS_RETRY_BACKOFF).await;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            self.apply_diff(survivors).await;
            return Ok(());
        }
    }

    async fn apply_diff(&self, fetched: Vec<Member>) {
        let mut members = self.cluster.members_mut().await;

        let fetched_ids: std::collections::HashSet<&str> =
            fetched.iter().map(|m| m.id.as_str()).collect();
        let removed: Vec<Member> = members
            .iter()
            .filter(|m| !fetched_ids.contains(m.id.as_str()))
            .cloned()
            .collect();

        let existing_ids: std::collections::HashSet<&str> =
            members.iter().map(|m| m.id.as_str()).collect();
        let joined: Vec<Member> = fetched
            .iter()
            .filter(|m| !existing_ids.contains(m.id.as_str()))
            .cloned()
            .collect();

        for fetched_member in &fetched {
            if let Some(existing) = members.iter_mut().find(|m| m.id == fetched_member.id) {
                existing.role = fetched_member.role;
                existing.online = fetched_member.online;
                existing.online_time = fetched_member.online_time;
                existing.offline_time = fetched_member.offline_time;
            }
        }
        members.retain(|m| fetched_ids.contains(m.id.as_str()));
        for member in &joined {
            members.push(member.clone());
        }
        drop(members);

        for member in joined {
            self.cluster.member_events.publish(Topic::Join, member).await;
        }
        for member in removed {
            self.cluster.member_events.publish(Topic::Remove, member).await;
        }
    }

    async fn read_members(&self) -> Result<StoredValue, ClusterError> {
        match self.cluster.kv.get(&self.cluster.members_key()).await {
            Ok(Some(stored)) => Ok(stored),
            Ok(None) => {
                let created = self.cluster.kv.create(&self.cluster.members_key()).await?;
                Ok(created)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn decode_members(raw: &str) -> Result<Vec<Member>, ClusterError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| ClusterError::MalformedKvValue("Members".to_string(), e.to_string()))
}

fn encode_members(members: &[Member]) -> Result<String, ClusterError> {
    serde_json::to_string(members).map_err(|e| ClusterError::MalformedKvValue("Members".to_string(), e.to_string()))
}
