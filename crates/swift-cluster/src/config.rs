use serde::Deserialize;

/// Tuning for every timer the cluster runtime owns. Loaded from YAML;
/// every field has a default matching the values a fresh cluster is
/// expected to run at, so an empty document still produces a usable
/// config.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub cluster_name: String,

    #[serde(default = "default_member_ttl_secs")]
    pub member_ttl_secs: u64,
    #[serde(default = "default_heartbeat_period_secs")]
    pub heartbeat_period_secs: u64,

    #[serde(default = "default_member_reconcile_initial_delay_secs")]
    pub member_reconcile_initial_delay_secs: u64,
    #[serde(default = "default_member_reconcile_period_secs")]
    pub member_reconcile_period_secs: u64,
    #[serde(default = "default_member_offline_prune_after_secs")]
    pub member_offline_prune_after_secs: i64,

    #[serde(default = "default_job_config_reconcile_initial_delay_secs")]
    pub job_config_reconcile_initial_delay_secs: u64,
    #[serde(default = "default_job_config_reconcile_period_secs")]
    pub job_config_reconcile_period_secs: u64,

    #[serde(default = "default_job_record_reconcile_initial_delay_secs")]
    pub job_record_reconcile_initial_delay_secs: u64,
    #[serde(default = "default_job_record_reconcile_period_secs")]
    pub job_record_reconcile_period_secs: u64,

    #[serde(default = "default_task_extract_initial_delay_secs")]
    pub task_extract_initial_delay_secs: u64,
    #[serde(default = "default_task_extract_period_secs")]
    pub task_extract_period_secs: u64,

    #[serde(default = "default_time_plan_initial_delay_secs")]
    pub time_plan_initial_delay_secs: u64,
    #[serde(default = "default_time_plan_period_secs")]
    pub time_plan_period_secs: u64,

    #[serde(default = "default_job_package_root")]
    pub job_package_root: String,
}

impl ClusterConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let cfg: ClusterConfig = serde_yaml::from_str(&content)?;
        Ok(cfg)
    }

    pub fn member_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.member_ttl_secs)
    }

    pub fn heartbeat_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_period_secs)
    }

    pub fn member_offline_prune_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.member_offline_prune_after_secs)
    }
}

fn default_member_ttl_secs() -> u64 {
    15
}

fn default_heartbeat_period_secs() -> u64 {
    10
}

fn default_member_reconcile_initial_delay_secs() -> u64 {
    3
}

fn default_member_reconcile_period_secs() -> u64 {
    5
}

fn default_member_offline_prune_after_secs() -> i64 {
    3 * 60 * 60
}

fn default_job_config_reconcile_initial_delay_secs() -> u64 {
    5
}

fn default_job_config_reconcile_period_secs() -> u64 {
    30
}

fn default_job_record_reconcile_initial_delay_secs() -> u64 {
    30
}

fn default_job_record_reconcile_period_secs() -> u64 {
    10
}

fn default_task_extract_initial_delay_secs() -> u64 {
    40
}

fn default_task_extract_period_secs() -> u64 {
    10
}

fn default_time_plan_initial_delay_secs() -> u64 {
    10
}

fn default_time_plan_period_secs() -> u64 {
    30
}

fn default_job_package_root() -> String {
    "Jobs".to_string()
}
