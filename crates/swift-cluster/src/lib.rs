pub mod cluster;
pub mod config;
pub mod domain;
pub mod error;
pub mod health_heartbeat;
pub mod job_config_reconciler;
pub mod job_package;
pub mod job_record_reconciler;
pub mod local_ip;
pub mod member_registry;
pub mod task_extractor;
pub mod time_plan_scheduler;

pub use cluster::Cluster;
pub use config::ClusterConfig;
pub use error::ClusterError;
pub use health_heartbeat::HealthHeartbeat;
pub use job_config_reconciler::{ManagerJobConfigReconciler, WorkerJobConfigReconciler};
pub use job_package::{DiskJobPackageSource, JobPackageSource};
pub use job_record_reconciler::JobRecordReconciler;
pub use member_registry::MemberRegistry;
pub use task_extractor::TaskExtractor;
pub use time_plan_scheduler::TimePlanScheduler;
