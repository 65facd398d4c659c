use std::net::{IpAddr, UdpSocket};
use std::sync::Arc;

use swift_cluster::domain::MemberRole;
use swift_cluster::{
    local_ip, Cluster, ClusterConfig, DiskJobPackageSource, HealthHeartbeat, JobRecordReconciler,
    ManagerJobConfigReconciler, MemberRegistry, TaskExtractor, TimePlanScheduler,
    WorkerJobConfigReconciler,
};
use swift_kv::{InMemoryKvStore, InMemoryServiceRegistry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/swift.yaml".to_string());
    let config = ClusterConfig::load(&config_path).unwrap_or_else(|e| {
        tracing::warn!(path = %config_path, error = %e, "falling back to default cluster config");
        serde_yaml::from_str("cluster_name: swift\n").expect("default config is valid yaml")
    });

    let role = match std::env::var("SWIFT_ROLE").as_deref() {
        Ok("manager") | Ok("Manager") => MemberRole::Manager,
        _ => MemberRole::Worker,
    };
    let local_id = std::env::var("SWIFT_LOCAL_ID").unwrap_or_else(|_| detect_local_ip().to_string());

    tracing::info!(cluster = %config.cluster_name, local_id = %local_id, role = ?role, "starting swift cluster member");

    // A real deployment injects a consensus-backed KV client (e.g. Consul)
    // here; the adapter's contract is what this crate depends on, not a
    // specific implementation — see crates/swift-kv.
    let kv = Arc::new(InMemoryKvStore::new());
    let registry = Arc::new(InMemoryServiceRegistry::new());

    let cluster = Arc::new(Cluster::new(
        config.cluster_name.clone(),
        local_id.clone(),
        role,
        kv,
        registry.clone(),
    ));

    let heartbeat = HealthHeartbeat::new(
        registry,
        local_id.clone(),
        format!("{local_id}:7650"),
        config.clone(),
    );
    heartbeat.init().await?;

    let member_registry = Arc::new(MemberRegistry::new(cluster.clone(), config.clone()));
    member_registry.register(&local_id, role).await?;
    member_registry.start_monitor();

    let job_record_reconciler = Arc::new(JobRecordReconciler::new(cluster.clone(), config.clone()));
    job_record_reconciler.start_monitor();

    let task_extractor = Arc::new(TaskExtractor::new(cluster.clone(), config.clone()));
    task_extractor.start_monitor();

    let package_source = Arc::new(DiskJobPackageSource::new(config.job_package_root.clone()));

    let manager_reconciler;
    let time_plan_scheduler;
    let worker_reconciler;
    if role == MemberRole::Manager {
        manager_reconciler = Some(Arc::new(ManagerJobConfigReconciler::new(
            cluster.clone(),
            config.clone(),
            package_source.clone(),
        )));
        manager_reconciler.as_ref().unwrap().start_monitor();

        time_plan_scheduler = Some(Arc::new(TimePlanScheduler::new(cluster.clone(), config.clone(), package_source)));
        time_plan_scheduler.as_ref().unwrap().start_monitor();
        worker_reconciler = None;
    } else {
        worker_reconciler = Some(Arc::new(WorkerJobConfigReconciler::new(cluster.clone(), config.clone())));
        worker_reconciler.as_ref().unwrap().start_monitor();
        manager_reconciler = None;
        time_plan_scheduler = None;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    heartbeat.stop();
    member_registry.stop_monitor();
    job_record_reconciler.stop_monitor();
    task_extractor.stop_monitor();
    if let Some(r) = &manager_reconciler {
        r.stop_monitor();
    }
    if let Some(s) = &time_plan_scheduler {
        s.stop_monitor();
    }
    if let Some(r) = &worker_reconciler {
        r.stop_monitor();
    }

    Ok(())
}

/// Best-effort local IPv4 discovery with no platform-specific NIC
/// enumeration dependency: opening a UDP socket toward an arbitrary
/// routable address and reading back its local endpoint reveals which
/// interface the kernel would route through, without sending a packet.
/// Falls back to loopback if the host has no route at all (e.g. sandboxed
/// test environments).
fn detect_local_ip() -> IpAddr {
    let candidate = UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or_else(|_| IpAddr::from([127, 0, 0, 1]));

    local_ip::select_local_ip(&[candidate]).unwrap_or(candidate)
}
