use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::task::JobTask;

/// Progress of one run of a job, from creation through merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobRecordStatus {
    Pending,
    PlanMaking,
    PlanMade,
    TaskExecuting,
    TaskSyncing,
    TaskMerging,
    TaskMerged,
    Failed,
}

impl JobRecordStatus {
    /// Only a `TaskMerged` prior record permits the time-plan scheduler to
    /// create the next one for the same job; any other status, including
    /// `Failed`, gates further creation until an operator intervenes.
    pub fn allows_next_creation(&self) -> bool {
        matches!(self, JobRecordStatus::TaskMerged)
    }
}

/// One run of a job: the record created when its time-plan fires (or an
/// operator triggers it manually), carrying the task plan once the
/// Manager has built one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub job_name: String,
    pub status: JobRecordStatus,
    /// Keyed by assigned member id; empty until the Manager has planned
    /// this record's tasks.
    #[serde(default)]
    pub task_plan: HashMap<String, Vec<JobTask>>,
    #[serde(skip)]
    pub modify_index: u64,
}

impl JobRecord {
    pub fn new_pending(id: String, job_name: String) -> Self {
        Self {
            id,
            job_name,
            status: JobRecordStatus::Pending,
            task_plan: HashMap::new(),
            modify_index: 0,
        }
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_task_merged_allows_next_creation() {
        assert!(JobRecordStatus::TaskMerged.allows_next_creation());
        assert!(!JobRecordStatus::Failed.allows_next_creation());
        assert!(!JobRecordStatus::Pending.allows_next_creation());
    }

    #[test]
    fn status_serializes_by_name() {
        let r = JobRecord::new_pending("r1".to_string(), "nightly-backup".to_string());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], serde_json::json!("Pending"));
    }

    #[test]
    fn task_plan_round_trips_keyed_by_member() {
        let mut r = JobRecord::new_pending("r1".to_string(), "job".to_string());
        r.task_plan.insert(
            "w1".to_string(),
            vec![JobTask::new("t1".to_string(), "w1".to_string())],
        );
        let json = serde_json::to_string(&r).unwrap();
        let back: JobRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_plan["w1"].len(), 1);
    }
}
