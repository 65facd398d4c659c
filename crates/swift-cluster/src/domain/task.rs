use serde::{Deserialize, Serialize};

/// Lifecycle of a single unit of work assigned to one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Assigned,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// One entry in a job record's task plan, as published under a member id
/// key. `id` is unique within the owning record, not globally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTask {
    pub id: String,
    pub assigned_member_id: String,
    pub state: TaskState,
}

impl JobTask {
    pub fn new(id: String, assigned_member_id: String) -> Self {
        Self {
            id,
            assigned_member_id,
            state: TaskState::Assigned,
        }
    }
}

/// Flattened identity of one task as tracked by the task extractor: which
/// record it belongs to, which task within that record, and who it is
/// assigned to. Two instances are the same running task iff all three
/// fields match, regardless of `state`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskInstance {
    pub job_record_id: String,
    pub task_id: String,
    pub assigned_member_id: String,
}

impl TaskInstance {
    pub fn new(job_record_id: String, task_id: String, assigned_member_id: String) -> Self {
        Self {
            job_record_id,
            task_id,
            assigned_member_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_assigned() {
        let t = JobTask::new("t1".to_string(), "w1".to_string());
        assert_eq!(t.state, TaskState::Assigned);
        assert!(!t.state.is_terminal());
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn instances_compare_by_all_three_fields() {
        let a = TaskInstance::new("r1".to_string(), "t1".to_string(), "w1".to_string());
        let b = TaskInstance::new("r1".to_string(), "t1".to_string(), "w2".to_string());
        assert_ne!(a, b);
    }
}
