pub mod job_config;
pub mod job_record;
pub mod member;
pub mod task;

pub use job_config::JobConfig;
pub use job_record::{JobRecord, JobRecordStatus};
pub use member::{Member, MemberRole};
pub use task::{JobTask, TaskInstance, TaskState};
