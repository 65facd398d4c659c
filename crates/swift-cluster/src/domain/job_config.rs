use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declarative description of a recurring job, published by the Manager
/// and read by everyone. `run_time_plan` is an ordered set of `"HH:MM"`
/// strings compared against the wall clock by the time-plan scheduler —
/// deliberately not a cron expression, just a finite list of times of day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_record_start_time: Option<DateTime<Utc>>,
    pub run_time_plan: Vec<String>,
    /// Package-level settings carried verbatim from `job.json`; this crate
    /// does not interpret them, it only round-trips them to KV and back.
    #[serde(default)]
    pub settings: serde_json::Value,
    /// Not part of the wire value: the KV's CAS token for this key, kept
    /// alongside the decoded struct by the reconcilers.
    #[serde(skip)]
    pub modify_index: u64,
}

impl JobConfig {
    pub fn new(name: String, run_time_plan: Vec<String>, settings: serde_json::Value) -> Self {
        Self {
            name,
            last_record_id: None,
            last_record_start_time: None,
            run_time_plan,
            settings,
            modify_index: 0,
        }
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// True when two configs carry the same run-time plan, settings, and
    /// record pointer — the fields the disk reconciler diffs on. Ignores
    /// `modify_index`, which has no meaning for a file on disk.
    pub fn content_eq(&self, other: &JobConfig) -> bool {
        self.name == other.name
            && self.run_time_plan == other.run_time_plan
            && self.settings == other.settings
            && self.last_record_id == other.last_record_id
            && self.last_record_start_time == other.last_record_start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modify_index_is_not_part_of_the_wire_value() {
        let mut cfg = JobConfig::new("j1".to_string(), vec!["12:00".to_string()], serde_json::json!({}));
        cfg.modify_index = 7;
        let json = serde_json::to_value(&cfg).unwrap();
        assert!(json.get("modify_index").is_none());
    }

    #[test]
    fn wire_shape_uses_camel_case_keys() {
        let mut cfg = JobConfig::new("j1".to_string(), vec!["12:00".to_string()], serde_json::json!({}));
        cfg.last_record_id = Some("r1".to_string());
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["lastRecordId"], serde_json::json!("r1"));
        assert_eq!(json["runTimePlan"], serde_json::json!(["12:00"]));
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = JobConfig::new(
            "nightly-backup".to_string(),
            vec!["02:00".to_string()],
            serde_json::json!({"target": "s3"}),
        );
        let json = serde_json::to_string(&cfg).unwrap();
        let back: JobConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, cfg.name);
        assert_eq!(back.run_time_plan, cfg.run_time_plan);
        assert_eq!(back.settings, cfg.settings);
    }
}
