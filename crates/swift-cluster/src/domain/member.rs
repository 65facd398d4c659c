use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag distinguishing the cluster's single Manager from its Workers.
/// Serializes by its symbolic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberRole {
    Manager,
    Worker,
}

/// A cluster participant. `online` mirrors the wire's `status` field
/// (1=online, 0=offline) as a bool on the Rust side; the `status_as_int`
/// module keeps the JSON shape byte-compatible with a hand-authored
/// `{"status": 1}` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub role: MemberRole,
    #[serde(rename = "status", with = "status_as_int")]
    pub online: bool,
    pub first_register_time: DateTime<Utc>,
    pub online_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_time: Option<DateTime<Utc>>,
}

impl Member {
    pub fn new_online(id: String, role: MemberRole, now: DateTime<Utc>) -> Self {
        Self {
            id,
            role,
            online: true,
            first_register_time: now,
            online_time: now,
            offline_time: None,
        }
    }

    pub fn mark_online(&mut self, now: DateTime<Utc>) {
        self.online = true;
        self.online_time = now;
        self.offline_time = None;
    }

    pub fn mark_offline(&mut self, now: DateTime<Utc>) {
        self.online = false;
        if self.offline_time.is_none() {
            self.offline_time = Some(now);
        }
    }

    /// True once this member has been continuously offline for longer than
    /// `threshold`.
    pub fn offline_past(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        match self.offline_time {
            Some(since) => !self.online && now - since > threshold,
            None => false,
        }
    }
}

mod status_as_int {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(online: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(if *online { 1 } else { 0 })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        let v = u8::deserialize(d)?;
        Ok(v != 0)
    }
}
