use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CONDITION_READY: &str = "Ready";

pub const REASON_SUCCEEDED: &str = "Succeeded";
pub const REASON_PENDING: &str = "Pending";
pub const REASON_FAILED: &str = "Failed";

/// Tri-state value of a condition. Serializes as `True`, `False` or `Unknown`.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One entry of a resource's `status.conditions`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Condition stamped with the current time.
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn ready() -> Self {
        Self::new(
            CONDITION_READY,
            ConditionStatus::True,
            REASON_SUCCEEDED,
            "objects successfully applied",
        )
    }

    pub fn pending(message: impl Into<String>) -> Self {
        Self::new(CONDITION_READY, ConditionStatus::False, REASON_PENDING, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(CONDITION_READY, ConditionStatus::False, REASON_FAILED, message)
    }

    pub fn is_ready(&self) -> bool {
        self.type_ == CONDITION_READY && self.status == ConditionStatus::True
    }
}

/// Replaces the whole condition list with `condition`.
///
/// The transition time is carried over when neither status nor reason
/// changed, so re-reporting the same state leaves the object untouched.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    if let Some(previous) = conditions
        .iter()
        .find(|c| c.type_ == condition.type_)
    {
        if previous.status == condition.status && previous.reason == condition.reason {
            condition.last_transition_time = previous.last_transition_time;
        }
    }
    *conditions = vec![condition];
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn status_display() {
        assert_eq!(ConditionStatus::True.to_string(), "True");
        assert_eq!(ConditionStatus::False.to_string(), "False");
        assert_eq!(ConditionStatus::default(), ConditionStatus::Unknown);
    }

    #[test]
    fn set_condition_replaces_instead_of_appending() {
        let mut conditions = vec![Condition::pending("waiting"), Condition::failed("boom")];
        set_condition(&mut conditions, Condition::ready());
        assert_eq!(conditions.len(), 1);
        assert!(conditions[0].is_ready());
    }

    #[test]
    fn unchanged_state_keeps_transition_time() {
        let mut earlier = Condition::ready();
        earlier.last_transition_time -= Duration::minutes(5);
        let stamp = earlier.last_transition_time;
        let mut conditions = vec![earlier];

        set_condition(&mut conditions, Condition::ready());
        assert_eq!(conditions[0].last_transition_time, stamp);

        set_condition(&mut conditions, Condition::pending("identity not issued"));
        assert_ne!(conditions[0].last_transition_time, stamp);
        assert_eq!(conditions[0].reason, REASON_PENDING);
    }

    #[test]
    fn serializes_with_kubernetes_field_names() {
        let value = serde_json::to_value(Condition::failed("x")).unwrap();
        assert_eq!(value["type"], "Ready");
        assert_eq!(value["status"], "False");
        assert!(value.get("lastTransitionTime").is_some());
    }
}
