//! Event-driven invalidation triggers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::value_objects::InvalidationPattern;

/// A single predicate an incoming event field must satisfy.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Field must equal this value exactly.
    Equals(Value),
    /// Field must be one of these values (`$in`).
    In(Vec<Value>),
    /// Field, stringified, must match this regex (`$regex`), unanchored.
    Regex(String),
}

impl Condition {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Condition::Equals(expected) => value == expected,
            Condition::In(options) => options.contains(value),
            Condition::Regex(pattern) => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Regex::new(pattern).map(|re| re.is_match(&text)).unwrap_or(false)
            }
        }
    }
}

/// Whether a trigger currently fires on matching events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    /// Fires on matching events.
    Active,
    /// Registered but temporarily disabled.
    Paused,
}

/// A registered event-driven invalidation rule.
#[derive(Debug, Clone)]
pub struct EventTrigger {
    /// Unique identifier.
    pub id: Uuid,
    /// Event type this trigger listens for.
    pub event_type: String,
    /// Pattern used to find keys to invalidate once the trigger fires.
    pub pattern: InvalidationPattern,
    /// Optional namespace scope for the key search.
    pub namespace: Option<String>,
    /// Field predicates an event must satisfy to fire this trigger.
    pub conditions: HashMap<String, Condition>,
    /// Current enabled/disabled state.
    pub status: TriggerStatus,
    /// Total number of times this trigger has fired.
    pub trigger_count: u64,
    /// Timestamp of the most recent firing.
    pub last_triggered: Option<DateTime<Utc>>,
}

impl EventTrigger {
    /// Construct a new, active trigger.
    pub fn new(
        event_type: impl Into<String>,
        pattern: InvalidationPattern,
        namespace: Option<String>,
        conditions: HashMap<String, Condition>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            pattern,
            namespace,
            conditions,
            status: TriggerStatus::Active,
            trigger_count: 0,
            last_triggered: None,
        }
    }

    /// Whether `event_data` satisfies every registered condition for
    /// `event_type`, per spec §4.4's event-matching rule: every
    /// `(field, expected)` pair must have `event_data[field]` present and
    /// either equal, a member of, or regex-matching the expectation.
    pub fn matches(&self, event_type: &str, event_data: &HashMap<String, Value>) -> bool {
        if self.status != TriggerStatus::Active || self.event_type != event_type {
            return false;
        }
        self.conditions.iter().all(|(field, condition)| {
            event_data.get(field).map(|v| condition.matches(v)).unwrap_or(false)
        })
    }

    /// Record a firing.
    pub fn record_fire(&mut self) {
        self.trigger_count += 1;
        self.last_triggered = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger_with(conditions: HashMap<String, Condition>) -> EventTrigger {
        EventTrigger::new(
            "user.updated",
            InvalidationPattern::prefix("user:", true).unwrap(),
            None,
            conditions,
        )
    }

    #[test]
    fn equality_condition_matches() {
        let mut conditions = HashMap::new();
        conditions.insert("plan".to_string(), Condition::Equals(Value::String("pro".to_string())));
        let t = trigger_with(conditions);
        let mut data = HashMap::new();
        data.insert("plan".to_string(), Value::String("pro".to_string()));
        assert!(t.matches("user.updated", &data));
    }

    #[test]
    fn in_condition_matches_membership() {
        let mut conditions = HashMap::new();
        conditions.insert(
            "region".to_string(),
            Condition::In(vec![Value::String("us".to_string()), Value::String("eu".to_string())]),
        );
        let t = trigger_with(conditions);
        let mut data = HashMap::new();
        data.insert("region".to_string(), Value::String("eu".to_string()));
        assert!(t.matches("user.updated", &data));
        data.insert("region".to_string(), Value::String("ap".to_string()));
        assert!(!t.matches("user.updated", &data));
    }

    #[test]
    fn regex_condition_is_unanchored() {
        let mut conditions = HashMap::new();
        conditions.insert("message".to_string(), Condition::Regex("fail".to_string()));
        let t = trigger_with(conditions);
        let mut data = HashMap::new();
        data.insert("message".to_string(), Value::String("update fail: timeout".to_string()));
        assert!(t.matches("user.updated", &data));
    }

    #[test]
    fn paused_trigger_never_matches() {
        let mut t = trigger_with(HashMap::new());
        t.status = TriggerStatus::Paused;
        assert!(!t.matches("user.updated", &HashMap::new()));
    }
}
