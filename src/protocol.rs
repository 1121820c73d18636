//! Wire protocol types for the task-generation service.
//!
//! Outbound: `{"action": "startTask", "body": <string-or-object>}`.
//! Inbound: `{"status": "processing", ...}` acknowledgements and
//! `{"status": "complete", "result": {...}}` answers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only action the service understands.
pub const START_TASK: &str = "startTask";

/// Body of a request: either an object or a pre-serialized JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestBody {
    Encoded(String),
    Json(Value),
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(encoded: String) -> Self {
        RequestBody::Encoded(encoded)
    }
}

impl From<&str> for RequestBody {
    fn from(encoded: &str) -> Self {
        RequestBody::Encoded(encoded.to_string())
    }
}

/// Outer envelope sent to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: String,
    pub body: RequestBody,
}

impl Envelope {
    /// Wrap a body in a `startTask` envelope.
    pub fn start_task(body: impl Into<RequestBody>) -> Self {
        Self {
            action: START_TASK.to_string(),
            body: body.into(),
        }
    }
}

/// Classification of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Liveness acknowledgement; the request is still running.
    Processing { message: Option<String> },

    /// Final answer; `result` is handed to the normalizer as-is.
    Complete { result: Option<Value> },

    /// Anything without a recognised status.
    Other,
}

impl Frame {
    /// Classify a decoded inbound message by its `status` field.
    pub fn classify(message: &Value) -> Self {
        match message.get("status").and_then(Value::as_str) {
            Some("processing") => Frame::Processing {
                message: message.get("message").and_then(Value::as_str).map(String::from),
            },
            Some("complete") => Frame::Complete {
                result: message.get("result").cloned(),
            },
            _ => Frame::Other,
        }
    }
}

/// How the learner prefers to study.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningStyle {
    #[default]
    Practical,
    Theoretical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Basic,
    #[default]
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Motivation {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Experience {
    None,
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// Optional tuning sent alongside a free-form goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPreferences {
    pub learning_style: LearningStyle,
    pub preferred_complexity: Complexity,
    pub motivation: Motivation,
    pub prior_experience: Experience,
    #[serde(default)]
    pub additional_notes: String,
}

/// A free-form goal to be broken into tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRequest {
    pub goal: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<LearningPreferences>,
}

impl GoalRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            preferences: None,
        }
    }

    pub fn with_preferences(mut self, preferences: LearningPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Request body carrying this goal as an object.
    pub fn into_body(self) -> RequestBody {
        RequestBody::Json(serde_json::json!(self))
    }
}
