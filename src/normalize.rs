//! Response normalization: arbitrary `result` payloads into a validated [`TaskGraph`].
//!
//! The service does not commit to a payload shape. The answer may sit under
//! `content` or `text`, as an object or as a JSON string (sometimes encoded
//! twice), dependencies may be arrays, numbers or strings, and refusals arrive
//! as free text instead of a structured error. Everything here is a pure
//! function over `serde_json::Value`; transport concerns live elsewhere.

use crate::types::{Task, TaskGraph};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Name used when a task entry carries no usable `name_of_the_task`.
pub const UNNAMED_TASK: &str = "Unnamed Task";

/// Description used when a task entry carries no usable `description`.
pub const NO_DESCRIPTION: &str = "No description available";

/// Case-sensitive phrases that mark a free-text refusal from the service.
pub const REFUSAL_SENTINELS: &[&str] = &["cannot assist", "I'm sorry", "error processing"];

/// Maximum number of nested JSON-string layers unwrapped before giving up.
const MAX_DECODE_DEPTH: usize = 4;

/// Classified failure of a request, as surfaced to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// `result` absent or carrying neither `text` nor `content`.
    EmptyResponse,
    /// The service answered with a refusal; carries the raw text.
    ServerRefused(String),
    /// The payload could not be decoded as JSON.
    MalformedPayload(String),
    /// Decoded, but no `tasks` sequence.
    InvalidShape(String),
    /// No `complete` frame arrived within the configured bound.
    Timeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::EmptyResponse => write!(f, "the service returned an empty response"),
            ErrorKind::ServerRefused(text) => write!(f, "the service refused the request: {}", text),
            ErrorKind::MalformedPayload(detail) => write!(f, "malformed payload: {}", detail),
            ErrorKind::InvalidShape(detail) => write!(f, "unexpected payload shape: {}", detail),
            ErrorKind::Timeout => write!(f, "timed out waiting for the service to complete the request"),
        }
    }
}

impl std::error::Error for ErrorKind {}

/// Student id → (task slot → assignment) table returned for coursework requests.
pub type StudentAssignments = BTreeMap<String, BTreeMap<String, String>>;

/// A successfully normalized answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Roadmap(TaskGraph),
    Assignments(StudentAssignments),
}

impl Answer {
    pub fn roadmap(&self) -> Option<&TaskGraph> {
        match self {
            Answer::Roadmap(graph) => Some(graph),
            Answer::Assignments(_) => None,
        }
    }
}

/// Normalize a `result` object into a task graph.
pub fn normalize(result: Option<&Value>) -> Result<TaskGraph, ErrorKind> {
    let decoded = decode_result(result)?;
    tasks_from_value(&decoded)
}

/// Normalize a `result` object into either a task graph or a student assignment table.
pub fn normalize_answer(result: Option<&Value>) -> Result<Answer, ErrorKind> {
    let decoded = decode_result(result)?;
    if let Some(assignments) = assignments_from_value(&decoded) {
        return Ok(Answer::Assignments(assignments));
    }
    tasks_from_value(&decoded).map(Answer::Roadmap)
}

/// Pick the answer out of `result` (preferring `content` over `text`) and decode it.
fn decode_result(result: Option<&Value>) -> Result<Value, ErrorKind> {
    let result = match result {
        Some(Value::Object(map)) => map,
        _ => return Err(ErrorKind::EmptyResponse),
    };

    let candidate = ["content", "text"]
        .iter()
        .filter_map(|field| result.get(*field))
        .find(|v| !is_blank(v))
        .ok_or(ErrorKind::EmptyResponse)?;

    match candidate {
        Value::String(raw) => decode_text(raw, 0),
        other => Ok(other.clone()),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Decode a JSON-encoded string, unwrapping string-in-string layers.
fn decode_text(raw: &str, depth: usize) -> Result<Value, ErrorKind> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(inner)) if depth < MAX_DECODE_DEPTH => match decode_text(&inner, depth + 1) {
            Ok(value) => Ok(value),
            // The inner layer is plain prose rather than more JSON.
            Err(ErrorKind::MalformedPayload(_)) => Ok(synthetic_tasks(&inner)),
            Err(e) => Err(e),
        },
        Ok(Value::String(inner)) => Ok(synthetic_tasks(&inner)),
        Ok(value) => Ok(value),
        Err(e) => {
            if let Some(refusal) = refusal(raw) {
                log::warn!("Service refused request: {}", refusal);
                return Err(ErrorKind::ServerRefused(refusal));
            }
            Err(ErrorKind::MalformedPayload(e.to_string()))
        }
    }
}

fn refusal(text: &str) -> Option<String> {
    REFUSAL_SENTINELS
        .iter()
        .any(|sentinel| text.contains(sentinel))
        .then(|| text.to_string())
}

/// Degraded fallback for an answer that decodes to plain text: one task describing it.
fn synthetic_tasks(text: &str) -> Value {
    json!({
        "tasks": [{
            "id": 1,
            "name_of_the_task": UNNAMED_TASK,
            "description": text,
            "dependencies": [],
            "estimated_duration": 0
        }]
    })
}

fn tasks_from_value(decoded: &Value) -> Result<TaskGraph, ErrorKind> {
    let entries = match decoded.get("tasks") {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ErrorKind::InvalidShape(format!(
                "`tasks` is {}, expected a sequence",
                type_name(other)
            )));
        }
        None => {
            return Err(ErrorKind::InvalidShape(format!(
                "{} without a `tasks` field",
                type_name(decoded)
            )));
        }
    };

    let tasks = entries.iter().enumerate().map(|(index, entry)| task_from_entry(index, entry));
    // Every field has been coerced into range, so validation cannot fail here.
    TaskGraph::from_tasks(tasks).map_err(|e| ErrorKind::InvalidShape(e.to_string()))
}

fn task_from_entry(index: usize, entry: &Value) -> Task {
    let fallback_id = index as i64 + 1;
    let id = match entry.get("id") {
        None | Some(Value::Null) => fallback_id,
        Some(raw) => match coerce_id(raw) {
            Some(id) if id > 0 => id,
            _ => {
                log::warn!("Task at index {} has unusable id {}, using {}", index, raw, fallback_id);
                fallback_id
            }
        },
    };

    let mut dependencies = normalize_dependencies(entry.get("dependencies"));
    if dependencies.contains(&id) {
        log::warn!("Dropping self-dependency of task {}", id);
        dependencies.retain(|dep| *dep != id);
    }

    Task {
        id,
        name: non_empty_str(entry.get("name_of_the_task")).unwrap_or(UNNAMED_TASK).to_string(),
        description: non_empty_str(entry.get("description"))
            .unwrap_or(NO_DESCRIPTION)
            .to_string(),
        dependencies,
        estimated_duration: duration(entry.get("estimated_duration")),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn duration(value: Option<&Value>) -> f64 {
    let minutes = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match minutes {
        Some(m) if m.is_finite() && m >= 0.0 => m,
        _ => 0.0,
    }
}

/// Normalize a raw `dependencies` value into a list of task ids.
///
/// Accepts a sequence, a single number, or a string holding JSON or a bare
/// number. Entries that are not finite integers are dropped and logged.
pub fn normalize_dependencies(raw: Option<&Value>) -> Vec<i64> {
    match raw {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => coerce_all(items),
        Some(number @ Value::Number(_)) => coerce_all(std::slice::from_ref(number)),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Vec::new();
            }
            match serde_json::from_str::<Value>(s) {
                Ok(Value::Array(items)) => coerce_all(&items),
                Ok(scalar) => coerce_all(std::slice::from_ref(&scalar)),
                Err(_) => match s.parse::<f64>() {
                    Ok(n) => integral(n).into_iter().collect(),
                    Err(_) => {
                        log::warn!("Ignoring unparseable dependencies {:?}", s);
                        Vec::new()
                    }
                },
            }
        }
        Some(other) => {
            log::warn!("Ignoring dependencies of type {}", type_name(other));
            Vec::new()
        }
    }
}

fn coerce_all(items: &[Value]) -> Vec<i64> {
    items
        .iter()
        .filter_map(|item| {
            let id = coerce_id(item);
            if id.is_none() {
                log::warn!("Dropping dependency entry {} (not an integer)", item);
            }
            id
        })
        .collect()
}

fn coerce_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn integral(n: f64) -> Option<i64> {
    (n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64).then_some(n as i64)
}

/// Recognise the `{"S1": {"task_1": ...}, ...}` assignment table.
fn assignments_from_value(decoded: &Value) -> Option<StudentAssignments> {
    let map = decoded.as_object()?;
    if map.contains_key("tasks") || !map.contains_key("S1") {
        return None;
    }

    let table = map
        .iter()
        .map(|(student, slots)| {
            let slots = slots
                .as_object()
                .map(|slots| {
                    slots
                        .iter()
                        .map(|(slot, v)| {
                            let text = match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            (slot.clone(), text)
                        })
                        .collect()
                })
                .unwrap_or_default();
            (student.clone(), slots)
        })
        .collect();
    Some(table)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
