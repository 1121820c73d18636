//! Core data types for roadmap task graphs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A unit of work produced by the task-generation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier within its graph (> 0)
    pub id: i64,

    /// Short name of the task
    #[serde(rename = "name_of_the_task")]
    pub name: String,

    /// Longer description
    pub description: String,

    /// Ids of prerequisite tasks; may reference ids outside the graph
    #[serde(default)]
    pub dependencies: Vec<i64>,

    /// Estimated duration in minutes
    #[serde(default)]
    pub estimated_duration: f64,
}

impl Task {
    /// Canonical graph key for this task.
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    /// Validate the task's fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id <= 0 {
            return Err(ValidationError::NonPositiveId(self.id));
        }
        if self.dependencies.contains(&self.id) {
            return Err(ValidationError::SelfDependency(self.id));
        }
        if !self.estimated_duration.is_finite() || self.estimated_duration < 0.0 {
            return Err(ValidationError::InvalidDuration(self.id));
        }
        Ok(())
    }
}

/// Validation errors for tasks and task graphs.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    NonPositiveId(i64),
    SelfDependency(i64),
    InvalidDuration(i64),
    KeyMismatch { key: String, id: i64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NonPositiveId(id) => write!(f, "task id must be positive, got {}", id),
            ValidationError::SelfDependency(id) => write!(f, "task {} depends on itself", id),
            ValidationError::InvalidDuration(id) => {
                write!(f, "task {} has a negative or non-finite duration", id)
            }
            ValidationError::KeyMismatch { key, id } => {
                write!(f, "graph key '{}' does not match task id {}", key, id)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Wire/persistence shape of a task graph: `{"tasks": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TasksDocument {
    pub tasks: Vec<Task>,
}

/// Validated set of tasks keyed by the decimal form of each task id.
///
/// Immutable once built; a new response replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TasksDocument", into = "TasksDocument")]
pub struct TaskGraph {
    tasks: BTreeMap<String, Task>,
}

impl TaskGraph {
    /// Build a graph from tasks. Later tasks with the same id overwrite earlier ones.
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for task in tasks {
            task.validate()?;
            map.insert(task.key(), task);
        }
        Ok(Self { tasks: map })
    }

    /// Get a task by its string key.
    pub fn get(&self, key: &str) -> Option<&Task> {
        self.tasks.get(key)
    }

    /// Check whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True if the graph holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterate keys in map order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|k| k.as_str())
    }

    /// Tasks sorted by numeric id.
    pub fn tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Sum of all estimated durations.
    pub fn total_duration(&self) -> f64 {
        self.tasks.values().map(|t| t.estimated_duration).sum()
    }

    /// Convert to the `{"tasks": [...]}` document, ordered by id.
    pub fn to_document(&self) -> TasksDocument {
        TasksDocument {
            tasks: self.tasks().into_iter().cloned().collect(),
        }
    }
}

impl TryFrom<TasksDocument> for TaskGraph {
    type Error = ValidationError;

    fn try_from(doc: TasksDocument) -> Result<Self, Self::Error> {
        Self::from_tasks(doc.tasks)
    }
}

impl From<TaskGraph> for TasksDocument {
    fn from(graph: TaskGraph) -> Self {
        graph.to_document()
    }
}

/// Layout direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "TB")]
    TopToBottom,
    #[serde(rename = "LR")]
    LeftToRight,
}

impl Direction {
    /// The other direction.
    pub fn toggled(self) -> Self {
        match self {
            Direction::TopToBottom => Direction::LeftToRight,
            Direction::LeftToRight => Direction::TopToBottom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::TopToBottom => "TB",
            Direction::LeftToRight => "LR",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TB" => Ok(Direction::TopToBottom),
            "LR" => Ok(Direction::LeftToRight),
            other => Err(format!("unknown direction '{}': expected TB or LR", other)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to the completion set when a new graph replaces the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionPolicy {
    /// Start the new graph with nothing completed.
    #[default]
    Reset,
    /// Keep completion marks for ids that still exist in the new graph.
    CarryOver,
}

/// Task keys the user has marked done. Local state, never sent to the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionSet {
    done: HashSet<String>,
}

impl CompletionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the mark for a key. Returns the new state.
    pub fn toggle(&mut self, key: &str) -> bool {
        if self.done.remove(key) {
            false
        } else {
            self.done.insert(key.to_string());
            true
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.done.contains(key)
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    pub fn clear(&mut self) {
        self.done.clear();
    }

    /// Drop marks for keys not present in `graph`.
    pub fn retain_in(&mut self, graph: &TaskGraph) {
        self.done.retain(|key| graph.contains(key));
    }

    /// Apply a replacement policy for a freshly installed graph.
    pub fn on_replace(&mut self, graph: &TaskGraph, policy: CompletionPolicy) {
        match policy {
            CompletionPolicy::Reset => self.clear(),
            CompletionPolicy::CarryOver => self.retain_in(graph),
        }
    }
}

/// A task graph saved under a title.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedRoadmap {
    /// Unique identifier (format: "rm-" + 10 hex chars)
    pub id: String,

    pub title: String,

    /// Stored as the `{"tasks": [...]}` document
    pub graph: TaskGraph,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Tombstone marker in the append-only log
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task(id: i64, deps: &[i64]) -> Task {
        Task {
            id,
            name: format!("Task {}", id),
            description: "desc".to_string(),
            dependencies: deps.to_vec(),
            estimated_duration: 5.0,
        }
    }

    #[test]
    fn test_task_validation_valid() {
        assert!(make_task(1, &[2, 3]).validate().is_ok());
    }

    #[test]
    fn test_task_validation_self_dependency() {
        assert_eq!(make_task(4, &[1, 4]).validate(), Err(ValidationError::SelfDependency(4)));
    }

    #[test]
    fn test_task_validation_non_positive_id() {
        assert_eq!(make_task(0, &[]).validate(), Err(ValidationError::NonPositiveId(0)));
    }

    #[test]
    fn test_task_validation_negative_duration() {
        let mut task = make_task(2, &[]);
        task.estimated_duration = -1.0;
        assert_eq!(task.validate(), Err(ValidationError::InvalidDuration(2)));
    }

    #[test]
    fn test_graph_keys_match_ids() {
        let graph = TaskGraph::from_tasks(vec![make_task(10, &[]), make_task(2, &[10])]).unwrap();
        assert!(graph.contains("10"));
        assert!(graph.contains("2"));
        assert_eq!(graph.get("2").unwrap().dependencies, vec![10]);
        // sorted numerically, not lexically
        let ids: Vec<i64> = graph.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 10]);
    }

    #[test]
    fn test_graph_last_write_wins() {
        let mut second = make_task(1, &[]);
        second.name = "Second".to_string();
        let graph = TaskGraph::from_tasks(vec![make_task(1, &[]), second]).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get("1").unwrap().name, "Second");
    }

    #[test]
    fn test_graph_serializes_as_tasks_document() {
        let graph = TaskGraph::from_tasks(vec![make_task(1, &[]), make_task(2, &[1])]).unwrap();
        let value = serde_json::to_value(&graph).unwrap();
        assert_eq!(value["tasks"][1]["name_of_the_task"], "Task 2");
        assert_eq!(value["tasks"][1]["dependencies"][0], 1);

        let back: TaskGraph = serde_json::from_value(value).unwrap();
        assert_eq!(back, graph);
    }

    #[test]
    fn test_graph_deserialize_rejects_invalid_task() {
        let json = r#"{"tasks":[{"id":3,"name_of_the_task":"x","description":"y","dependencies":[3],"estimated_duration":1}]}"#;
        assert!(serde_json::from_str::<TaskGraph>(json).is_err());
    }

    #[test]
    fn test_direction_toggle_and_parse() {
        assert_eq!(Direction::TopToBottom.toggled(), Direction::LeftToRight);
        assert_eq!("lr".parse::<Direction>().unwrap(), Direction::LeftToRight);
        assert!("diagonal".parse::<Direction>().is_err());
        assert_eq!(serde_json::to_string(&Direction::TopToBottom).unwrap(), "\"TB\"");
    }

    #[test]
    fn test_completion_toggle() {
        let mut done = CompletionSet::new();
        assert!(done.toggle("1"));
        assert!(done.contains("1"));
        assert!(!done.toggle("1"));
        assert!(done.is_empty());
    }

    #[test]
    fn test_completion_replacement_policies() {
        let graph = TaskGraph::from_tasks(vec![make_task(1, &[]), make_task(2, &[])]).unwrap();

        let mut done = CompletionSet::new();
        done.toggle("1");
        done.toggle("7");
        done.on_replace(&graph, CompletionPolicy::CarryOver);
        assert!(done.contains("1"));
        assert!(!done.contains("7"));

        done.on_replace(&graph, CompletionPolicy::Reset);
        assert!(done.is_empty());
    }

    #[test]
    fn test_saved_roadmap_serialization() {
        let now = Utc::now();
        let saved = SavedRoadmap {
            id: "rm-0123456789".to_string(),
            title: "Bread".to_string(),
            graph: TaskGraph::from_tasks(vec![make_task(1, &[])]).unwrap(),
            created_at: now,
            updated_at: now,
            deleted: false,
        };

        let json = serde_json::to_value(&saved).unwrap();
        assert_eq!(json["graph"]["tasks"][0]["name_of_the_task"], "Task 1");
        assert!(json.get("deleted").is_none());

        let back: SavedRoadmap = serde_json::from_value(json).unwrap();
        assert_eq!(back, saved);
    }
}
