//! Consumer-side state between the correlator and a graph surface.
//!
//! Holds the current graph, the user's completion marks and the layout
//! direction. Any change is picked up by the next [`RoadmapView::layout`],
//! which always recomputes from scratch.

use crate::correlator::Outcome;
use crate::layout::{LayoutedGraph, layout_with_completion};
use crate::normalize::{Answer, ErrorKind, StudentAssignments};
use crate::types::{CompletionPolicy, CompletionSet, Direction, Task, TaskGraph};

/// Events a graph surface reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    NodeClicked(String),
    MarkCompleteClicked(String),
    ToggleDirection,
}

/// What handling a [`SurfaceEvent`] changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewChange {
    /// Details for the clicked task.
    Selected(Task),
    Completion { id: String, completed: bool },
    Direction(Direction),
    /// The event referred to a task that is not in the current graph.
    Unknown(String),
}

/// Something that draws a positioned graph.
pub trait GraphSurface {
    fn draw(&mut self, layout: &LayoutedGraph, graph: &TaskGraph);
}

#[derive(Debug, Clone, Default)]
pub struct RoadmapView {
    graph: Option<TaskGraph>,
    completed: CompletionSet,
    direction: Direction,
    policy: CompletionPolicy,
    last_error: Option<ErrorKind>,
    assignments: Option<StudentAssignments>,
}

impl RoadmapView {
    pub fn new(direction: Direction, policy: CompletionPolicy) -> Self {
        Self {
            direction,
            policy,
            ..Default::default()
        }
    }

    pub fn graph(&self) -> Option<&TaskGraph> {
        self.graph.as_ref()
    }

    pub fn completed(&self) -> &CompletionSet {
        &self.completed
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Error from the most recent request, cleared by the next success.
    pub fn last_error(&self) -> Option<&ErrorKind> {
        self.last_error.as_ref()
    }

    pub fn assignments(&self) -> Option<&StudentAssignments> {
        self.assignments.as_ref()
    }

    /// Apply a request outcome. Returns true if the graph was replaced.
    ///
    /// On error the previous graph stays in place.
    pub fn apply(&mut self, outcome: Outcome) -> bool {
        match outcome {
            Ok(Answer::Roadmap(graph)) => {
                self.replace(graph);
                true
            }
            Ok(Answer::Assignments(table)) => {
                self.assignments = Some(table);
                self.last_error = None;
                false
            }
            Err(e) => {
                log::warn!("Keeping current graph after failed request: {}", e);
                self.last_error = Some(e);
                false
            }
        }
    }

    /// Install a graph (e.g. a saved roadmap), applying the completion policy.
    pub fn replace(&mut self, graph: TaskGraph) {
        self.completed.on_replace(&graph, self.policy);
        self.graph = Some(graph);
        self.last_error = None;
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.graph.as_ref().and_then(|g| g.get(id))
    }

    /// Flip the completion mark of a task. None if the task is unknown.
    pub fn toggle_complete(&mut self, id: &str) -> Option<bool> {
        self.task(id)?;
        Some(self.completed.toggle(id))
    }

    pub fn toggle_direction(&mut self) -> Direction {
        self.direction = self.direction.toggled();
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Lay out the current graph.
    pub fn layout(&self) -> Option<LayoutedGraph> {
        self.graph
            .as_ref()
            .map(|graph| layout_with_completion(graph, self.direction, &self.completed))
    }

    /// Draw the current graph, if any. Returns whether anything was drawn.
    pub fn render(&self, surface: &mut dyn GraphSurface) -> bool {
        match (self.layout(), self.graph.as_ref()) {
            (Some(layout), Some(graph)) => {
                surface.draw(&layout, graph);
                true
            }
            _ => false,
        }
    }

    pub fn handle_event(&mut self, event: SurfaceEvent) -> ViewChange {
        match event {
            SurfaceEvent::NodeClicked(id) => match self.task(&id) {
                Some(task) => ViewChange::Selected(task.clone()),
                None => ViewChange::Unknown(id),
            },
            SurfaceEvent::MarkCompleteClicked(id) => match self.toggle_complete(&id) {
                Some(completed) => ViewChange::Completion { id, completed },
                None => ViewChange::Unknown(id),
            },
            SurfaceEvent::ToggleDirection => ViewChange::Direction(self.toggle_direction()),
        }
    }
}
