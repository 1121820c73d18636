//! Roadmap: goal-to-task-graph client with a layered DAG layout.
//!
//! A [`Session`] keeps one duplex connection to the task-generation service
//! alive (reconnecting after drops), submits one request at a time, and
//! normalizes the loosely-shaped answer into a validated [`TaskGraph`].
//! [`layout`] turns a graph into ranked, positioned nodes for drawing.
//!
//! # Example
//!
//! ```no_run
//! use roadmap::{Config, Direction, GoalRequest, Session, layout};
//! use std::time::Duration;
//!
//! # async fn run() -> eyre::Result<()> {
//! let config = Config::load(None)?;
//! let session = Session::from_config(&config);
//! session.wait_open(Duration::from_secs(10)).await?;
//!
//! match session.request(GoalRequest::new("Learn to bake bread").into_body()).await? {
//!     Ok(answer) => {
//!         if let Some(graph) = answer.roadmap() {
//!             let positioned = layout(graph, Direction::TopToBottom);
//!             println!("{} ranks", positioned.rank_count());
//!         }
//!     }
//!     Err(e) => eprintln!("request failed: {}", e),
//! }
//!
//! session.close();
//! # Ok(())
//! # }
//! ```

mod id;
mod storage;
mod store;
mod types;

pub mod config;
pub mod connection;
pub mod correlator;
pub mod coursework;
pub mod layout;
pub mod normalize;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod view;
pub mod ws;

// Re-export public API
pub use config::Config;
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, SendError};
pub use correlator::{Correlator, CorrelatorConfig, Outcome, PendingRequest, SubmitError, Ticket};
pub use coursework::{CourseworkRequest, Roster, RosterError, Skills, StudentSkill};
pub use id::generate_id;
pub use layout::{LayoutEdge, LayoutNode, LayoutedGraph, layout, layout_with_completion};
pub use normalize::{Answer, ErrorKind, StudentAssignments, normalize, normalize_answer, normalize_dependencies};
pub use protocol::{
    Complexity, Envelope, Experience, Frame, GoalRequest, LearningPreferences, LearningStyle, Motivation, RequestBody,
};
pub use session::Session;
pub use store::{MAX_TITLE_LEN, Store, StoreError, validate_title};
pub use transport::{Duplex, MemoryPeer, MemoryTransport, Transport, TransportEvent};
pub use types::{
    CompletionPolicy, CompletionSet, Direction, SavedRoadmap, Task, TaskGraph, TasksDocument, ValidationError,
};
pub use view::{GraphSurface, RoadmapView, SurfaceEvent, ViewChange};
pub use ws::WebSocketTransport;
