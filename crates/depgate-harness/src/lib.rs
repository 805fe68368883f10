#![forbid(unsafe_code)]

//! Test fixtures for depgate.
//!
//! - [`Scripted`]: a component value whose hooks answer as the test says,
//!   and which flags any `on_enable` that ran before its dependencies were
//!   ready.
//! - [`EventLog`]: one ordered log shared by hooks and observers, so
//!   cross-component ordering can be asserted.
//! - [`Graph`]: a randomizable acyclic graph of scripted components plus an
//!   invariant checker, shared by the property tests and the fuzz target.

pub mod event_log;
pub mod graph;
pub mod recording;
pub mod scripted;

pub use event_log::{Event, EventLog};
pub use graph::{Graph, GraphOp, GraphSpec, NodeSpec};
pub use recording::RecordingObserver;
pub use scripted::{Reply, Scripted, fixture, scripted, scripted_with};
