#![forbid(unsafe_code)]

//! Core: sequenced task runners, deterministic lab sequences, and
//! thread-safe observer fan-out.

pub mod error;
pub mod lab;
pub mod logging;
pub mod observer_list;
pub mod sequence;
pub mod sequence_thread;

pub use error::SequenceError;
pub use lab::LabSequence;
pub use observer_list::{ObserverId, ObserverList};
pub use sequence::{SequenceId, SharedRunner, Task, TaskRunner, current_sequence, run_or_post};
pub use sequence_thread::{SequenceConfig, SequenceThread};
