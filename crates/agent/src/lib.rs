//! The agent core: an event log and the state folded from it.
//!
//! Every change to a conversation is an event appended through one
//! serialized pipeline:
//!
//! 1. **Append** the batch to the log and persist it
//! 2. **Fold** it into [`AgentCoreState`](foldline_core::AgentCoreState)
//!    (core reducer, then each slice reducer)
//! 3. **Evaluate rules**, core first, then slices in registration order
//! 4. **Apply commands**: start or cancel a model request, run a tool,
//!    append more events, schedule background work
//!
//! Model output streams back into the same pipeline, so replaying a
//! persisted log reproduces the state exactly.

pub mod background;
pub mod engine;
pub mod fold;
mod llm_request;
pub mod log;
pub mod registry;

pub use background::BackgroundTracker;
pub use engine::{AgentCore, AgentCoreBuilder};
pub use fold::{fold_event, fold_events};
pub use log::EventLog;
pub use registry::SliceRegistry;
