//! # Foldline Core
//!
//! Domain types, traits, and error definitions for the Foldline agent core.
//! This crate has **no runtime dependencies** beyond serialization and the
//! channel type used for streaming. It defines the model every other crate
//! implements against.
//!
//! ## Design Philosophy
//!
//! Agent state is never mutated directly. Everything is an [`Event`] in an
//! append-only log, and [`AgentCoreState`] is the pure fold of that log.
//! Collaborators the engine needs (event store, model client, tool resolver,
//! slices) are traits defined here so hosts and tests can swap them freely.

pub mod error;
pub mod event;
pub mod ids;
pub mod message;
pub mod provider;
pub mod slice;
pub mod state;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{CoreEvent, Event, EventInput, RequestOutcome, Usage};
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use message::{ConversationItem, FunctionCall, Role};
pub use provider::{
    ChunkReceiver, LlmClient, LlmClientFactory, LlmRequest, OutputItem, StaticClientFactory,
    StreamChunk, StreamListener,
};
pub use slice::{
    BackgroundJob, Capabilities, CapabilityRequirement, Command, EventSink, RuleContext,
    RuleMatchData, Slice,
};
pub use state::{AgentCoreState, LlmRequestStatus, ModelOpts};
pub use store::EventStore;
pub use tool::{FunctionTool, RuntimeTool, Tool, ToolResolver, ToolSpec};
