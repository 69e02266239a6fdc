//! Outward-facing status surfaces for Foldline.
//!
//! - **Status indicator**: renders the "agent is busy" line for a pending
//!   tool call from the tool's `${...}` template
//! - **Slack**: thread status payloads and a slice that keeps a thread's
//!   status in step with the event log

pub mod slack;
pub mod status_indicator;

pub use slack::{
    SlackThreadStatusPayload, ThreadStatus, ThreadStatusSink, ThreadStatusSlice,
    build_slack_thread_status_payload,
};
pub use status_indicator::{StatusIndicatorRequest, render_template, resolve_status_indicator_text};
