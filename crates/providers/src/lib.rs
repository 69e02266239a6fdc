//! Model client implementations for Foldline.
//!
//! All clients implement [`foldline_core::LlmClient`]: open one streaming
//! request, hand back a bounded receiver of chunks.

pub mod openai_responses;
pub mod scripted;
pub mod sse;

pub use openai_responses::OpenAiResponsesClient;
pub use scripted::{Script, ScriptedClient};
