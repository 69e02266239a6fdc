//! Tool dispatch for Foldline.
//!
//! The [`ToolDispatcher`] turns declared [`ToolSpec`](foldline_core::ToolSpec)s
//! into invocable tools and executes the calls a model response asks for.
//! Implementations come from three places: functions registered locally by
//! name, callbacks registered by id, and methods on the hosting durable actor.

pub mod clock;
pub mod dispatcher;
pub mod durable;
pub mod local;

pub use clock::CurrentTimeTool;
pub use dispatcher::{ToolDispatcher, execute_batch, execute_call};
pub use durable::{DurableActor, DurableMethodTool, ToolDescriptor};
pub use local::FnTool;

/// Create a dispatcher with the built-in local tools registered.
pub fn default_dispatcher() -> ToolDispatcher {
    let mut dispatcher = ToolDispatcher::new();
    dispatcher.register_local(std::sync::Arc::new(CurrentTimeTool));
    dispatcher
}
