//! Proxy tools for methods on the hosting durable actor.
//!
//! The actor is the long-lived object that owns the conversation. A
//! `agent_durable_object_tool` spec names one of its methods; the dispatcher
//! asks the actor to describe that method and wraps it in a
//! [`DurableMethodTool`] that forwards calls.

use std::sync::Arc;

use async_trait::async_trait;
use foldline_core::error::ToolExecutionError;
use foldline_core::tool::Tool;
use serde_json::Value;

/// What the actor reports about one of its methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub description: String,
    pub parameters: Value,
}

/// The hosting actor, as seen by the tool dispatcher.
#[async_trait]
pub trait DurableActor: Send + Sync {
    /// Describe a callable method. `None` means there is no such method.
    fn describe(&self, method: &str) -> Option<ToolDescriptor>;

    /// Invoke a method with JSON arguments.
    async fn invoke(&self, method: &str, arguments: Value) -> Result<Value, ToolExecutionError>;
}

/// Forwards calls to one method of a [`DurableActor`].
pub struct DurableMethodTool {
    actor: Arc<dyn DurableActor>,
    method: String,
    descriptor: ToolDescriptor,
}

impl DurableMethodTool {
    pub fn new(actor: Arc<dyn DurableActor>, method: impl Into<String>, descriptor: ToolDescriptor) -> Self {
        Self {
            actor,
            method: method.into(),
            descriptor,
        }
    }
}

#[async_trait]
impl Tool for DurableMethodTool {
    fn name(&self) -> &str {
        &self.method
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameters_schema(&self) -> Value {
        self.descriptor.parameters.clone()
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolExecutionError> {
        self.actor.invoke(&self.method, arguments).await
    }
}
