//! Closure-backed tools, for registering host functions without a new type.

use std::future::Future;

use async_trait::async_trait;
use foldline_core::error::ToolExecutionError;
use foldline_core::tool::Tool;
use futures::future::BoxFuture;
use serde_json::Value;

type Handler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolExecutionError>> + Send + Sync>;

/// A tool whose behaviour is an async closure.
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    handler: Handler,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolExecutionError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Box::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolExecutionError> {
        (self.handler)(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closure_runs_with_arguments() {
        let tool = FnTool::new(
            "double",
            "Doubles n",
            serde_json::json!({"type": "object"}),
            |args| async move {
                let n = args["n"].as_i64().unwrap_or(0);
                Ok(serde_json::json!(n * 2))
            },
        );
        assert_eq!(tool.name(), "double");
        let out = tool.execute(serde_json::json!({"n": 21})).await.unwrap();
        assert_eq!(out, 42);
    }
}
