//! The tool dispatcher: resolve specs, execute calls.
//!
//! Resolution is strict. A spec with no registered implementation is an
//! error, never a silent fallback, and two specs that resolve to the same
//! name are rejected so the model cannot be handed an ambiguous tool list.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use foldline_core::error::{DispatchError, ToolExecutionError, panic_message};
use foldline_core::event::{CoreEvent, EventInput, ToolCallError};
use foldline_core::message::{ConversationItem, FunctionCall};
use foldline_core::tool::{FunctionTool, RuntimeTool, Tool, ToolResolver, ToolSpec};
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::durable::{DurableActor, DurableMethodTool};

/// Registered tool implementations.
///
/// The dispatcher uses these to:
/// 1. Turn a state's declared tool specs into runtime tools for a request
/// 2. Look up and execute tools when the model calls them
#[derive(Default)]
pub struct ToolDispatcher {
    local: HashMap<String, Arc<dyn Tool>>,
    callables: HashMap<String, Arc<dyn Tool>>,
    actor: Option<Arc<dyn DurableActor>>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local function under its own name. Replaces any existing
    /// function with the same name.
    pub fn register_local(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.local.insert(name, tool);
    }

    /// Register a callback under an id referenced by `serialized_callable_tool`.
    pub fn register_callable(&mut self, id: impl Into<String>, tool: Arc<dyn Tool>) {
        self.callables.insert(id.into(), tool);
    }

    /// Attach the hosting actor that backs `agent_durable_object_tool` specs.
    pub fn with_durable_actor(mut self, actor: Arc<dyn DurableActor>) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Names of registered local functions, sorted.
    pub fn local_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.local.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn resolve_one(&self, spec: &ToolSpec) -> Result<RuntimeTool, DispatchError> {
        let unresolved = |tool: &str| DispatchError::Unresolved {
            tool: tool.to_string(),
            kind: spec.kind().to_string(),
        };

        let resolved = match spec {
            ToolSpec::OpenaiBuiltin { openai_tool } => RuntimeTool::Builtin(openai_tool.clone()),

            ToolSpec::AgentDurableObjectTool {
                method_name,
                override_name,
                override_description,
                override_input_json_schema,
                strict,
                status_indicator_text,
            } => {
                let actor = self.actor.as_ref().ok_or_else(|| unresolved(method_name))?;
                let descriptor = actor
                    .describe(method_name)
                    .ok_or_else(|| unresolved(method_name))?;
                let proxy = DurableMethodTool::new(Arc::clone(actor), method_name, descriptor.clone());
                RuntimeTool::Function(FunctionTool {
                    name: override_name.clone().unwrap_or_else(|| method_name.clone()),
                    description: override_description
                        .clone()
                        .unwrap_or(descriptor.description),
                    parameters: override_input_json_schema
                        .clone()
                        .unwrap_or(descriptor.parameters),
                    strict: strict.unwrap_or(false),
                    status_indicator_text: status_indicator_text.clone(),
                    tool: Arc::new(proxy),
                })
            }

            ToolSpec::SerializedCallableTool {
                callable,
                override_name,
                override_description,
                override_input_json_schema,
                strict,
                status_indicator_text,
            } => {
                let tool = self
                    .callables
                    .get(&callable.id)
                    .ok_or_else(|| unresolved(&callable.id))?;
                let mut function = FunctionTool::from_tool(Arc::clone(tool));
                if let Some(name) = override_name {
                    function.name = name.clone();
                }
                if let Some(description) = override_description {
                    function.description = description.clone();
                }
                if let Some(schema) = override_input_json_schema {
                    function.parameters = schema.clone();
                }
                function.strict = strict.unwrap_or(false);
                function.status_indicator_text = status_indicator_text.clone();
                RuntimeTool::Function(function)
            }

            ToolSpec::LocalFunction {
                name,
                strict,
                status_indicator_text,
            } => {
                let tool = self.local.get(name).ok_or_else(|| unresolved(name))?;
                let mut function = FunctionTool::from_tool(Arc::clone(tool));
                function.strict = strict.unwrap_or(false);
                function.status_indicator_text = status_indicator_text.clone();
                RuntimeTool::Function(function)
            }
        };
        Ok(resolved)
    }
}

impl ToolResolver for ToolDispatcher {
    fn resolve(&self, specs: &[ToolSpec]) -> Result<Vec<RuntimeTool>, DispatchError> {
        let mut seen = HashSet::new();
        let mut tools = Vec::with_capacity(specs.len());

        for spec in specs {
            let tool = self.resolve_one(spec)?;
            if let Some(name) = tool.name()
                && !seen.insert(name.to_string())
            {
                return Err(DispatchError::DuplicateName(name.to_string()));
            }
            tools.push(tool);
        }

        debug!(count = tools.len(), "Resolved tool specs");
        Ok(tools)
    }
}

/// Execute one call against the tools of the current request.
///
/// Never fails: every outcome becomes the event that records it. Success is
/// a `function_call_output` input item; anything else, a panicking tool
/// included, is a `CORE:TOOL_CALL_ERROR`.
pub async fn execute_call(tools: &[RuntimeTool], call: &FunctionCall) -> EventInput {
    let tool_error = |detail: String| {
        warn!(tool = %call.name, call_id = %call.call_id, error = %detail, "Tool call failed");
        CoreEvent::ToolCallError(ToolCallError {
            call_id: call.call_id.clone(),
            tool_name: call.name.clone(),
            detail,
        })
        .into_input()
    };

    let Some(function) = tools
        .iter()
        .filter_map(RuntimeTool::as_function)
        .find(|f| f.name == call.name)
    else {
        return tool_error(DispatchError::UnknownTool(call.name.clone()).to_string());
    };

    let arguments = match parse_arguments(&call.name, &call.arguments) {
        Ok(args) => args,
        Err(e) => return tool_error(e.to_string()),
    };

    info!(tool = %call.name, call_id = %call.call_id, "Executing tool");
    match AssertUnwindSafe(function.execute(arguments)).catch_unwind().await {
        Ok(Ok(output)) => {
            let text = match output {
                Value::String(s) => s,
                other => other.to_string(),
            };
            CoreEvent::input_item(ConversationItem::function_output(&call.call_id, text))
        }
        Ok(Err(e)) => tool_error(e.to_string()),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(tool = %call.name, call_id = %call.call_id, panic = %message, "Tool panicked");
            tool_error(
                ToolExecutionError::Panicked {
                    tool_name: call.name.clone(),
                    message,
                }
                .to_string(),
            )
        }
    }
}

/// Execute the calls of one response concurrently.
///
/// Results come back in call order. The last one asks for a new model
/// request so the model sees every output at once.
pub async fn execute_batch(tools: &[RuntimeTool], calls: &[FunctionCall]) -> Vec<EventInput> {
    let mut results =
        futures::future::join_all(calls.iter().map(|call| execute_call(tools, call))).await;
    if let Some(last) = results.pop() {
        results.push(last.triggering());
    }
    results
}

fn parse_arguments(tool_name: &str, raw: &str) -> Result<Value, ToolExecutionError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| ToolExecutionError::InvalidArguments {
        tool_name: tool_name.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::ToolDescriptor;
    use crate::local::FnTool;
    use async_trait::async_trait;
    use foldline_core::event::{LLM_INPUT_ITEM, TOOL_CALL_ERROR};

    fn echo() -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            "echo",
            "Echoes text",
            serde_json::json!({"type": "object"}),
            |args| async move { Ok(args["text"].clone()) },
        ))
    }

    fn failing() -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            "exec",
            "Always fails",
            serde_json::json!({"type": "object"}),
            |_| async { Err(ToolExecutionError::failed("exec", "permission denied")) },
        ))
    }

    fn panicking() -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            "boom",
            "Panics when run",
            serde_json::json!({"type": "object"}),
            |_| async {
                if true {
                    panic!("tool blew up");
                }
                Ok(Value::Null)
            },
        ))
    }

    struct Shop;

    #[async_trait]
    impl DurableActor for Shop {
        fn describe(&self, method: &str) -> Option<ToolDescriptor> {
            (method == "lookupOrder").then(|| ToolDescriptor {
                description: "Find an order".into(),
                parameters: serde_json::json!({"type": "object"}),
            })
        }

        async fn invoke(&self, method: &str, arguments: Value) -> Result<Value, ToolExecutionError> {
            Ok(serde_json::json!({ "method": method, "id": arguments["id"] }))
        }
    }

    fn call(name: &str, arguments: &str) -> FunctionCall {
        FunctionCall {
            call_id: format!("call_{name}"),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn resolves_every_spec_kind() {
        let mut dispatcher = ToolDispatcher::new().with_durable_actor(Arc::new(Shop));
        dispatcher.register_local(echo());
        dispatcher.register_callable("cb_1", failing());

        let mut callable = ToolSpec::callable("cb_1");
        if let ToolSpec::SerializedCallableTool { override_name, .. } = &mut callable {
            *override_name = Some("run".into());
        }
        let specs = vec![
            ToolSpec::OpenaiBuiltin {
                openai_tool: serde_json::json!({"type": "web_search"}),
            },
            ToolSpec::durable("lookupOrder"),
            callable,
            ToolSpec::local("echo").with_status_indicator("Echoing"),
        ];

        let tools = dispatcher.resolve(&specs).unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name().unwrap()).collect();
        assert_eq!(names, vec!["web_search", "lookupOrder", "run", "echo"]);
        assert_eq!(tools[1].as_function().unwrap().description, "Find an order");
        assert_eq!(
            tools[3].as_function().unwrap().status_indicator_text.as_deref(),
            Some("Echoing")
        );
    }

    #[test]
    fn unregistered_local_function_is_unresolved() {
        let err = ToolDispatcher::new()
            .resolve(&[ToolSpec::local("missing")])
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::Unresolved {
                tool: "missing".into(),
                kind: "local_function".into()
            }
        );
    }

    #[test]
    fn durable_spec_without_actor_is_unresolved() {
        let err = ToolDispatcher::new()
            .resolve(&[ToolSpec::durable("lookupOrder")])
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unresolved { .. }));
    }

    #[test]
    fn duplicate_resolved_names_are_rejected() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register_local(echo());
        dispatcher.register_callable("cb_echo", echo());

        let err = dispatcher
            .resolve(&[ToolSpec::local("echo"), ToolSpec::callable("cb_echo")])
            .unwrap_err();
        assert_eq!(err, DispatchError::DuplicateName("echo".into()));
    }

    #[tokio::test]
    async fn successful_call_becomes_function_output() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register_local(echo());
        let tools = dispatcher.resolve(&[ToolSpec::local("echo")]).unwrap();

        let input = execute_call(&tools, &call("echo", r#"{"text":"hi"}"#)).await;
        assert_eq!(input.event_type, LLM_INPUT_ITEM);
        assert_eq!(input.data["item"]["type"], "function_call_output");
        assert_eq!(input.data["item"]["output"], "hi");
    }

    #[tokio::test]
    async fn failures_become_tool_call_errors() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register_local(echo());
        dispatcher.register_local(failing());
        let tools = dispatcher
            .resolve(&[ToolSpec::local("echo"), ToolSpec::local("exec")])
            .unwrap();

        let failed = execute_call(&tools, &call("exec", "{}")).await;
        assert_eq!(failed.event_type, TOOL_CALL_ERROR);
        assert_eq!(failed.data["toolName"], "exec");
        assert!(failed.data["detail"].as_str().unwrap().contains("permission denied"));

        let malformed = execute_call(&tools, &call("echo", "{not json")).await;
        assert_eq!(malformed.event_type, TOOL_CALL_ERROR);

        let unknown = execute_call(&tools, &call("nope", "{}")).await;
        assert_eq!(unknown.event_type, TOOL_CALL_ERROR);
        assert!(unknown.data["detail"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn panicking_tool_becomes_tool_call_error() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register_local(echo());
        dispatcher.register_local(panicking());
        let tools = dispatcher
            .resolve(&[ToolSpec::local("echo"), ToolSpec::local("boom")])
            .unwrap();

        let results = execute_batch(
            &tools,
            &[call("boom", "{}"), call("echo", r#"{"text":"still runs"}"#)],
        )
        .await;

        assert_eq!(results[0].event_type, TOOL_CALL_ERROR);
        assert_eq!(results[0].data["callId"], "call_boom");
        assert_eq!(results[0].data["detail"], "boom panicked: tool blew up");
        assert_eq!(results[1].data["item"]["output"], "still runs");
        assert_eq!(results[1].trigger_llm_request, Some(true));
    }

    #[tokio::test]
    async fn batch_keeps_call_order_and_triggers_once() {
        let mut dispatcher = ToolDispatcher::new().with_durable_actor(Arc::new(Shop));
        dispatcher.register_local(echo());
        let tools = dispatcher
            .resolve(&[ToolSpec::local("echo"), ToolSpec::durable("lookupOrder")])
            .unwrap();

        let calls = vec![
            call("lookupOrder", r#"{"id": 7}"#),
            call("echo", r#"{"text":"second"}"#),
        ];
        let results = execute_batch(&tools, &calls).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].data["item"]["callId"], "call_lookupOrder");
        assert_eq!(results[1].data["item"]["output"], "second");
        assert_eq!(results[0].trigger_llm_request, None);
        assert_eq!(results[1].trigger_llm_request, Some(true));
    }
}
