//! Tool specifications and their resolved, invocable form.
//!
//! A [`ToolSpec`] is what gets persisted (in `CORE:ADD_TOOL_SPECS`) and is
//! pure data. A [`RuntimeTool`] is what a [`ToolResolver`] turns it into right
//! before a model request: either a provider builtin passed through untouched,
//! or a [`FunctionTool`] that can be executed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DispatchError, ToolExecutionError};

/// Reference to a callback registered with the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableRef {
    pub id: String,
}

/// A tool the model may call. Discriminated on `type`.
///
/// Fields are only ever added, and always optional, so persisted specs keep
/// deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ToolSpec {
    /// A provider-native tool (e.g. `{"type": "web_search"}`), passed through.
    OpenaiBuiltin { openai_tool: Value },

    /// Invoked by calling a named method on the hosting durable actor.
    AgentDurableObjectTool {
        method_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        override_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        override_description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        override_input_json_schema: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_indicator_text: Option<String>,
    },

    /// Invoked through a previously registered callback.
    SerializedCallableTool {
        callable: CallableRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        override_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        override_description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        override_input_json_schema: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_indicator_text: Option<String>,
    },

    /// A function registered directly with the dispatcher under `name`.
    LocalFunction {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_indicator_text: Option<String>,
    },
}

impl ToolSpec {
    /// Spec for a locally registered function.
    pub fn local(name: impl Into<String>) -> Self {
        Self::LocalFunction {
            name: name.into(),
            strict: None,
            status_indicator_text: None,
        }
    }

    /// Spec for a durable actor method.
    pub fn durable(method_name: impl Into<String>) -> Self {
        Self::AgentDurableObjectTool {
            method_name: method_name.into(),
            override_name: None,
            override_description: None,
            override_input_json_schema: None,
            strict: None,
            status_indicator_text: None,
        }
    }

    /// Spec for a registered callback.
    pub fn callable(id: impl Into<String>) -> Self {
        Self::SerializedCallableTool {
            callable: CallableRef { id: id.into() },
            override_name: None,
            override_description: None,
            override_input_json_schema: None,
            strict: None,
            status_indicator_text: None,
        }
    }

    /// The wire discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpenaiBuiltin { .. } => "openai_builtin",
            Self::AgentDurableObjectTool { .. } => "agent_durable_object_tool",
            Self::SerializedCallableTool { .. } => "serialized_callable_tool",
            Self::LocalFunction { .. } => "local_function",
        }
    }

    /// The name the model will see, as far as the tool spec alone determines it.
    ///
    /// Callables without an override are named by their callback id here;
    /// builtins by their provider `type`.
    pub fn name(&self) -> Option<String> {
        match self {
            Self::OpenaiBuiltin { openai_tool } => {
                openai_tool.get("type").and_then(Value::as_str).map(String::from)
            }
            Self::AgentDurableObjectTool {
                method_name,
                override_name,
                ..
            } => Some(override_name.clone().unwrap_or_else(|| method_name.clone())),
            Self::SerializedCallableTool {
                callable,
                override_name,
                ..
            } => Some(override_name.clone().unwrap_or_else(|| callable.id.clone())),
            Self::LocalFunction { name, .. } => Some(name.clone()),
        }
    }

    pub fn status_indicator_text(&self) -> Option<&str> {
        match self {
            Self::OpenaiBuiltin { .. } => None,
            Self::AgentDurableObjectTool {
                status_indicator_text,
                ..
            }
            | Self::SerializedCallableTool {
                status_indicator_text,
                ..
            }
            | Self::LocalFunction {
                status_indicator_text,
                ..
            } => status_indicator_text.as_deref(),
        }
    }

    /// Attach a status indicator template.
    pub fn with_status_indicator(mut self, template: impl Into<String>) -> Self {
        match &mut self {
            Self::OpenaiBuiltin { .. } => {}
            Self::AgentDurableObjectTool {
                status_indicator_text,
                ..
            }
            | Self::SerializedCallableTool {
                status_indicator_text,
                ..
            }
            | Self::LocalFunction {
                status_indicator_text,
                ..
            } => *status_indicator_text = Some(template.into()),
        }
        self
    }
}

/// The core Tool trait: something that can be executed with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Value) -> Result<Value, ToolExecutionError>;
}

/// A resolved, invocable tool.
#[derive(Clone)]
pub struct FunctionTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub strict: bool,
    pub status_indicator_text: Option<String>,
    pub tool: Arc<dyn Tool>,
}

impl FunctionTool {
    /// Wrap a tool using its own metadata.
    pub fn from_tool(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
            strict: false,
            status_indicator_text: None,
            tool,
        }
    }

    pub async fn execute(&self, arguments: Value) -> Result<Value, ToolExecutionError> {
        self.tool.execute(arguments).await
    }
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("strict", &self.strict)
            .field("status_indicator_text", &self.status_indicator_text)
            .finish_non_exhaustive()
    }
}

/// The resolved form of a [`ToolSpec`].
#[derive(Debug, Clone)]
pub enum RuntimeTool {
    /// Provider-native tool definition, forwarded verbatim.
    Builtin(Value),
    Function(FunctionTool),
}

impl RuntimeTool {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Builtin(spec) => spec.get("type").and_then(Value::as_str),
            Self::Function(f) => Some(&f.name),
        }
    }

    pub fn as_function(&self) -> Option<&FunctionTool> {
        match self {
            Self::Function(f) => Some(f),
            Self::Builtin(_) => None,
        }
    }

    /// The definition sent to the model in the request's `tools` array.
    pub fn to_definition(&self) -> Value {
        match self {
            Self::Builtin(spec) => spec.clone(),
            Self::Function(f) => serde_json::json!({
                "type": "function",
                "name": f.name,
                "description": f.description,
                "parameters": f.parameters,
                "strict": f.strict,
            }),
        }
    }
}

/// Resolves declared tool specs into invocable tools.
///
/// Must be deterministic for the same specs and configuration, and must never
/// fall back to an implicit tool.
pub trait ToolResolver: Send + Sync {
    fn resolve(&self, specs: &[ToolSpec]) -> Result<Vec<RuntimeTool>, DispatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: Value) -> Result<Value, ToolExecutionError> {
            Ok(arguments["text"].clone())
        }
    }

    #[test]
    fn spec_wire_discriminator() {
        let json = serde_json::to_value(ToolSpec::durable("lookupOrder")).unwrap();
        assert_eq!(json["type"], "agent_durable_object_tool");
        assert_eq!(json["methodName"], "lookupOrder");
        assert!(json.get("overrideName").is_none());
    }

    #[test]
    fn spec_parses_camel_case_overrides() {
        let json = serde_json::json!({
            "type": "serialized_callable_tool",
            "callable": { "id": "cb_1" },
            "overrideName": "search_docs",
            "statusIndicatorText": "🔎 ${args.query}"
        });
        let spec: ToolSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.name().as_deref(), Some("search_docs"));
        assert_eq!(spec.status_indicator_text(), Some("🔎 ${args.query}"));
    }

    #[test]
    fn builtin_is_named_by_provider_type() {
        let spec = ToolSpec::OpenaiBuiltin {
            openai_tool: serde_json::json!({"type": "web_search"}),
        };
        assert_eq!(spec.name().as_deref(), Some("web_search"));
        assert_eq!(spec.kind(), "openai_builtin");
    }

    #[tokio::test]
    async fn function_tool_definition_and_execution() {
        let tool = RuntimeTool::Function(FunctionTool::from_tool(Arc::new(EchoTool)));
        let def = tool.to_definition();
        assert_eq!(def["type"], "function");
        assert_eq!(def["name"], "echo");
        assert_eq!(def["strict"], false);

        let out = tool
            .as_function()
            .unwrap()
            .execute(serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(out, "hi");
    }
}
