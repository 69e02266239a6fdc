//! Current time tool. Models have no clock of their own.

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use foldline_core::error::ToolExecutionError;
use foldline_core::tool::Tool;
use serde_json::Value;

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Optionally shifted by a UTC offset in hours."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": {
                    "type": "integer",
                    "description": "Offset from UTC in whole hours, e.g. -5 or 9"
                }
            }
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolExecutionError> {
        let hours = match arguments.get("utc_offset_hours") {
            None | Some(Value::Null) => 0,
            Some(v) => v.as_i64().ok_or_else(|| ToolExecutionError::InvalidArguments {
                tool_name: self.name().into(),
                reason: "'utc_offset_hours' must be an integer".into(),
            })?,
        };

        let offset = hours
            .checked_mul(3600)
            .and_then(|secs| i32::try_from(secs).ok())
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ToolExecutionError::InvalidArguments {
                tool_name: self.name().into(),
                reason: format!("offset {hours}h is out of range"),
            })?;

        let now = Utc::now().with_timezone(&offset);
        Ok(serde_json::json!({
            "iso8601": now.to_rfc3339(),
            "weekday": now.format("%A").to_string(),
        }))
    }
}
