//! Clock and time zone tools.

use super::traits::{empty_parameters, Tool, ToolResult};
use async_trait::async_trait;
use chrono::{Local, Utc};
use serde_json::json;

pub struct CurrentDateTimeTool;

#[async_trait]
impl Tool for CurrentDateTimeTool {
    fn name(&self) -> &str {
        "get_current_date_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time, either in UTC or in the local time zone"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["utc", "local"],
                    "description": "Which clock to read"
                }
            },
            "required": ["type"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let kind = args
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("utc");

        Ok(match kind.to_ascii_lowercase().as_str() {
            "utc" => ToolResult::ok(Utc::now().to_rfc3339()),
            "local" => ToolResult::ok(Local::now().to_rfc3339()),
            other => ToolResult::err(format!(
                "Time zone '{other}' not recognised; expected 'utc' or 'local'"
            )),
        })
    }
}

pub struct CurrentTimeZoneTool;

/// Display name of the local time zone: `TZ` when set, otherwise the UTC offset.
fn local_time_zone_name() -> String {
    let offset = Local::now().offset().to_string();
    match std::env::var("TZ") {
        Ok(tz) if !tz.trim().is_empty() => format!("{} (UTC{offset})", tz.trim()),
        _ => format!("UTC{offset}"),
    }
}

#[async_trait]
impl Tool for CurrentTimeZoneTool {
    fn name(&self) -> &str {
        "get_current_time_zone"
    }

    fn description(&self) -> &str {
        "Get the display name of the local time zone"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        empty_parameters()
    }

    async fn execute(&self, _args: serde_json::Value) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::ok(local_time_zone_name()))
    }
}
