//! Number tools.

use super::traits::{empty_parameters, Tool, ToolResult};
use async_trait::async_trait;
use rand::Rng;

/// Returns a non-negative random 31-bit integer.
pub struct RandomNumberTool;

#[async_trait]
impl Tool for RandomNumberTool {
    fn name(&self) -> &str {
        "random_number"
    }

    fn description(&self) -> &str {
        "Return a random non-negative integer"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        empty_parameters()
    }

    async fn execute(&self, _args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let value: i32 = rand::thread_rng().gen_range(0..i32::MAX);
        Ok(ToolResult::ok(value.to_string()))
    }
}

pub struct AnswerToEveryProblemTool;

#[async_trait]
impl Tool for AnswerToEveryProblemTool {
    fn name(&self) -> &str {
        "answer_to_every_problem"
    }

    fn description(&self) -> &str {
        "Return the answer to every problem"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        empty_parameters()
    }

    async fn execute(&self, _args: serde_json::Value) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::ok("99"))
    }
}
