//! String manipulation tools.

use super::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

fn string_parameters() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "str": {
                "type": "string",
                "description": "The input string"
            }
        },
        "required": ["str"]
    })
}

fn input_arg(args: &serde_json::Value) -> Result<&str, ToolResult> {
    args.get("str")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ToolResult::err("Missing 'str' parameter"))
}

macro_rules! string_tool {
    ($ty:ident, $name:literal, $description:literal, $transform:expr) => {
        pub struct $ty;

        #[async_trait]
        impl Tool for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn description(&self) -> &str {
                $description
            }

            fn parameters_schema(&self) -> serde_json::Value {
                string_parameters()
            }

            async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
                let transform: fn(&str) -> String = $transform;
                Ok(match input_arg(&args) {
                    Ok(input) => ToolResult::ok(transform(input)),
                    Err(missing) => missing,
                })
            }
        }
    };
}

string_tool!(
    UpperCaseTool,
    "upper_case",
    "Convert the input string to upper case",
    str::to_uppercase
);

string_tool!(
    LowerCaseTool,
    "lower_case",
    "Convert the input string to lower case",
    str::to_lowercase
);

string_tool!(
    ReverseTool,
    "reverse",
    "Reverse the input string",
    |s| s.chars().rev().collect()
);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upper_case_converts() {
        let result = UpperCaseTool
            .execute(json!({"str": "hello world"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "HELLO WORLD");
    }

    #[tokio::test]
    async fn lower_case_converts() {
        let result = LowerCaseTool.execute(json!({"str": "MiXeD"})).await.unwrap();
        assert_eq!(result.output, "mixed");
    }

    #[tokio::test]
    async fn reverse_handles_multibyte_chars() {
        let result = ReverseTool.execute(json!({"str": "añb"})).await.unwrap();
        assert_eq!(result.output, "bña");
    }

    #[tokio::test]
    async fn missing_argument_is_a_failed_result() {
        let result = UpperCaseTool.execute(json!({})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("str"));
    }

    #[test]
    fn schema_requires_str() {
        let schema = ReverseTool.parameters_schema();
        assert_eq!(schema["required"], json!(["str"]));
    }
}
