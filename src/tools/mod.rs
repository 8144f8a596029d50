//! Tool subsystem for agent-callable capabilities.
//!
//! Tools are the local functions a [`ToolAgent`](crate::agent::ToolAgent) offers
//! to the model during its tool-call loop. Each tool implements the [`Tool`]
//! trait defined in [`traits`]: a name, a description, a JSON parameter schema
//! and an async `execute` returning a structured [`ToolResult`].
//!
//! Built-in tools are grouped by [`string_tools`], [`number_tools`] and
//! [`time_tools`]; workflow files refer to them by name through
//! [`tools_by_name`]. Remote tools come from MCP servers through [`mcp`].
//! Agents themselves become tools through [`AgentTool`](crate::agent::AgentTool).

pub mod mcp;
pub mod numbers;
pub mod strings;
pub mod time;
pub mod traits;

pub use numbers::{AnswerToEveryProblemTool, RandomNumberTool};
pub use strings::{LowerCaseTool, ReverseTool, UpperCaseTool};
pub use time::{CurrentDateTimeTool, CurrentTimeZoneTool};
pub use traits::Tool;
#[allow(unused_imports)]
pub use traits::{ToolResult, ToolSpec};

use crate::error::WorkflowError;
use std::sync::Arc;

/// Upper case, lower case and reverse.
pub fn string_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(UpperCaseTool),
        Arc::new(LowerCaseTool),
        Arc::new(ReverseTool),
    ]
}

pub fn number_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(AnswerToEveryProblemTool), Arc::new(RandomNumberTool)]
}

pub fn time_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(CurrentDateTimeTool), Arc::new(CurrentTimeZoneTool)]
}

/// Every built-in tool.
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    let mut tools = string_tools();
    tools.extend(number_tools());
    tools.extend(time_tools());
    tools
}

/// Map an agent id onto the characters function names allow.
pub(crate) fn tool_name_fragment(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Make names unique by suffixing repeats with `_2`, `_3`, ... in order.
///
/// Sanitizing ids is lossy (`a.b` and `a_b` both become `a_b`), and the
/// backend rejects duplicate function names.
pub(crate) fn unique_tool_names(names: Vec<String>) -> Vec<String> {
    let mut taken: std::collections::HashSet<String> = std::collections::HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut n = 2;
            while taken.contains(&candidate) {
                candidate = format!("{name}_{n}");
                n += 1;
            }
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// Resolve built-in tools by name, preserving the requested order.
pub fn tools_by_name<S: AsRef<str>>(names: &[S]) -> Result<Vec<Arc<dyn Tool>>, WorkflowError> {
    let available = builtin_tools();
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            available
                .iter()
                .find(|tool| tool.name() == name)
                .cloned()
                .ok_or_else(|| WorkflowError::InvalidDefinition(format!("unknown tool: {name}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_name_fragment_replaces_disallowed_characters() {
        assert_eq!(tool_name_fragment("Biology Agent"), "Biology_Agent");
        assert_eq!(tool_name_fragment("a.b"), "a_b");
        assert_eq!(tool_name_fragment("re-view_2"), "re-view_2");
    }

    #[test]
    fn unique_tool_names_suffixes_collisions() {
        let names = vec!["a_b".to_string(), "a_b".to_string(), "a_b_2".to_string()];
        assert_eq!(unique_tool_names(names), vec!["a_b", "a_b_2", "a_b_2_2"]);
    }

    #[test]
    fn builtin_tools_has_expected_count() {
        assert_eq!(builtin_tools().len(), 7);
    }

    #[test]
    fn builtin_tool_names() {
        let tools = builtin_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert!(names.contains(&"upper_case"));
        assert!(names.contains(&"lower_case"));
        assert!(names.contains(&"reverse"));
        assert!(names.contains(&"random_number"));
        assert!(names.contains(&"answer_to_every_problem"));
        assert!(names.contains(&"get_current_date_time"));
        assert!(names.contains(&"get_current_time_zone"));
    }

    #[test]
    fn builtin_tools_all_have_descriptions() {
        for tool in &builtin_tools() {
            assert!(
                !tool.description().is_empty(),
                "Tool {} has empty description",
                tool.name()
            );
        }
    }

    #[test]
    fn builtin_tools_all_have_object_schemas() {
        for tool in &builtin_tools() {
            let schema = tool.parameters_schema();
            assert!(
                schema["properties"].is_object(),
                "Tool {} schema has no properties",
                tool.name()
            );
        }
    }

    #[test]
    fn tool_spec_generation() {
        for tool in &builtin_tools() {
            let spec = tool.spec();
            assert_eq!(spec.name, tool.name());
            assert_eq!(spec.description, tool.description());
            assert!(spec.parameters.is_object());
        }
    }

    #[test]
    fn tools_by_name_preserves_order() {
        let tools = tools_by_name(&["reverse", "upper_case"]).unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["reverse", "upper_case"]);
    }

    #[test]
    fn tools_by_name_rejects_unknown() {
        let err = tools_by_name(&["shell"]).err().unwrap();
        assert_eq!(
            err,
            WorkflowError::InvalidDefinition("unknown tool: shell".into())
        );
    }

    #[test]
    fn tool_result_with_error_serde() {
        let result = ToolResult {
            success: false,
            output: String::new(),
            error: Some("boom".into()),
        };
        let json = serde_json::to_string(&result).unwrap();
        let parsed: ToolResult = serde_json::from_str(&json).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error.as_deref(), Some("boom"));
    }
}
