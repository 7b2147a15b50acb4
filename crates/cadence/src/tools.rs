use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::markup::{actionable_blocks, escape};
use crate::models::tool::ToolOutcome;

/// Executes the tool invocations found in one block of assistant markup.
///
/// The returned outcomes are in the order the invocations appear in the block. An `Err`
/// means the block could not be handled at all; the orchestrator records it as a single
/// failed outcome and carries on with the rest of the batch.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, block: &str) -> AgentResult<Vec<ToolOutcome>>;
}

/// A named capability the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Parameter names and what they mean, listed in the tool instructions
    fn parameters(&self) -> &[(&str, &str)] {
        &[]
    }

    async fn call(&self, arguments: Map<String, Value>) -> AgentResult<String>;
}

/// A [`ToolExecutor`] over a set of registered [`Tool`] handlers
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> &mut Self {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        self
    }

    pub fn with<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Usage text for the system prompt, with one markup example per tool
    pub fn instructions(&self) -> String {
        let mut text = String::from(
            "To use a tool, write a block in your answer with the tool name as the tag and \
             one nested tag per parameter. Escape &, <, >, \" and ' in values.\n",
        );
        for tool in self.tools.values() {
            text.push_str(&format!("\n## {}\n{}\n<{}>\n", tool.name(), tool.description(), tool.name()));
            for (param, about) in tool.parameters() {
                text.push_str(&format!("<{param}>{}</{param}>\n", escape(about)));
            }
            text.push_str(&format!("</{}>\n", tool.name()));
        }
        text
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, block: &str) -> AgentResult<Vec<ToolOutcome>> {
        let mut outcomes = Vec::new();
        for found in actionable_blocks(block) {
            let invocation = found.invocation();
            let Some(tool) = self.get(&invocation.name) else {
                let err = AgentError::ToolNotFound(invocation.name.clone());
                tracing::warn!(tool = %invocation.name, "model called an unknown tool");
                outcomes.push(ToolOutcome::failure(&invocation.name, err.to_string()));
                continue;
            };

            let outcome = match tool.call(invocation.arguments).await {
                Ok(result) => ToolOutcome::success(&invocation.name, result),
                Err(err) => ToolOutcome::failure(&invocation.name, err.to_string()),
            };
            tracing::debug!(tool = %invocation.name, success = outcome.success, "tool finished");
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

/// Read a required string argument
pub fn required_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> AgentResult<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidParameters(format!("Missing '{}' parameter", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Repeat the message back"
        }

        fn parameters(&self) -> &[(&str, &str)] {
            &[("message", "text to repeat")]
        }

        async fn call(&self, arguments: Map<String, Value>) -> AgentResult<String> {
            Ok(required_str(&arguments, "message")?.to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn call(&self, _arguments: Map<String, Value>) -> AgentResult<String> {
            Err(AgentError::ExecutionError("disk on fire".to_string()))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with(Echo).with(Broken)
    }

    #[tokio::test]
    async fn test_execute_in_textual_order() {
        let block = "<echo>\n<message>first &amp; foremost</message>\n</echo>\n\
                     <echo>\n<message>second</message>\n</echo>";
        let outcomes = registry().execute(block).await.unwrap();
        assert_eq!(
            outcomes,
            vec![
                ToolOutcome::success("echo", "first & foremost"),
                ToolOutcome::success("echo", "second"),
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let block = "<broken>\n</broken>\n<missing>\n</missing>\n<echo>\n</echo>\n\
                     <echo>\n<message>ok</message>\n</echo>";
        let outcomes = registry().execute(block).await.unwrap();

        assert_eq!(outcomes.len(), 4);
        assert!(!outcomes[0].success);
        assert!(outcomes[0].result.contains("disk on fire"));
        assert_eq!(outcomes[1].result, "Tool not found: missing");
        assert!(outcomes[2].result.contains("Missing 'message' parameter"));
        assert_eq!(outcomes[3], ToolOutcome::success("echo", "ok"));
    }

    #[tokio::test]
    async fn test_thinking_blocks_are_skipped() {
        let block = "<thinking>\n<message>no</message>\n</thinking>\n<echo>\n<message>yes</message>\n</echo>";
        let outcomes = registry().execute(block).await.unwrap();
        assert_eq!(outcomes, vec![ToolOutcome::success("echo", "yes")]);
    }

    #[test]
    fn test_instructions_list_every_tool() {
        let text = registry().instructions();
        assert!(text.contains("## broken\nAlways fails"));
        assert!(text.contains("<echo>\n<message>text to repeat</message>\n</echo>"));
        assert_eq!(registry().names(), vec!["broken", "echo"]);
    }
}
