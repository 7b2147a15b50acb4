use async_trait::async_trait;
use serde_json::{Map, Value};

use cadence::errors::AgentResult;
use cadence::tools::{required_str, Tool, ToolRegistry};

/// Tools available in every terminal session
pub fn builtin_registry() -> ToolRegistry {
    ToolRegistry::new().with(CountWords)
}

pub struct CountWords;

#[async_trait]
impl Tool for CountWords {
    fn name(&self) -> &str {
        "count_words"
    }

    fn description(&self) -> &str {
        "Count the number of words in text"
    }

    fn parameters(&self) -> &[(&str, &str)] {
        &[("text", "The text to count words in")]
    }

    async fn call(&self, arguments: Map<String, Value>) -> AgentResult<String> {
        let text = required_str(&arguments, "text")?;
        Ok(text.split_whitespace().count().to_string())
    }
}
