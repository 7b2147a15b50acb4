use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A structured request to execute a tool, extracted from model output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    /// Vendor supplied call id, or a generated one for markup authored by the model
    pub id: String,
    /// The name of the tool to execute
    pub name: String,
    /// Arguments in the order the model produced them
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new<I: Into<String>, N: Into<String>>(
        id: I,
        name: N,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build an invocation with a freshly generated id
    pub fn generated<N: Into<String>>(name: N, arguments: Map<String, Value>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), name, arguments)
    }

    /// The argument value as text, the way it is rendered in tool markup
    pub fn argument_text(&self, key: &str) -> Option<String> {
        self.arguments.get(key).map(value_text)
    }
}

/// Render a JSON value as plain text: strings raw, everything else as compact JSON
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The result of executing one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutcome {
    pub name: String,
    pub success: bool,
    pub result: String,
}

impl ToolOutcome {
    pub fn success<N: Into<String>, R: Into<String>>(name: N, result: R) -> Self {
        Self {
            name: name.into(),
            success: true,
            result: result.into(),
        }
    }

    pub fn failure<N: Into<String>, R: Into<String>>(name: N, error: R) -> Self {
        Self {
            name: name.into(),
            success: false,
            result: error.into(),
        }
    }

    /// Text fed back to the model for this outcome
    pub fn summary(&self) -> String {
        let status = if self.success { "succeeded" } else { "failed" };
        format!("[{} {}]\n{}", self.name, status, self.result)
    }
}
