use std::collections::BTreeMap;

use serde_json::Value;

use super::wire::ToolCallFragment;
use crate::models::tool::ToolInvocation;

/// Partial tool call assembled from fragments sharing one index
#[derive(Debug, Clone, Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Reassembles tool calls whose arguments arrive as partial JSON across many chunks.
///
/// Indices are only meaningful within one response, so an accumulator lives exactly as
/// long as the response it reads and is consumed by [`ToolCallAccumulator::finish`].
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    pending: BTreeMap<usize, PendingCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, fragment: &ToolCallFragment) {
        let call = self.pending.entry(fragment.index).or_default();
        if let Some(id) = &fragment.id {
            call.id = Some(id.clone());
        }
        if let Some(name) = &fragment.name {
            call.name = Some(name.clone());
        }
        if let Some(arguments) = &fragment.arguments {
            call.arguments.push_str(arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Finalize every named entry whose arguments parse as a JSON object, in index order
    pub fn finish(self) -> Vec<ToolInvocation> {
        self.pending
            .into_iter()
            .filter_map(|(index, call)| {
                let name = call.name?;
                let text = call.arguments.trim();
                let arguments = if text.is_empty() {
                    serde_json::Map::new()
                } else {
                    match serde_json::from_str::<Value>(text) {
                        Ok(Value::Object(arguments)) => arguments,
                        _ => {
                            tracing::warn!(
                                index,
                                tool = %name,
                                "discarding tool call with unparseable arguments"
                            );
                            return None;
                        }
                    }
                };
                Some(match call.id {
                    Some(id) => ToolInvocation::new(id, name, arguments),
                    None => ToolInvocation::generated(name, arguments),
                })
            })
            .collect()
    }
}
