//! Tool invocations expressed as tagged markup inside answer text.
//!
//! Providers with native function calling have their calls rendered into this markup, and
//! models without it author the same markup directly, so dispatch only ever scans text:
//!
//! ```text
//! <write_file>
//! <path>notes.txt</path>
//! <content>1 &lt; 2</content>
//! </write_file>
//! ```
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::models::tool::{value_text, ToolInvocation};

/// Tag names that mark reasoning commentary rather than an actionable call
const THINKING_TAGS: [&str; 2] = ["thinking", "think"];

fn open_tag() -> &'static Regex {
    static OPEN_TAG: OnceLock<Regex> = OnceLock::new();
    OPEN_TAG.get_or_init(|| Regex::new(r"<([A-Za-z_][A-Za-z0-9_.\-]*)>").unwrap())
}

fn tag_name() -> &'static Regex {
    static TAG_NAME: OnceLock<Regex> = OnceLock::new();
    TAG_NAME.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").unwrap())
}

fn entity() -> &'static Regex {
    static ENTITY: OnceLock<Regex> = OnceLock::new();
    ENTITY.get_or_init(|| Regex::new(r"&(amp|lt|gt|quot|apos);").unwrap())
}

pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn unescape(text: &str) -> String {
    entity()
        .replace_all(text, |caps: &Captures| match &caps[1] {
            "amp" => "&",
            "lt" => "<",
            "gt" => ">",
            "quot" => "\"",
            _ => "'",
        })
        .into_owned()
}

/// Whether `name` can open and close a block
pub fn is_tag_name(name: &str) -> bool {
    tag_name().is_match(name)
}

/// Whether the invocation survives a trip through markup: its name and every argument
/// key must be tag names, or the rendered block would be read back differently
pub fn is_renderable(invocation: &ToolInvocation) -> bool {
    is_tag_name(&invocation.name) && invocation.arguments.keys().all(|key| is_tag_name(key))
}

/// Render an invocation as a tagged block, one nested tag per argument
pub fn render_invocation(invocation: &ToolInvocation) -> String {
    let mut block = format!("<{}>\n", invocation.name);
    for (key, value) in &invocation.arguments {
        block.push_str(&format!("<{key}>{}</{key}>\n", escape(&value_text(value))));
    }
    block.push_str(&format!("</{}>", invocation.name));
    block
}

/// Render several invocations as trailing answer text
pub fn render_invocations(invocations: &[ToolInvocation]) -> String {
    invocations
        .iter()
        .map(render_invocation)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A well-formed tagged block found in text
#[derive(Debug, Clone, PartialEq)]
pub struct ToolBlock {
    pub name: String,
    /// The full block, opening and closing tags included
    pub raw: String,
    /// Text between the opening and closing tag, still escaped
    pub body: String,
}

impl ToolBlock {
    pub fn is_thinking(&self) -> bool {
        THINKING_TAGS
            .iter()
            .any(|tag| self.name.eq_ignore_ascii_case(tag))
    }

    /// Parse the nested argument tags of this block
    pub fn invocation(&self) -> ToolInvocation {
        let mut arguments = Map::new();
        for param in scan_blocks(&self.body) {
            arguments.insert(param.name, Value::String(unescape(&param.body)));
        }
        ToolInvocation::generated(self.name.clone(), arguments)
    }
}

/// All top-level tagged blocks in textual order, thinking blocks included
pub fn scan_blocks(text: &str) -> Vec<ToolBlock> {
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(caps) = open_tag().captures_at(text, cursor) {
        let (open, name) = match (caps.get(0), caps.get(1)) {
            (Some(open), Some(name)) => (open, name.as_str()),
            _ => break,
        };
        let closing = format!("</{}>", name);
        match text[open.end()..].find(&closing) {
            Some(offset) => {
                let body_end = open.end() + offset;
                let block_end = body_end + closing.len();
                blocks.push(ToolBlock {
                    name: name.to_string(),
                    raw: text[open.start()..block_end].to_string(),
                    body: text[open.end()..body_end].to_string(),
                });
                cursor = block_end;
            }
            // Unterminated tag, keep scanning after it
            None => cursor = open.end(),
        }
    }

    blocks
}

/// Blocks that should be sent to the tool executor
pub fn actionable_blocks(text: &str) -> Vec<ToolBlock> {
    scan_blocks(text)
        .into_iter()
        .filter(|block| !block.is_thinking())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invocation(name: &str, arguments: Value) -> ToolInvocation {
        let arguments = arguments.as_object().cloned().unwrap_or_default();
        ToolInvocation::new("call_1", name, arguments)
    }

    #[test]
    fn test_escape_unescape_lossless() {
        let original = r#"a & b < c > d "e" 'f' &amp;"#;
        let escaped = escape(original);
        assert!(!escaped.contains('<'));
        assert!(!escaped.contains('"'));
        assert_eq!(unescape(&escaped), original);
    }

    #[test]
    fn test_round_trip_through_markup() {
        let original = invocation("foo", json!({"bar": "1<2"}));
        let text = render_invocation(&original);
        assert_eq!(text, "<foo>\n<bar>1&lt;2</bar>\n</foo>");

        let blocks = actionable_blocks(&text);
        assert_eq!(blocks.len(), 1);
        let extracted = blocks[0].invocation();
        assert_eq!(extracted.name, "foo");
        assert_eq!(extracted.argument_text("bar").as_deref(), Some("1<2"));
    }

    #[test]
    fn test_round_trip_all_special_characters() {
        let value = r#"& < > " '"#;
        let original = invocation("echo", json!({ "message": value }));
        let extracted = scan_blocks(&render_invocation(&original))[0].invocation();
        assert_eq!(extracted.argument_text("message").as_deref(), Some(value));
    }

    #[test]
    fn test_non_string_arguments_render_as_json() {
        let original = invocation("move", json!({"count": 3, "opts": {"snap": true}}));
        let text = render_invocation(&original);
        assert!(text.contains("<count>3</count>"));
        assert!(text.contains("<opts>{&quot;snap&quot;:true}</opts>"));

        let extracted = scan_blocks(&text)[0].invocation();
        assert_eq!(extracted.argument_text("count").as_deref(), Some("3"));
        assert_eq!(
            extracted.argument_text("opts").as_deref(),
            Some(r#"{"snap":true}"#)
        );
    }

    #[test]
    fn test_argument_order_is_preserved() {
        let original = invocation("ordered", json!({"zeta": "1", "alpha": "2", "mid": "3"}));
        let extracted = scan_blocks(&render_invocation(&original))[0].invocation();
        let keys: Vec<_> = extracted.arguments.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_thinking_blocks_are_not_actionable() {
        let text = "Let me look.\n<thinking>the user wants a file</thinking>\n\
                    <read_file>\n<path>a.txt</path>\n</read_file>\n<Think>more</Think>";
        let all = scan_blocks(text);
        assert_eq!(all.len(), 3);
        assert!(all[0].is_thinking());
        assert!(all[2].is_thinking());

        let actionable = actionable_blocks(text);
        assert_eq!(actionable.len(), 1);
        assert_eq!(actionable[0].name, "read_file");
        assert_eq!(
            actionable[0].raw,
            "<read_file>\n<path>a.txt</path>\n</read_file>"
        );
    }

    #[test]
    fn test_blocks_in_textual_order() {
        let text = "<b>\n</b> text <a>\n<x>1</x>\n</a>";
        let names: Vec<_> = scan_blocks(text).into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_unterminated_tag_is_ignored() {
        let text = "compare <vec> with <list>\n<item>1</item>\n</list>";
        let blocks = scan_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "list");
    }

    #[test]
    fn test_plain_text_has_no_blocks() {
        assert!(actionable_blocks("1 < 2 and 3 > 2").is_empty());
        assert!(actionable_blocks("").is_empty());
    }

    #[test]
    fn test_invalid_argument_key_is_not_renderable() {
        assert!(is_renderable(&invocation("write", json!({"path": "a.txt"}))));
        assert!(!is_renderable(&invocation("write", json!({"file path": "a.txt"}))));
        assert!(!is_renderable(&invocation("write", json!({"path": "a", "1st": "x"}))));
        assert!(!is_renderable(&invocation("get weather", json!({"city": "Oslo"}))));

        // What the check guards against: the key is lost when read back
        let text = render_invocation(&invocation("write", json!({"file path": "a.txt"})));
        assert!(scan_blocks(&text)[0].invocation().arguments.is_empty());
    }

    #[test]
    fn test_tag_names() {
        assert!(is_tag_name("read_file"));
        assert!(is_tag_name("tracks.add-region"));
        assert!(!is_tag_name("read file"));
        assert!(!is_tag_name("1st"));
        assert!(!is_tag_name(""));
    }

    #[test]
    fn test_render_several_invocations() {
        let text = render_invocations(&[
            invocation("a", json!({})),
            invocation("b", json!({"k": "v"})),
        ]);
        assert_eq!(text, "<a>\n</a>\n<b>\n<k>v</k>\n</b>");
    }
}
