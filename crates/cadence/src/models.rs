//! These models represent the objects passed around by the agent
//!
//! Provider wire formats (chat-completion deltas, anthropic envelopes, ollama lines) are
//! converted into these internal structs as early as possible, so that the orchestrator
//! and the presentation layer only ever see one shape of message, tool call and stream event.
pub mod message;
pub mod role;
pub mod stream;
pub mod tool;
