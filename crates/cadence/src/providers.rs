pub mod accumulator;
pub mod anthropic;
pub mod base;
pub mod composer;
pub mod configs;
pub mod factory;
pub mod ollama;
pub mod openai;
pub mod utils;
pub mod wire;

#[cfg(test)]
pub mod mock;
