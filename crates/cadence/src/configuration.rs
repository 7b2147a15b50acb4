use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::errors::{to_env_var, ConfigError};
use crate::providers::{
    configs::{
        AnthropicProviderConfig, OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig,
    },
    factory::ProviderType,
    ollama,
};

/// How the orchestrator drives a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AgentSettings {
    /// Stream answers incrementally, or make one round trip per turn
    #[serde(default = "default_streaming")]
    pub streaming: bool,
    /// Provider round trips allowed within one task
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            streaming: default_streaming(),
            max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Ollama {
        #[serde(default = "default_ollama_host")]
        host: String,
        #[serde(default = "default_ollama_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
            ProviderSettings::Anthropic { .. } => ProviderType::Anthropic,
            ProviderSettings::Ollama { .. } => ProviderType::Ollama,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderSettings::OpenAi { model, .. }
            | ProviderSettings::Anthropic { model, .. }
            | ProviderSettings::Ollama { model, .. } => model,
        }
    }

    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Ollama {
                host,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Ollama(OllamaProviderConfig {
                host,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    /// Settings from the environment alone
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Settings from an optional TOML file, overridden by `CADENCE_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("agent.streaming", default_streaming())?
            .set_default("agent.max_turns", default_max_turns() as i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("CADENCE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            classify(err)
        })
    }
}

fn classify(err: config::ConfigError) -> ConfigError {
    let message = err.to_string();

    // "missing field `api_key`", sometimes followed by the key path
    if let Some(rest) = message.strip_prefix("missing field `") {
        let field = rest.split('`').next().unwrap_or(rest);
        return ConfigError::MissingEnvVar {
            env_var: to_env_var(field),
        };
    }
    if let config::ConfigError::NotFound(field) = &err {
        return ConfigError::MissingEnvVar {
            env_var: to_env_var(field),
        };
    }
    if message.contains("unknown variant") {
        return ConfigError::UnknownProvider(message);
    }
    ConfigError::Other(err)
}

fn default_streaming() -> bool {
    true
}

fn default_max_turns() -> usize {
    25
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_anthropic_host() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

fn default_ollama_host() -> String {
    ollama::OLLAMA_HOST.to_string()
}

fn default_ollama_model() -> String {
    ollama::OLLAMA_MODEL.to_string()
}
