use super::{
    anthropic::AnthropicProvider, base::Provider, configs::ProviderConfig,
    ollama::OllamaProvider, openai::OpenAiProvider,
};
use crate::errors::ProviderResult;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(EnumIter, EnumString, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    OpenAi,
    Anthropic,
    Ollama,
}

impl ProviderConfig {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
            ProviderConfig::Anthropic(_) => ProviderType::Anthropic,
            ProviderConfig::Ollama(_) => ProviderType::Ollama,
        }
    }
}

pub fn get_provider(config: ProviderConfig) -> ProviderResult<Box<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Box::new(AnthropicProvider::new(anthropic_config)?))
        }
        ProviderConfig::Ollama(ollama_config) => Ok(Box::new(OllamaProvider::new(ollama_config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::OllamaProviderConfig;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_provider_type_names_round_trip() {
        for provider_type in ProviderType::iter() {
            let name = provider_type.to_string();
            assert_eq!(ProviderType::from_str(&name).unwrap(), provider_type);
        }
        assert_eq!(ProviderType::OpenAi.to_string(), "openai");
        assert!(ProviderType::from_str("databricks").is_err());
    }

    #[test]
    fn test_get_provider() {
        let config = ProviderConfig::Ollama(OllamaProviderConfig {
            host: "http://localhost:11434".to_string(),
            model: "qwen2.5".to_string(),
            temperature: None,
            max_tokens: None,
        });
        assert_eq!(config.provider_type(), ProviderType::Ollama);
        let provider = get_provider(config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }
}
