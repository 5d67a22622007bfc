use serde::{Deserialize, Serialize};

/// Application-wide configuration.
///
/// Defaults are usable out of the box; `CYRO_*` environment variables
/// override individual fields. File-based configuration is handled by the
/// CLI layer, which deserializes directly into this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output format hint for the CLI: "text" or "json".
    pub format: String,
    pub verbose: bool,
    /// Ordered list of chrono format strings tried by the parser when
    /// extracting timestamps. Empty means the built-in default list.
    pub timestamp_formats: Vec<String>,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name; currently only "ollama".
    pub provider: String,
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Ollama API endpoint, e.g. "http://localhost:11434".
    pub host: String,
    /// Default model, e.g. "llama3.2".
    pub model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            verbose: false,
            timestamp_formats: Vec::new(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
        }
    }
}

impl Config {
    /// Builds a configuration from defaults plus `CYRO_*` environment
    /// overrides.
    pub fn load() -> Self {
        let mut config = Config::default();

        if let Ok(v) = std::env::var("CYRO_FORMAT") {
            config.format = v;
        }
        if let Ok(v) = std::env::var("CYRO_VERBOSE") {
            config.verbose = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("CYRO_LLM_PROVIDER") {
            config.llm.provider = v;
        }
        if let Ok(v) = std::env::var("CYRO_OLLAMA_HOST") {
            config.llm.ollama.host = v;
        }
        if let Ok(v) = std::env::var("CYRO_OLLAMA_MODEL") {
            config.llm.ollama.model = v;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_ollama() {
        let config = Config::default();
        assert_eq!(config.format, "text");
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.ollama.host, "http://localhost:11434");
        assert!(config.timestamp_formats.is_empty());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.llm.ollama.model, config.llm.ollama.model);
    }
}
