use std::path::PathBuf;

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHAT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_API_BASE: &str = "https://api.bilibili.com";
pub const DEFAULT_SUMMARY_PROMPT: &str = "You summarize online videos from their captions and description. \
Write a concise summary covering the main content, key information, and takeaways. Answer in Chinese.";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub chat_api_key: String,
    pub chat_api_url: String,
    pub chat_model: String,
    /// SESSDATA cookie value; captions of many videos need it
    pub session_cookie: String,
    /// Seconds to wait after each metadata or caption stage
    pub min_request_interval: f64,
    /// Caption text cap, in characters
    pub max_transcript_length: usize,
    pub summary_prompt: String,
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat_api_key: String::new(),
            chat_api_url: DEFAULT_CHAT_API_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            session_cookie: String::new(),
            min_request_interval: 2.0,
            max_transcript_length: 8000,
            summary_prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load config from ~/.config/bilisum/config.toml if it exists, then apply env overrides
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut config = if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            toml::from_str::<Config>(&content)?
        } else {
            debug!("No config file found at {}", path.display());
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("BILISUM_CHAT_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            debug!("Chat API key taken from environment");
            self.chat_api_key = key;
        }
        if let Some(sessdata) = non_empty("BILIBILI_SESSDATA") {
            debug!("Session cookie taken from environment");
            self.session_cookie = sessdata;
        }
    }

    pub fn has_chat_key(&self) -> bool {
        !self.chat_api_key.trim().is_empty()
    }

    /// Problems worth a startup warning; none of them stop the process
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.has_chat_key() {
            out.push("no chat API key configured, summaries are disabled".to_string());
        }
        if self.session_cookie.trim().is_empty() {
            out.push("no session cookie configured, captions of many videos will be unavailable".to_string());
        }
        out
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("bilisum")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
chat_api_key = "sk-test"
chat_api_url = "https://llm.example.com/v1/chat/completions"
chat_model = "gpt-4o-mini"
session_cookie = "abc123"
min_request_interval = 0.5
max_transcript_length = 4000
summary_prompt = "Summarize."
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.chat_api_key, "sk-test");
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.session_cookie, "abc123");
        assert!((config.min_request_interval - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.max_transcript_length, 4000);
        assert_eq!(config.summary_prompt, "Summarize.");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.chat_api_url, DEFAULT_CHAT_API_URL);
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.max_transcript_length, 8000);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(!config.has_chat_key());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "OPENAI_API_KEY" => Some("sk-openai".to_string()),
            "BILIBILI_SESSDATA" => Some("cookie".to_string()),
            _ => None,
        });
        assert_eq!(config.chat_api_key, "sk-openai");
        assert_eq!(config.session_cookie, "cookie");
    }

    #[test]
    fn test_env_prefers_own_key() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "BILISUM_CHAT_API_KEY" => Some("sk-own".to_string()),
            "OPENAI_API_KEY" => Some("sk-openai".to_string()),
            _ => None,
        });
        assert_eq!(config.chat_api_key, "sk-own");
    }

    #[test]
    fn test_env_blank_ignored() {
        let mut config = Config {
            chat_api_key: "sk-file".to_string(),
            ..Config::default()
        };
        config.apply_env(|key| (key == "BILISUM_CHAT_API_KEY").then(|| "  ".to_string()));
        assert_eq!(config.chat_api_key, "sk-file");
    }

    #[test]
    fn test_warnings() {
        assert_eq!(Config::default().warnings().len(), 2);
        let config = Config {
            chat_api_key: "k".to_string(),
            session_cookie: "c".to_string(),
            ..Config::default()
        };
        assert!(config.warnings().is_empty());
    }
}
