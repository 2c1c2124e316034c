//! Persistent assistant settings.
//!
//! Only non-secret preferences live here; API keys are kept in memory by the
//! gateway and are never written to disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_gemini_model() -> String {
    "gemini-1.5-flash".into()
}

fn default_gemini_base() -> String {
    "https://generativelanguage.googleapis.com".into()
}

fn default_system_prompt() -> String {
    "You are a friendly assistant embedded in a personal portfolio site. \
     Answer questions about the site owner's skills, projects and experience \
     concisely, and say so when you don't know something."
        .into()
}

fn default_timeout_secs() -> u64 {
    45
}

fn default_ollama_base() -> String {
    "http://127.0.0.1:11434".into()
}

fn default_keep_alive() -> String {
    "30m".into()
}

fn default_greeting() -> String {
    "Hi there! I'm the portfolio assistant. Ask me about skills, projects, experience or how to get in touch.".into()
}

fn default_nudge_probability() -> f64 {
    0.3
}

fn default_max_context_entries() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiSettings {
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_base")]
    pub base_url: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            base_url: default_gemini_base(),
            system_prompt: default_system_prompt(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Ollama model tag; picked from RAM/GPU when unset
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_ollama_base")]
    pub base_url: String,
    /// How long Ollama keeps the model resident between requests
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            model: None,
            base_url: default_ollama_base(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// Inclusive range for the simulated response latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min: 1000,
            max: 2000,
        }
    }
}

/// What to do with gateway history when a chat window mounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RehydrationPolicy {
    /// Keep the greeting and replace everything after it with `history[1..]`
    #[default]
    DropFirst,
    /// Keep the greeting and append every history entry
    KeepAll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default)]
    pub fallback_delay_ms: DelayRange,
    #[serde(default = "default_nudge_probability")]
    pub nudge_probability: f64,
    #[serde(default = "default_max_context_entries")]
    pub max_context_entries: usize,
    #[serde(default)]
    pub rehydration: RehydrationPolicy,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            fallback_delay_ms: DelayRange::default(),
            nudge_probability: default_nudge_probability(),
            max_context_entries: default_max_context_entries(),
            rehydration: RehydrationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantSettings {
    #[serde(default)]
    pub gemini: GeminiSettings,
    #[serde(default)]
    pub local: LocalSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    /// Replaces the bundled profile dataset
    #[serde(default)]
    pub profile_path: Option<PathBuf>,
}

impl AssistantSettings {
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings = serde_json::from_str(&contents)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing settings to {}", path.display()))?;
        Ok(())
    }
}

pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com.local", "Portfolio Assistant", "PortfolioAssistant")
        .map(|proj| proj.config_dir().join("settings.json"))
}

/// Read settings from the standard location, falling back to defaults.
pub fn load_settings_or_default() -> AssistantSettings {
    let Some(path) = config_path() else {
        return AssistantSettings::default();
    };
    if !path.exists() {
        return AssistantSettings::default();
    }
    match AssistantSettings::load_from(&path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("ignoring unreadable settings file: {:#}", e);
            AssistantSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = AssistantSettings::default();
        assert_eq!(settings.chat.fallback_delay_ms, DelayRange { min: 1000, max: 2000 });
        assert!((settings.chat.nudge_probability - 0.3).abs() < f64::EPSILON);
        assert_eq!(settings.chat.rehydration, RehydrationPolicy::DropFirst);
        assert!(settings.local.model.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: AssistantSettings =
            serde_json::from_str(r#"{"chat": {"nudge_probability": 0.5}}"#).unwrap();
        assert!((settings.chat.nudge_probability - 0.5).abs() < f64::EPSILON);
        assert_eq!(settings.chat.max_context_entries, 20);
        assert_eq!(settings.gemini.model, "gemini-1.5-flash");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = AssistantSettings::default();
        settings.local.model = Some("llama3.2:1b".into());
        settings.chat.rehydration = RehydrationPolicy::KeepAll;
        settings.save_to(&path).unwrap();

        let loaded = AssistantSettings::load_from(&path).unwrap();
        assert_eq!(loaded.local.model.as_deref(), Some("llama3.2:1b"));
        assert_eq!(loaded.chat.rehydration, RehydrationPolicy::KeepAll);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("api_key"));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(AssistantSettings::load_from(&path).is_err());
    }
}
