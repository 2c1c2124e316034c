//! Static profile dataset the offline responder draws on.
//!
//! A copy is embedded at build time; settings may point at a replacement file
//! that is read once at startup. Nothing mutates it afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const BUNDLED_PROFILE: &str = include_str!("../data/profile.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillGroup {
    pub category: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tech: Vec<String>,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub company: String,
    pub role: String,
    pub period: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    pub period: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub github: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub title: String,
    pub about: String,
    #[serde(default)]
    pub skills: Vec<SkillGroup>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub work: Vec<Job>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub contact: Contact,
}

impl Profile {
    /// The dataset compiled into the binary.
    pub fn bundled() -> Self {
        // Checked by test_bundled_profile_parses
        serde_json::from_str(BUNDLED_PROFILE).expect("bundled profile.json is valid")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing profile {}", path.display()))
    }

    /// Load the override if configured, otherwise the bundled copy.
    pub fn load_or_bundled(path: Option<&Path>) -> Self {
        match path {
            Some(p) => match Self::load(p) {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!("falling back to bundled profile: {:#}", e);
                    Self::bundled()
                }
            },
            None => Self::bundled(),
        }
    }
}
