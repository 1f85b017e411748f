//! Shared AWS config and credentials files (`~/.aws/config`,
//! `~/.aws/credentials`)

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::{home_dir, EnvSnapshot};

/// One INI file: section name to key/value pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniFile {
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniFile {
    /// Parse INI text. Comments start with `#` or `;`; keys are lowercased.
    pub fn parse(text: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_string();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let (Some(section), Some((key, value))) = (current.as_ref(), line.split_once('=')) else {
                continue;
            };
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_lowercase(), value.trim().to_string());
        }
        Self { sections }
    }

    pub fn section(&self, name: &str) -> Option<&HashMap<String, String>> {
        self.sections.get(name)
    }
}

/// The pair of files profiles are read from
#[derive(Debug, Clone, Default)]
pub struct ProfileFiles {
    pub credentials: IniFile,
    pub config: IniFile,
}

impl ProfileFiles {
    /// Read both files, honoring `AWS_SHARED_CREDENTIALS_FILE` and
    /// `AWS_CONFIG_FILE`. Missing files are empty.
    pub fn load(env: &EnvSnapshot) -> Self {
        let aws_dir = home_dir(env).join(".aws");
        let credentials_path = env
            .get("AWS_SHARED_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| aws_dir.join("credentials"));
        let config_path = env
            .get("AWS_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| aws_dir.join("config"));

        let read = |path: PathBuf| {
            std::fs::read_to_string(path)
                .map(|text| IniFile::parse(&text))
                .unwrap_or_default()
        };
        Self {
            credentials: read(credentials_path),
            config: read(config_path),
        }
    }

    /// Merged settings for a profile. The config file names non-default
    /// profiles `[profile name]`; credentials-file keys win.
    pub fn profile(&self, name: &str) -> Option<HashMap<String, String>> {
        let config_section = if name == "default" {
            self.config.section("default")
        } else {
            self.config
                .section(&format!("profile {}", name))
                .or_else(|| self.config.section(name))
        };
        let credentials_section = self.credentials.section(name);
        if config_section.is_none() && credentials_section.is_none() {
            return None;
        }

        let mut merged = config_section.cloned().unwrap_or_default();
        if let Some(credentials) = credentials_section {
            merged.extend(credentials.clone());
        }
        Some(merged)
    }
}
