use super::{parse_duration_string, Config};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Find config file starting from current directory
    pub fn find_config_file(&self) -> Result<PathBuf> {
        let current_dir = std::env::current_dir()?;
        Self::find_config_in_dir(&current_dir)
    }

    pub fn find_config_in_dir(dir: &Path) -> Result<PathBuf> {
        let config_path = dir.join("queuewarden.yaml");
        if config_path.exists() {
            return Ok(config_path);
        }

        // Try alternate name
        let alt_path = dir.join("queuewarden.yml");
        if alt_path.exists() {
            return Ok(alt_path);
        }

        // Try parent directory
        if let Some(parent) = dir.parent() {
            return Self::find_config_in_dir(parent);
        }

        Err(Error::Config(
            "Could not find queuewarden.yaml in current directory or any parent".to_string(),
        ))
    }

    /// Load config from file path
    pub fn load_config<P: AsRef<Path>>(&self, path: P) -> Result<Config> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        self.parse_config(&content)
    }

    /// Parse config from a YAML string
    pub fn parse_config(&self, content: &str) -> Result<Config> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Validate the configuration, rejecting values the runtime would
    /// otherwise silently fall back from.
    pub fn validate(&self) -> Result<()> {
        if self.panel.api_key.trim().is_empty() {
            return Err(Error::Validation("panel.api_key must not be empty".into()));
        }

        match url::Url::parse(&self.panel.base_url) {
            Ok(parsed) => {
                let scheme = parsed.scheme();
                if scheme != "http" && scheme != "https" {
                    return Err(Error::Validation(format!(
                        "panel.base_url '{}': scheme must be http or https, got '{}'",
                        self.panel.base_url, scheme
                    )));
                }
            }
            Err(e) => {
                return Err(Error::Validation(format!(
                    "panel.base_url '{}': {}",
                    self.panel.base_url, e
                )));
            }
        }

        for (name, entry) in &self.servers {
            if entry.panel_id.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "servers.{}: panel_id must not be empty",
                    name
                )));
            }
            if let Some(ref cooldown) = entry.cooldown {
                if parse_duration_string(cooldown).is_none() {
                    return Err(Error::Validation(format!(
                        "servers.{}: unparseable cooldown '{}'",
                        name, cooldown
                    )));
                }
            }
        }

        if let Some(cap) = self.lifecycle.retry_cap {
            if cap == 0 {
                return Err(Error::Validation(
                    "lifecycle.retry_cap must be at least 1".into(),
                ));
            }
        }

        let durations = [
            ("cooldown", &self.lifecycle.cooldown),
            ("action_timeout", &self.lifecycle.action_timeout),
            ("confirm_timeout", &self.lifecycle.confirm_timeout),
            ("rate_limit_interval", &self.lifecycle.rate_limit_interval),
            ("backoff_base", &self.lifecycle.backoff_base),
            ("sweep_interval", &self.lifecycle.sweep_interval),
            ("poll_interval", &self.lifecycle.poll_interval),
        ];
        for (field, value) in durations {
            if let Some(s) = value {
                if parse_duration_string(s).is_none() {
                    return Err(Error::Validation(format!(
                        "lifecycle.{}: unparseable duration '{}'",
                        field, s
                    )));
                }
            }
        }

        Ok(())
    }
}
