//! Where the API URL and key come from.
//!
//! Each value is taken from the first source that has it: command-line flag, then
//! `~/.ntd-client/config.json`, then the `NTD_API_URL` / `NTD_API_KEY` environment
//! variables (after loading `.env`).
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::api::normalize_url;
use crate::client::Timeouts;

pub const URL_VAR: &str = "NTD_API_URL";
pub const KEY_VAR: &str = "NTD_API_KEY";
pub const KEY_PREFIX: &str = "ntd_";

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "TimeoutOverrides::is_empty")]
    pub timeouts: TimeoutOverrides,
}

/// Per-endpoint timeouts in seconds, each falling back to the built-in default.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TimeoutOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyze: Option<u64>,
}

impl TimeoutOverrides {
    fn is_empty(&self) -> bool {
        self.health.is_none() && self.models.is_none() && self.analyze.is_none()
    }

    pub fn apply(&self, base: Timeouts) -> Timeouts {
        Timeouts {
            health: self.health.map(Duration::from_secs).unwrap_or(base.health),
            models: self.models.map(Duration::from_secs).unwrap_or(base.models),
            analyze: self.analyze.map(Duration::from_secs).unwrap_or(base.analyze),
        }
    }
}

/// Resolved connection settings.
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub api_url: String,
    pub api_key: String,
    pub timeouts: Timeouts,
}

/// `~/.ntd-client/config.json`, or `None` when there is no home directory.
pub fn config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".ntd-client").join("config.json"))
}

impl Config {
    /// Reads the config file. A missing file is an empty config, not an error.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(Config::default());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&raw).with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config file: {}", path.display()))?;
        restrict_permissions(path)?;
        log::info!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Combines flags, file and environment. `None` when the URL or key is still unset.
pub fn resolve<F>(flag_url: Option<&str>, flag_key: Option<&str>, file: &Config, env: F) -> Option<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |value: &str| !value.trim().is_empty();

    let api_url = flag_url
        .map(str::to_string)
        .or_else(|| file.api_url.clone())
        .or_else(|| env(URL_VAR))
        .filter(|url| non_empty(url))?;
    let api_key = flag_key
        .map(str::to_string)
        .or_else(|| file.api_key.clone())
        .or_else(|| env(KEY_VAR))
        .filter(|key| non_empty(key))?;

    Some(Credentials {
        api_url: normalize_url(&api_url),
        api_key,
        timeouts: file.timeouts.apply(Timeouts::default()),
    })
}

/// Loads `.env` (if any) and reads credentials from the process environment.
pub fn resolve_from_env(flag_url: Option<&str>, flag_key: Option<&str>) -> Result<Option<Credentials>> {
    if let Ok(path) = dotenv::dotenv() {
        log::debug!("Loaded environment from {}", path.display());
    }
    let file = match config_path() {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    Ok(resolve(flag_url, flag_key, &file, |name| std::env::var(name).ok()))
}

/// First 20 and last 10 characters of a key; short keys are fully hidden.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 30 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..20].iter().collect();
    let tail: String = chars[chars.len() - 10..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_flag_beats_file_beats_env() {
        let file = Config {
            api_url: Some("file.example.com".into()),
            api_key: Some("ntd_file".into()),
            ..Config::default()
        };
        let env = env_of(&[(URL_VAR, "https://env.example.com"), (KEY_VAR, "ntd_env")]);

        let creds = resolve(Some("http://flag.example.com/"), None, &file, &env).unwrap();
        assert_eq!(creds.api_url, "http://flag.example.com");
        assert_eq!(creds.api_key, "ntd_file");

        let creds = resolve(None, None, &Config::default(), &env).unwrap();
        assert_eq!(creds.api_url, "https://env.example.com");
        assert_eq!(creds.api_key, "ntd_env");
    }

    #[test]
    fn test_missing_key_is_none() {
        let env = env_of(&[(URL_VAR, "https://env.example.com"), (KEY_VAR, "  ")]);

        assert!(resolve(None, None, &Config::default(), env).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".ntd-client").join("config.json");
        let config = Config {
            api_url: Some("https://api.example.com".into()),
            api_key: Some("ntd_abc".into()),
            timeouts: TimeoutOverrides {
                analyze: Some(60),
                ..TimeoutOverrides::default()
            },
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);

        let creds = resolve(None, None, &loaded, |_| None).unwrap();
        assert_eq!(creds.timeouts.analyze, Duration::from_secs(60));
        assert_eq!(creds.timeouts.health, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();

        assert_eq!(Config::load(&temp.path().join("nope.json")).unwrap(), Config::default());
    }

    #[test]
    fn test_mask_key() {
        let key = format!("ntd_{}", "x".repeat(40));
        let masked = mask_key(&key);

        assert!(masked.starts_with("ntd_xxxxxxxxxxxxxxxx..."));
        assert_eq!(masked.len(), 33);
        assert_eq!(mask_key("ntd_short"), "*********");
    }
}
