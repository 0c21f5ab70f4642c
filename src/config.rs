//! Configuration for the wrapup poller.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (WRAPUP_HOME, WRAPUP_DB, WRAPUP_TENANT)
//! 2. Config file (.wrapup/config.yaml)
//! 3. Defaults (~/.wrapup)
//!
//! Secrets are read from the environment only (TELEPHONY_API_KEY,
//! CRM_USERNAME, CRM_PASSWORD, ANALYZER_API_KEY, ALERT_WEBHOOK_TOKEN).
//!
//! Config file discovery:
//! - Searches current directory and parents for .wrapup/config.yaml
//! - Paths in config file are relative to the .wrapup/ directory

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{PollerLimits, VoidRules};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DEFAULT_TENANT: &str = "default";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub telephony: TelephonyConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub serve: ServeConfig,
    #[serde(default)]
    pub limits: PollerLimits,
    #[serde(default)]
    pub auto_void: VoidRules,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .wrapup/)
    pub home: Option<String>,
    /// SQLite database (relative to .wrapup/)
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelephonyConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_analyzer_url")]
    pub base_url: String,
    #[serde(default = "default_analyzer_model")]
    pub model: String,
}

fn default_analyzer_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_analyzer_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            base_url: default_analyzer_url(),
            model: default_analyzer_model(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8787
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Credentials pulled from the environment
#[derive(Clone, Default)]
pub struct Secrets {
    pub telephony_api_key: Option<String>,
    pub crm_username: Option<String>,
    pub crm_password: Option<String>,
    pub analyzer_api_key: Option<String>,
    pub alert_webhook_token: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mask(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("Secrets")
            .field("telephony_api_key", &mask(&self.telephony_api_key))
            .field("crm_username", &mask(&self.crm_username))
            .field("crm_password", &mask(&self.crm_password))
            .field("analyzer_api_key", &mask(&self.analyzer_api_key))
            .field("alert_webhook_token", &mask(&self.alert_webhook_token))
            .finish()
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// SQLite database file
    pub database: PathBuf,
    pub tenant: String,
    pub telephony: TelephonyConfig,
    pub crm: CrmConfig,
    pub analyzer: AnalyzerConfig,
    pub alert: AlertConfig,
    pub serve: ServeConfig,
    pub limits: PollerLimits,
    pub auto_void: VoidRules,
    pub secrets: Secrets,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".wrapup").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Build the resolved configuration from an optional file and an env lookup
fn resolve<F>(found: Option<(PathBuf, ConfigFile)>, default_home: PathBuf, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let (config_file, file) = match found {
        Some((path, file)) => (Some(path), file),
        None => (None, ConfigFile::default()),
    };
    let wrapup_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let home = match (env("WRAPUP_HOME"), &file.paths.home, &wrapup_dir) {
        (Some(env_home), _, _) => PathBuf::from(env_home),
        (None, Some(home), Some(dir)) => resolve_path(dir, home),
        _ => default_home,
    };

    let database = match (env("WRAPUP_DB"), &file.paths.database, &wrapup_dir) {
        (Some(env_db), _, _) => PathBuf::from(env_db),
        (None, Some(db), Some(dir)) => resolve_path(dir, db),
        _ => home.join("wrapup.db"),
    };

    let tenant = env("WRAPUP_TENANT")
        .or(file.tenant)
        .unwrap_or_else(|| DEFAULT_TENANT.to_string());

    let secrets = Secrets {
        telephony_api_key: env("TELEPHONY_API_KEY"),
        crm_username: env("CRM_USERNAME"),
        crm_password: env("CRM_PASSWORD"),
        analyzer_api_key: env("ANALYZER_API_KEY"),
        alert_webhook_token: env("ALERT_WEBHOOK_TOKEN"),
    };

    file.limits
        .validate()
        .context("Invalid limits in configuration")?;

    Ok(ResolvedConfig {
        home,
        database,
        tenant,
        telephony: file.telephony,
        crm: file.crm,
        analyzer: file.analyzer,
        alert: file.alert,
        serve: file.serve,
        limits: file.limits,
        auto_void: file.auto_void,
        secrets,
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".wrapup");

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let found = match find_config_file(&cwd) {
        Some(path) => {
            let file = load_config_file(&path)?;
            Some((path, file))
        }
        None => None,
    };

    resolve(found, default_home, |key| {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_config(temp: &TempDir, yaml: &str) -> PathBuf {
        let dir = temp.path().join(".wrapup");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", yaml).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, PathBuf::from("/home/u/.wrapup"), env_from(&[])).unwrap();
        assert_eq!(config.home, PathBuf::from("/home/u/.wrapup"));
        assert_eq!(config.database, PathBuf::from("/home/u/.wrapup/wrapup.db"));
        assert_eq!(config.tenant, "default");
        assert_eq!(config.limits.lock_active_seconds, 240);
        assert!(config.config_file.is_none());
        assert!(config.secrets.crm_password.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            &temp,
            r#"
version: "1"
tenant: agency-1
paths:
  home: state
  database: state/calls.db
telephony:
  base_url: https://pbx.example.com/api
crm:
  base_url: https://crm.example.com/v1
limits:
  item_timeout_seconds: 45
auto_void:
  policy: heuristic
  sentinel_numbers: ["5550000000"]
"#,
        );

        let file = load_config_file(&path).unwrap();
        let config = resolve(
            Some((path.clone(), file)),
            PathBuf::from("/unused"),
            env_from(&[("CRM_PASSWORD", "hunter2")]),
        )
        .unwrap();

        let wrapup_dir = path.parent().unwrap();
        assert_eq!(config.tenant, "agency-1");
        assert_eq!(config.home, wrapup_dir.join("state"));
        assert_eq!(config.database, wrapup_dir.join("state/calls.db"));
        assert_eq!(config.limits.item_timeout_seconds, 45);
        assert_eq!(config.limits.lock_stale_seconds, 300);
        assert_eq!(config.auto_void.policy, crate::core::VoidPolicy::Heuristic);
        assert_eq!(config.crm.base_url.as_deref(), Some("https://crm.example.com/v1"));
        assert_eq!(config.secrets.crm_password.as_deref(), Some("hunter2"));
        assert_eq!(config.analyzer.model, "gpt-4o-mini");
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, "tenant: from-file\n");
        let file = load_config_file(&path).unwrap();
        let config = resolve(
            Some((path, file)),
            PathBuf::from("/unused"),
            env_from(&[
                ("WRAPUP_TENANT", "from-env"),
                ("WRAPUP_DB", "/tmp/x.db"),
            ]),
        )
        .unwrap();
        assert_eq!(config.tenant, "from-env");
        assert_eq!(config.database, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let file: ConfigFile =
            serde_yaml::from_str("limits:\n  lock_active_seconds: 900\n").unwrap();
        let err = resolve(
            Some((PathBuf::from("/p/.wrapup/config.yaml"), file)),
            PathBuf::from("/unused"),
            env_from(&[]),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("active lock window"));
    }

    #[test]
    fn test_discovery_walks_up() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, "tenant: t\n");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_config_file(&nested), Some(path));
    }

    #[test]
    fn test_secrets_are_masked_in_debug() {
        let secrets = Secrets {
            crm_password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let shown = format!("{:?}", secrets);
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<set>"));
    }
}
