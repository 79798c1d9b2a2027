//! Configuration for the migration toolkit.
//!
//! Layered model:
//! - built-in defaults (serverless YDB endpoint, local `iam.token`)
//! - optional `ydbmig.toml` in the working root
//! - environment toggles read once at load:
//!   - `YDB_MIGRATIONS_DEBUG` - echo raw tool output (default on)
//!   - `YDB_MIGRATIONS_ANSI` - force colors on or off

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "ydbmig.toml";

pub const DEFAULT_ENDPOINT: &str = "grpcs://ydb.serverless.yandexcloud.net:2135";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// gRPC endpoint shared by every serverless database
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Fallback database path for rollback files that name no target
    pub default_database: Option<String>,
    /// Token file name, relative to the working root
    #[serde(default = "default_token_file")]
    pub token_file: String,
    /// Directory migration files are written to and picked from
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,
    /// Timeout for `yc` invocations
    #[serde(default = "default_yc_timeout")]
    pub yc_timeout_secs: u64,
    /// Timeout for `ydb` invocations
    #[serde(default = "default_ydb_timeout")]
    pub ydb_timeout_secs: u64,
    /// Mask token values in echoed commands
    #[serde(default = "default_mask_secrets")]
    pub mask_secrets: bool,
    /// Echo raw tool output in debug blocks (from YDB_MIGRATIONS_DEBUG)
    #[serde(skip)]
    pub debug_raw: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            default_database: None,
            token_file: default_token_file(),
            migrations_dir: default_migrations_dir(),
            yc_timeout_secs: default_yc_timeout(),
            ydb_timeout_secs: default_ydb_timeout(),
            mask_secrets: default_mask_secrets(),
            debug_raw: true,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_token_file() -> String {
    "iam.token".to_string()
}

fn default_migrations_dir() -> String {
    ".".to_string()
}

fn default_yc_timeout() -> u64 {
    20
}

fn default_ydb_timeout() -> u64 {
    40
}

fn default_mask_secrets() -> bool {
    true
}

impl Config {
    /// Load configuration from `ydbmig.toml` under `root`, falling back to
    /// defaults when the file is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);

        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Config::default()
        };

        config.debug_raw = env_flag("YDB_MIGRATIONS_DEBUG", true);
        Ok(config)
    }

    pub fn yc_timeout(&self) -> Duration {
        Duration::from_secs(self.yc_timeout_secs)
    }

    pub fn ydb_timeout(&self) -> Duration {
        Duration::from_secs(self.ydb_timeout_secs)
    }
}

/// Apply the `YDB_MIGRATIONS_ANSI` override. When the variable is unset the
/// terminal detection of the color crates is left alone.
pub fn apply_ansi_preference() {
    if let Ok(value) = std::env::var("YDB_MIGRATIONS_ANSI") {
        let enabled = parse_flag(Some(&value), true);
        console::set_colors_enabled(enabled);
        console::set_colors_enabled_stderr(enabled);
        colored::control::set_override(enabled);
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => parse_flag(Some(&value), default),
        Err(_) => default,
    }
}

/// `0`, `false`, and `no` disable a flag; anything else enables it.
fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value {
        Some(v) => {
            let v = v.trim().to_lowercase();
            if v.is_empty() {
                default
            } else {
                !matches!(v.as_str(), "0" | "false" | "no")
            }
        }
        None => default,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.token_file, "iam.token");
        assert_eq!(config.migrations_dir, ".");
        assert_eq!(config.yc_timeout(), Duration::from_secs(20));
        assert_eq!(config.ydb_timeout(), Duration::from_secs(40));
        assert!(config.mask_secrets);
        assert!(config.default_database.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            default_database = "/ru-central1/b1gcloud/etn0db"
            ydb_timeout_secs = 90
            "#,
        )
        .unwrap();
        assert_eq!(
            config.default_database.as_deref(),
            Some("/ru-central1/b1gcloud/etn0db")
        );
        assert_eq!(config.ydb_timeout_secs, 90);
        // untouched fields keep their defaults
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.yc_timeout_secs, 20);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(None, true));
        assert!(!parse_flag(None, false));
        assert!(parse_flag(Some("1"), false));
        assert!(parse_flag(Some("yes"), false));
        assert!(!parse_flag(Some("0"), true));
        assert!(!parse_flag(Some("false"), true));
        assert!(!parse_flag(Some(" No "), true));
        assert!(parse_flag(Some("off"), true));
        assert!(parse_flag(Some(""), true));
    }
}
