//! Runtime configuration.
//!
//! Precedence: CLI > env > config file > defaults. Config files are searched at
//! the CLI path, `$NATOURS_CONFIG`, `~/.config/natours.toml` and
//! `./natours.toml`; the first one that parses wins.

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Development,
    Production,
}

impl RunMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Values read from a config file or set by flags; every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub env: Option<RunMode>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    pub jwt_expires_in: Option<String>,
    pub jwt_cookie_expires_in: Option<i64>,
    pub max_limit: Option<usize>,
    pub body_limit_bytes: Option<usize>,
    pub rate_limit_max: Option<u64>,
    pub rate_limit_window_secs: Option<u64>,
    pub log_config: Option<PathBuf>,
}

impl ConfigLayer {
    /// Fills keys still unset from `lower`.
    fn or(self, lower: Self) -> Self {
        Self {
            env: self.env.or(lower.env),
            port: self.port.or(lower.port),
            data_dir: self.data_dir.or(lower.data_dir),
            jwt_secret: self.jwt_secret.or(lower.jwt_secret),
            jwt_expires_in: self.jwt_expires_in.or(lower.jwt_expires_in),
            jwt_cookie_expires_in: self.jwt_cookie_expires_in.or(lower.jwt_cookie_expires_in),
            max_limit: self.max_limit.or(lower.max_limit),
            body_limit_bytes: self.body_limit_bytes.or(lower.body_limit_bytes),
            rate_limit_max: self.rate_limit_max.or(lower.rate_limit_max),
            rate_limit_window_secs: self.rate_limit_window_secs.or(lower.rate_limit_window_secs),
            log_config: self.log_config.or(lower.log_config),
        }
    }

    /// Layer from environment variables, read through `get`.
    pub fn from_env_with(get: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            env: get("NATOURS_ENV").or_else(|| get("NODE_ENV")).and_then(|s| RunMode::parse(&s)),
            port: get("PORT").and_then(|s| s.parse().ok()),
            data_dir: get("NATOURS_DATA_DIR").map(PathBuf::from),
            jwt_secret: get("JWT_SECRET"),
            jwt_expires_in: get("JWT_EXPIRES_IN"),
            jwt_cookie_expires_in: get("JWT_COOKIE_EXPIRES_IN").and_then(|s| s.parse().ok()),
            max_limit: get("NATOURS_MAX_LIMIT").and_then(|s| s.parse().ok()),
            body_limit_bytes: None,
            rate_limit_max: None,
            rate_limit_window_secs: None,
            log_config: get("NATOURS_LOG_CONFIG").map(PathBuf::from),
        }
    }

    pub fn from_env() -> Self {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    pub fn from_toml(s: &str) -> Result<Self, AppError> {
        toml::from_str(s).map_err(|e| AppError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub env: RunMode,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expires_in: String,
    /// Days.
    pub jwt_cookie_expires_in: i64,
    pub max_limit: Option<usize>,
    pub body_limit_bytes: usize,
    pub rate_limit_max: u64,
    pub rate_limit_window_secs: u64,
    pub log_config: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: RunMode::Development,
            port: 3000,
            data_dir: None,
            jwt_secret: String::new(),
            jwt_expires_in: "90d".into(),
            jwt_cookie_expires_in: 90,
            max_limit: None,
            body_limit_bytes: 10 * 1024,
            rate_limit_max: 100,
            rate_limit_window_secs: 3600,
            log_config: None,
        }
    }
}

impl AppConfig {
    /// Applies a merged layer over the defaults.
    #[must_use]
    pub fn from_layer(layer: ConfigLayer) -> Self {
        let d = Self::default();
        Self {
            env: layer.env.unwrap_or(d.env),
            port: layer.port.unwrap_or(d.port),
            data_dir: layer.data_dir,
            jwt_secret: layer.jwt_secret.unwrap_or(d.jwt_secret),
            jwt_expires_in: layer.jwt_expires_in.unwrap_or(d.jwt_expires_in),
            jwt_cookie_expires_in: layer.jwt_cookie_expires_in.unwrap_or(d.jwt_cookie_expires_in),
            max_limit: layer.max_limit,
            body_limit_bytes: layer.body_limit_bytes.unwrap_or(d.body_limit_bytes),
            rate_limit_max: layer.rate_limit_max.unwrap_or(d.rate_limit_max),
            rate_limit_window_secs: layer.rate_limit_window_secs.unwrap_or(d.rate_limit_window_secs),
            log_config: layer.log_config,
        }
    }

    /// Merges `cli`, the environment and the first readable config file.
    pub fn load(cli: ConfigLayer, cli_path: Option<&Path>) -> Result<Self, AppError> {
        let mut file = ConfigLayer::default();
        for p in config_paths(cli_path) {
            let Ok(s) = std::fs::read_to_string(&p) else {
                continue;
            };
            let secrets = scan_toml_for_secret_keys(&s);
            if !secrets.is_empty() {
                log::warn!(
                    "config file {} holds secret-like keys ({}); prefer environment variables",
                    p.display(),
                    secrets.join(",")
                );
            }
            file = ConfigLayer::from_toml(&s).map_err(|e| AppError::Config(format!("{}: {e}", p.display())))?;
            break;
        }
        Ok(Self::from_layer(cli.or(ConfigLayer::from_env()).or(file)))
    }

    /// Problems that stop the server from starting.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.jwt_secret.len() < 8 {
            return Err(AppError::Config("JWT_SECRET must be set to at least 8 characters".into()));
        }
        crate::auth::token::parse_expires_in(&self.jwt_expires_in)?;
        if self.jwt_cookie_expires_in <= 0 {
            return Err(AppError::Config("jwt_cookie_expires_in must be positive".into()));
        }
        if self.rate_limit_window_secs == 0 {
            return Err(AppError::Config("rate_limit_window_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Config file candidates, highest precedence first.
#[must_use]
pub fn config_paths(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = cli_path {
        paths.push(p.to_path_buf());
    }
    if let Ok(p) = std::env::var("NATOURS_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Some(dir) = dirs_next::config_dir() {
        paths.push(dir.join("natours.toml"));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join("natours.toml"));
    }
    paths
}

fn is_secret_key(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    ["password", "passwd", "secret", "token", "apikey", "api_key", "private_key"].iter().any(|s| k.contains(s))
}

/// Dotted paths of secret-looking keys in a TOML document. Values are never returned.
#[must_use]
pub fn scan_toml_for_secret_keys(raw: &str) -> Vec<String> {
    let Ok(val) = toml::from_str::<toml::Table>(raw) else {
        return Vec::new();
    };
    let mut secrets = Vec::new();
    let mut q: VecDeque<(String, toml::Value)> = VecDeque::new();
    q.push_back((String::new(), toml::Value::Table(val)));
    while let Some((prefix, v)) = q.pop_front() {
        match v {
            toml::Value::Table(map) => {
                for (k, vv) in map {
                    let full = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                    if is_secret_key(&k) {
                        secrets.push(full.clone());
                    }
                    q.push_back((full, vv));
                }
            }
            toml::Value::Array(arr) => {
                for (i, vv) in arr.into_iter().enumerate() {
                    q.push_back((format!("{prefix}[{i}]"), vv));
                }
            }
            _ => {}
        }
    }
    secrets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn precedence_cli_env_file_default() {
        let file = ConfigLayer::from_toml("port = 4000\njwt_expires_in = \"1d\"\nmax_limit = 50\n").unwrap();
        let vars: HashMap<&str, &str> = [("PORT", "5000"), ("NODE_ENV", "production")].into();
        let env = ConfigLayer::from_env_with(|k| vars.get(k).map(|s| (*s).to_string()));
        let cli = ConfigLayer { max_limit: Some(10), ..ConfigLayer::default() };
        let cfg = AppConfig::from_layer(cli.or(env).or(file));
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.env, RunMode::Production);
        assert_eq!(cfg.jwt_expires_in, "1d");
        assert_eq!(cfg.max_limit, Some(10));
        assert_eq!(cfg.body_limit_bytes, 10 * 1024);
    }

    #[test]
    fn unknown_file_keys_rejected() {
        assert!(ConfigLayer::from_toml("prot = 1").is_err());
    }

    #[test]
    fn secret_scan_redacts_values() {
        let found = scan_toml_for_secret_keys("jwt_secret = \"abc\"\n[mail]\napi_key = \"x\"\nhost = \"h\"\n");
        assert_eq!(found, vec!["jwt_secret".to_string(), "mail.api_key".to_string()]);
    }

    #[test]
    fn validation() {
        let mut cfg = AppConfig::default();
        assert!(cfg.validate().is_err());
        cfg.jwt_secret = "my-ultra-secure-secret".into();
        assert!(cfg.validate().is_ok());
        cfg.jwt_expires_in = "forever".into();
        assert!(cfg.validate().is_err());
    }
}
