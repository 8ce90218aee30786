use std::path::{Path, PathBuf};
use taskpilot_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const ENV_PREFIX: &str = "TASKPILOT_";

/// Loads [`AppConfig`] from an optional TOML file, then applies environment
/// overrides on top. A missing file yields the defaults.
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<AppConfig> {
        let mut config = match &self.path {
            Some(path) if path.exists() => Self::load_file(path)?,
            Some(path) => {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )))
            }
            None => {
                debug!("no config file given, starting from defaults");
                AppConfig::default()
            }
        };

        apply_env_overrides(&mut config);
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<AppConfig> {
        info!("loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))
    }
}

/// Environment variables override file values. Only values actually set in
/// the environment are applied.
fn apply_env_overrides(config: &mut AppConfig) {
    if let Some(host) = env_var("GATEWAY_HOST") {
        config.gateway.host = host;
    }
    if let Some(port) = env_var("GATEWAY_PORT").and_then(|p| p.parse().ok()) {
        config.gateway.port = port;
    }
    if let Some(path) = env_var("DATABASE_PATH") {
        config.database.path = PathBuf::from(path);
    }
    if let Some(key) = env_var("LLM_API_KEY") {
        config.llm.api_key = key;
    }
    if let Some(url) = env_var("LLM_BASE_URL") {
        config.llm.base_url = Some(url);
    }
    if let Some(model) = env_var("LLM_MODEL") {
        config.llm.model = model;
    }
    if let Some(secret) = env_var("TOKEN_SECRET") {
        config.auth.token_secret = secret;
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{suffix}"))
        .ok()
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_yields_defaults() {
        let config = ConfigLoader::new(None).load().expect("load should succeed");
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.auth.token_ttl_secs, 24 * 60 * 60);
    }

    #[test]
    fn explicit_but_absent_file_is_an_error() {
        let result = ConfigLoader::new(Some(PathBuf::from("/nonexistent/taskpilot.toml"))).load();
        assert!(result.is_err());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should create");
        writeln!(
            file,
            r#"
[gateway]
host = "0.0.0.0"
port = 9090

[llm]
model = "llama-3.3-70b-versatile"
base_url = "https://api.groq.com/openai/v1"

[auth]
token_ttl_secs = 600
"#
        )
        .unwrap();

        let config = ConfigLoader::new(Some(file.path().to_path_buf()))
            .load()
            .expect("load should succeed");
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.port, 9090);
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(
            config.llm.base_url.as_deref(),
            Some("https://api.groq.com/openai/v1")
        );
        assert_eq!(config.auth.token_ttl_secs, 600);
        // Sections not present keep their defaults.
        assert_eq!(config.database.path, PathBuf::from("taskpilot.db"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway]\nhots = \"typo\"").unwrap();

        let err = ConfigLoader::new(Some(file.path().to_path_buf()))
            .load()
            .expect_err("typo'd key should fail");
        assert!(err.to_string().contains("invalid config"));
    }
}
