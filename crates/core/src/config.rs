//! TOML-based configuration for multimerge.
//!
//! The API key is never stored in the file: `[ai].api_key_env` names the
//! environment variable that holds it, and the value is resolved at runtime
//! via [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::openai::ProviderSettings;
use crate::errors::ConfigError;
use crate::models::{AiMergePrefs, MergeOptions};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default merge options; command-line flags override them.
    #[serde(default)]
    pub merge: MergeOptions,

    /// Which repositories a run processes.
    #[serde(default)]
    pub repos: ReposConfig,

    /// Completion-engine settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// What to do with conflicts the AI pass could not resolve.
    #[serde(default)]
    pub handoff: HandoffConfig,
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// Repository sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReposConfig {
    /// Explicit working-tree paths, processed first and in order.
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Directory whose immediate subdirectories are scanned for working trees.
    #[serde(default)]
    pub discover_root: Option<PathBuf>,

    /// Glob patterns a discovered directory name must match (empty = all).
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns that exclude a discovered directory name.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ReposConfig {
    pub fn has_sources(&self) -> bool {
        !self.paths.is_empty() || self.discover_root.is_some()
    }
}

// ---------------------------------------------------------------------------
// AI
// ---------------------------------------------------------------------------

/// OpenAI-compatible provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Run the AI pass on conflicts at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Provider base URL (default `https://api.openai.com/v1`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Refuse to run the AI pass without a key. Local providers usually do
    /// not need one.
    #[serde(default = "default_true")]
    pub require_api_key: bool,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// `git add` files after writing AI-merged content.
    #[serde(default = "default_true")]
    pub stage_on_success: bool,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Resolved API key (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_max_tokens() -> u32 {
    8000
}
fn default_temperature() -> f64 {
    0.1
}
fn default_timeout() -> u64 {
    120
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            require_api_key: true,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            stage_on_success: true,
            timeout_secs: default_timeout(),
            api_key: None,
        }
    }
}

impl AiConfig {
    /// Provider settings for the HTTP engine. A missing key becomes an empty
    /// string; the engine's pre-flight check decides whether that is fatal.
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            base_url: self.base_url.trim().to_string(),
            model: self.model.trim().to_string(),
            api_key: self.api_key.clone().unwrap_or_default(),
            require_api_key: self.require_api_key,
            timeout_secs: self.timeout_secs,
        }
    }

    /// Base preferences; the pipeline adds the language hint per file.
    pub fn merge_prefs(&self) -> AiMergePrefs {
        AiMergePrefs {
            language_hint: None,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stage_on_success: self.stage_on_success,
        }
    }
}

// ---------------------------------------------------------------------------
// Hand-off
// ---------------------------------------------------------------------------

/// External tool launched for conflicts that remain after the AI pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Program to launch (e.g. `code`); `None` only reports the paths.
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments placed before the conflicted paths.
    #[serde(default)]
    pub args: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `ai.api_key_env` into `ai.api_key`.
    ///
    /// A missing variable only logs a warning: whether a key is needed is
    /// decided by the engine's pre-flight check when conflicts appear.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");
        self.ai.api_key = resolve_optional_env(&self.ai.api_key_env, "ai.api_key_env");
        Ok(())
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.ai.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "ai.base_url".into(),
                detail: "must start with http:// or https://".into(),
            });
        }
        if self.ai.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ai.model".into(),
                detail: "model must not be empty".into(),
            });
        }
        if self.ai.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ai.max_tokens".into(),
                detail: "max_tokens must be > 0".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "ai.temperature".into(),
                detail: "temperature must be between 0 and 2".into(),
            });
        }
        if self.ai.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ai.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if let Some(ref command) = self.handoff.command {
            if command.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "handoff.command".into(),
                    detail: "command must not be blank (omit it instead)".into(),
                });
            }
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.trim().is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val.trim().to_string())
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::language::Language;
    use crate::models::LanguageMode;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[merge]
source_branch = "release"
fetch_before_merge = false
stash_if_dirty = true
allow_dirty_merge = false
no_fast_forward = true
squash = false
push_after_merge = true
stop_on_conflict = false
language_mode = "C#"

[repos]
paths = ["/work/svc-a", "/work/svc-b"]
discover_root = "/work"
include = ["svc-*"]
exclude = ["svc-legacy"]

[ai]
base_url = "http://localhost:1234/v1"
model = "local-model"
api_key_env = "MULTIMERGE_TEST_KEY_UNUSED"
require_api_key = false
max_tokens = 4000
temperature = 0.2
stage_on_success = false
timeout_secs = 30

[handoff]
command = "code"
args = ["--wait"]
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.merge.source_branch, "release");
        assert!(!config.merge.fetch_before_merge);
        assert!(config.merge.no_fast_forward);
        assert!(config.merge.push_after_merge);
        assert!(!config.merge.stop_on_conflict);
        assert_eq!(
            config.merge.language_mode,
            LanguageMode::Fixed(Language::CSharp)
        );
        assert_eq!(config.repos.paths.len(), 2);
        assert_eq!(config.repos.include, vec!["svc-*"]);
        assert_eq!(config.ai.model, "local-model");
        assert!(!config.ai.require_api_key);
        assert_eq!(config.handoff.command.as_deref(), Some("code"));
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.merge.fetch_before_merge);
        assert!(config.merge.stop_on_conflict);
        assert_eq!(config.ai.base_url, "https://api.openai.com/v1");
        assert_eq!(config.ai.model, "gpt-4o-mini");
        assert_eq!(config.ai.api_key_env, "OPENAI_API_KEY");
        assert!(config.ai.require_api_key);
        assert_eq!(config.ai.max_tokens, 8000);
        assert!(config.ai.stage_on_success);
        assert!(!config.repos.has_sources());
        assert!(config.handoff.command.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multimerge.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.ai.timeout_secs, 30);
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/multimerge.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[merge]\nlanguage_mode = \"cobol\"\n").unwrap();
        let result = AppConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.ai.base_url = "localhost:1234".into();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "ai.base_url"
        ));
    }

    #[test]
    fn test_validate_rejects_temperature() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.ai.temperature = 3.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "ai.temperature"
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("MULTIMERGE_TEST_KEY", "  sk-abc  ");

        let mut config: AppConfig =
            toml::from_str("[ai]\napi_key_env = \"MULTIMERGE_TEST_KEY\"\n").unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-abc"));

        let settings = config.ai.provider_settings();
        assert_eq!(settings.api_key, "sk-abc");
        assert!(!settings.missing_required_key());

        std::env::remove_var("MULTIMERGE_TEST_KEY");
    }

    #[test]
    fn test_missing_env_leaves_key_unset() {
        let mut config: AppConfig =
            toml::from_str("[ai]\napi_key_env = \"MULTIMERGE_TEST_KEY_NEVER_SET\"\n").unwrap();
        config.resolve_env_vars().unwrap();
        assert!(config.ai.api_key.is_none());
        assert!(config.ai.provider_settings().missing_required_key());
    }

    #[test]
    fn test_merge_prefs_from_config() {
        let config: AppConfig = toml::from_str(sample_toml()).unwrap();
        let prefs = config.ai.merge_prefs();
        assert_eq!(prefs.max_tokens, 4000);
        assert!((prefs.temperature - 0.2).abs() < f64::EPSILON);
        assert!(!prefs.stage_on_success);
        assert!(prefs.language_hint.is_none());
    }
}
