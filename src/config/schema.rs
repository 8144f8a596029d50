use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const CONFIG_DIR_ENV: &str = "AGENTRELAY_CONFIG_DIR";
const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level agentrelay configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` → `AGENTRELAY_CONFIG_DIR` env → `~/.agentrelay/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// API key for the selected provider. Overridden by `AGENTRELAY_API_KEY` or `API_KEY` env vars.
    pub api_key: Option<String>,
    /// Base URL override for the provider API (e.g. "http://10.0.0.1:11434/v1" for remote Ollama,
    /// or the resource endpoint for Azure OpenAI)
    pub api_url: Option<String>,
    /// Default provider ID or alias (`"openai"`, `"azure"`, `"ollama"`, `"foundry-local"`,
    /// `"custom:<url>"`). Default: `"openai"`.
    pub default_provider: Option<String>,
    /// Default model (or Azure deployment name). Default: `"gpt-4o-mini"`.
    pub default_model: Option<String>,
    /// Default model temperature (0.0–2.0). Default: `0.7`.
    pub default_temperature: f64,

    /// Agent settings (`[agent]`).
    #[serde(default)]
    pub agent: AgentConfig,

    /// Workflow run limits (`[workflow]`).
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Runtime trace configuration (`[observability]`).
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Conversation persistence for `agentrelay chat` (`[sessions]`).
    #[serde(default)]
    pub sessions: SessionsConfig,
}

// ── Agent ─────────────────────────────────────────────────────────

/// Agent configuration (`[agent]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentConfig {
    /// Maximum model → tool round trips per invocation. Default: `10`.
    #[serde(default = "default_agent_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// Stream model tokens as partial output. Default: `true`.
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_agent_max_tool_iterations() -> usize {
    crate::agent::DEFAULT_MAX_TOOL_ITERATIONS
}

fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_agent_max_tool_iterations(),
            stream: true,
        }
    }
}

// ── Workflow ──────────────────────────────────────────────────────

/// Workflow run limits (`[workflow]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowConfig {
    /// Maximum agent invocations per run. Must be greater than 0. Default: `10`.
    #[serde(default = "default_workflow_max_steps")]
    pub max_steps: usize,
    /// Per-invocation timeout in seconds. Unset means no timeout.
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
}

fn default_workflow_max_steps() -> usize {
    crate::workflow::DEFAULT_MAX_STEPS
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_steps: default_workflow_max_steps(),
            step_timeout_secs: None,
        }
    }
}

// ── Observability ─────────────────────────────────────────────────

/// Runtime trace configuration (`[observability]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObservabilityConfig {
    /// Runtime trace storage mode: "none" | "rolling" | "full".
    /// Controls whether run events are persisted as JSON lines.
    #[serde(default = "default_runtime_trace_mode")]
    pub runtime_trace_mode: String,

    /// Runtime trace file path. Relative paths are resolved under the config directory.
    #[serde(default = "default_runtime_trace_path")]
    pub runtime_trace_path: String,

    /// Maximum entries retained when runtime_trace_mode = "rolling".
    #[serde(default = "default_runtime_trace_max_entries")]
    pub runtime_trace_max_entries: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            runtime_trace_mode: default_runtime_trace_mode(),
            runtime_trace_path: default_runtime_trace_path(),
            runtime_trace_max_entries: default_runtime_trace_max_entries(),
        }
    }
}

fn default_runtime_trace_mode() -> String {
    "none".to_string()
}

fn default_runtime_trace_path() -> String {
    "state/runtime-trace.jsonl".to_string()
}

fn default_runtime_trace_max_entries() -> usize {
    200
}

// ── Sessions ──────────────────────────────────────────────────────

/// Conversation store configuration (`[sessions]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionsConfig {
    /// Directory holding one JSON file per session key. Relative paths are
    /// resolved under the config directory.
    #[serde(default = "default_sessions_dir")]
    pub dir: String,
}

fn default_sessions_dir() -> String {
    "sessions".to_string()
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            dir: default_sessions_dir(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(".agentrelay").join(CONFIG_FILE_NAME),
            api_key: None,
            api_url: None,
            default_provider: Some("openai".to_string()),
            default_model: Some("gpt-4o-mini".to_string()),
            default_temperature: 0.7,
            agent: AgentConfig::default(),
            workflow: WorkflowConfig::default(),
            observability: ObservabilityConfig::default(),
            sessions: SessionsConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".agentrelay"))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ConfigResolutionSource {
    Flag,
    EnvConfigDir,
    DefaultConfigDir,
}

impl ConfigResolutionSource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "--config-dir",
            Self::EnvConfigDir => CONFIG_DIR_ENV,
            Self::DefaultConfigDir => "default",
        }
    }
}

fn expand_dir(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
}

fn resolve_config_dir(explicit: Option<&Path>) -> Result<(PathBuf, ConfigResolutionSource)> {
    if let Some(dir) = explicit {
        return Ok((dir.to_path_buf(), ConfigResolutionSource::Flag));
    }
    if let Ok(raw) = std::env::var(CONFIG_DIR_ENV) {
        if !raw.trim().is_empty() {
            return Ok((expand_dir(&raw), ConfigResolutionSource::EnvConfigDir));
        }
    }
    Ok((default_config_dir()?, ConfigResolutionSource::DefaultConfigDir))
}

fn config_dir_creation_error(path: &Path) -> String {
    format!(
        "Failed to create config directory: {}. If running as an OS service, \
         set {CONFIG_DIR_ENV} to a writable directory.",
        path.display()
    )
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        Self::load_or_init_in(None).await
    }

    /// Load `config.toml` from `config_dir` (or the resolved default),
    /// writing a default file first when none exists.
    pub async fn load_or_init_in(config_dir: Option<&Path>) -> Result<Self> {
        let (config_dir, resolution_source) = resolve_config_dir(config_dir)?;
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(&config_dir)
            .await
            .with_context(|| config_dir_creation_error(&config_dir))?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            // Restrict permissions on newly created config file (may contain API keys)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }
            config
        } else {
            // Warn if config file is world-readable (may contain API keys)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            source = resolution_source.as_str(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Directory holding `config.toml`.
    pub fn config_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn resolve_under_config_dir(&self, raw: &str) -> PathBuf {
        let path = expand_dir(raw);
        if path.is_absolute() {
            path
        } else {
            self.config_dir().join(path)
        }
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.resolve_under_config_dir(&self.sessions.dir)
    }

    pub fn runtime_trace_path(&self) -> PathBuf {
        self.resolve_under_config_dir(&self.observability.runtime_trace_path)
    }

    pub fn provider_name(&self) -> &str {
        self.default_provider.as_deref().unwrap_or("openai")
    }

    pub fn model_name(&self) -> &str {
        self.default_model.as_deref().unwrap_or("gpt-4o-mini")
    }

    /// Validate configuration values that would cause runtime failures.
    ///
    /// Called after TOML deserialization and env-override application to catch
    /// obviously invalid values early instead of failing at arbitrary runtime points.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            anyhow::bail!(
                "default_temperature must be between 0.0 and 2.0 (got {})",
                self.default_temperature
            );
        }
        if self
            .default_provider
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            anyhow::bail!("default_provider must not be empty");
        }

        // Agent
        if self.agent.max_tool_iterations == 0 {
            anyhow::bail!("agent.max_tool_iterations must be greater than 0");
        }

        // Workflow
        if self.workflow.max_steps == 0 {
            anyhow::bail!("workflow.max_steps must be greater than 0");
        }
        if self.workflow.step_timeout_secs == Some(0) {
            anyhow::bail!("workflow.step_timeout_secs must be greater than 0 when set");
        }

        // Observability
        match self.observability.runtime_trace_mode.trim() {
            "none" | "rolling" | "full" => {}
            other => anyhow::bail!(
                "observability.runtime_trace_mode must be one of none, rolling, full (got {other})"
            ),
        }
        if self.observability.runtime_trace_mode.trim() == "rolling"
            && self.observability.runtime_trace_max_entries == 0
        {
            anyhow::bail!("observability.runtime_trace_max_entries must be greater than 0");
        }

        // Sessions
        if self.sessions.dir.trim().is_empty() {
            anyhow::bail!("sessions.dir must not be empty");
        }

        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // API Key: AGENTRELAY_API_KEY or API_KEY (generic)
        if let Ok(key) = std::env::var("AGENTRELAY_API_KEY").or_else(|_| std::env::var("API_KEY"))
        {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }

        if let Ok(provider) = std::env::var("AGENTRELAY_PROVIDER") {
            if !provider.is_empty() {
                self.default_provider = Some(provider);
            }
        }

        if let Ok(model) = std::env::var("AGENTRELAY_MODEL") {
            if !model.is_empty() {
                self.default_model = Some(model);
            }
        }

        if let Ok(url) = std::env::var("AGENTRELAY_API_URL") {
            if !url.is_empty() {
                self.api_url = Some(url);
            }
        }

        // Temperature: ignored when out of range
        if let Ok(temp_str) = std::env::var("AGENTRELAY_TEMPERATURE") {
            if let Ok(temp) = temp_str.parse::<f64>() {
                if (0.0..=2.0).contains(&temp) {
                    self.default_temperature = temp;
                }
            }
        }

        if let Ok(steps) = std::env::var("AGENTRELAY_MAX_STEPS") {
            if let Ok(steps) = steps.trim().parse::<usize>() {
                if steps > 0 {
                    self.workflow.max_steps = steps;
                }
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        let backup_path = parent_dir.join(format!("{file_name}.bak"));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        let had_existing_config = self.config_path.exists();
        if had_existing_config {
            fs::copy(&self.config_path, &backup_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create config backup before atomic replace: {}",
                        backup_path.display()
                    )
                })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if had_existing_config && backup_path.exists() {
                fs::copy(&backup_path, &self.config_path)
                    .await
                    .context("Failed to restore config backup")?;
            }
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;

        if had_existing_config {
            let _ = fs::remove_file(&backup_path).await;
        }

        Ok(())
    }
}

pub(crate) async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.default_provider.as_deref(), Some("openai"));
        assert_eq!(c.model_name(), "gpt-4o-mini");
        assert!((c.default_temperature - 0.7).abs() < f64::EPSILON);
        assert!(c.api_key.is_none());
        assert_eq!(c.workflow.max_steps, 10);
        assert_eq!(c.agent.max_tool_iterations, 10);
        assert!(c.config_path.to_string_lossy().contains("config.toml"));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn config_schema_export_contains_expected_contract_shape() {
        let schema = schemars::schema_for!(Config);
        let schema_json = serde_json::to_value(&schema).expect("schema should serialize to json");

        let properties = schema_json
            .get("properties")
            .and_then(serde_json::Value::as_object)
            .expect("schema should expose top-level properties");

        assert!(properties.contains_key("default_provider"));
        assert!(properties.contains_key("workflow"));
        assert!(properties.contains_key("sessions"));
        assert!(!properties.contains_key("config_path"));
    }

    // ── Serde ────────────────────────────────────────────────

    #[test]
    fn minimal_toml_fills_section_defaults() {
        let config: Config = toml::from_str(
            r#"
default_provider = "ollama"
default_model = "llama3.2"
default_temperature = 0.2

[workflow]
max_steps = 4
"#,
        )
        .unwrap();

        assert_eq!(config.provider_name(), "ollama");
        assert_eq!(config.workflow.max_steps, 4);
        assert!(config.workflow.step_timeout_secs.is_none());
        assert!(config.agent.stream);
        assert_eq!(config.observability.runtime_trace_mode, "none");
        assert_eq!(config.sessions.dir, "sessions");
    }

    // ── Validation ───────────────────────────────────────────

    #[test]
    fn validate_rejects_zero_max_steps() {
        let mut config = Config::default();
        config.workflow.max_steps = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("workflow.max_steps"));
    }

    #[test]
    fn validate_rejects_unknown_trace_mode() {
        let mut config = Config::default();
        config.observability.runtime_trace_mode = "verbose".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let mut config = Config::default();
        config.default_temperature = 3.5;
        assert!(config.validate().is_err());
    }

    // ── Env overrides ────────────────────────────────────────

    #[test]
    fn env_overrides_apply_and_ignore_invalid_values() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("AGENTRELAY_MODEL", "gpt-4.1");
        std::env::set_var("AGENTRELAY_MAX_STEPS", "3");
        std::env::set_var("AGENTRELAY_TEMPERATURE", "9.0");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("AGENTRELAY_MODEL");
        std::env::remove_var("AGENTRELAY_MAX_STEPS");
        std::env::remove_var("AGENTRELAY_TEMPERATURE");

        assert_eq!(config.model_name(), "gpt-4.1");
        assert_eq!(config.workflow.max_steps, 3);
        assert!((config.default_temperature - 0.7).abs() < f64::EPSILON);
    }

    // ── Paths ────────────────────────────────────────────────

    #[test]
    fn relative_paths_resolve_under_config_dir() {
        let mut config = Config::default();
        config.config_path = PathBuf::from("/srv/agentrelay/config.toml");
        assert_eq!(
            config.sessions_dir(),
            PathBuf::from("/srv/agentrelay/sessions")
        );
        config.observability.runtime_trace_path = "/var/log/trace.jsonl".into();
        assert_eq!(
            config.runtime_trace_path(),
            PathBuf::from("/var/log/trace.jsonl")
        );
    }

    // ── Load / save ──────────────────────────────────────────

    #[tokio::test]
    async fn load_or_init_creates_default_file() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_or_init_in(Some(tmp.path())).await.unwrap();

        assert_eq!(config.config_path, tmp.path().join("config.toml"));
        assert!(config.config_path.exists());
        let on_disk = std::fs::read_to_string(&config.config_path).unwrap();
        assert!(on_disk.contains("default_provider"));
    }

    #[tokio::test]
    async fn save_then_load_preserves_values() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.config_path = tmp.path().join("config.toml");
        config.default_provider = Some("foundry-local".into());
        config.workflow.step_timeout_secs = Some(45);
        config.save().await.unwrap();
        // Second save replaces the file atomically and cleans the backup.
        config.save().await.unwrap();
        assert!(!tmp.path().join("config.toml.bak").exists());

        let loaded = Config::load_or_init_in(Some(tmp.path())).await.unwrap();
        assert_eq!(loaded.workflow.step_timeout_secs, Some(45));
        assert_eq!(loaded.config_dir(), tmp.path());
    }

    #[tokio::test]
    async fn load_rejects_invalid_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "default_temperature = 0.7\n[workflow]\nmax_steps = 0\n",
        )
        .unwrap();
        assert!(Config::load_or_init_in(Some(tmp.path())).await.is_err());
    }
}
