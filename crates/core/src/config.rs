//! Configuration management for promptloom.
//!
//! Configuration is merged from several sources, lowest precedence first:
//! - Built-in defaults
//! - Config file (`.loom/config.yaml`, or the path in `LOOM_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric; rule profiles and sessions are
//! resolved relative to the workspace root.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .loom/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Prompt assembly defaults
    pub assembly: AssemblyConfig,

    /// Transformation pipeline settings
    pub transform: TransformConfig,
}

/// Prompt assembly defaults from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyConfig {
    /// Free-form mode name exposed as `{{mode}}`
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Use the chat-mode segment ordering
    #[serde(default)]
    pub chat_mode: bool,

    /// Use the developer-mode segment ordering
    #[serde(default)]
    pub developer_mode: bool,

    /// Keep only the first N ordered segments
    #[serde(default)]
    pub max_segments: Option<usize>,

    /// Render dynamic segments as short bullet summaries
    #[serde(default)]
    pub summary_only: bool,

    /// Append a trailer reporting the rendered segment count
    #[serde(default)]
    pub debug: bool,

    /// Feature toggles
    #[serde(default)]
    pub include: IncludeConfig,
}

/// Per-feature inclusion toggles. Everything defaults to included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeConfig {
    #[serde(default = "default_true")]
    pub user_avatar: bool,
    #[serde(default = "default_true")]
    pub tool_definitions: bool,
    #[serde(default = "default_true")]
    pub world_book: bool,
    #[serde(default = "default_true")]
    pub mcp: bool,
    #[serde(default = "default_true")]
    pub memory: bool,
    #[serde(default = "default_true")]
    pub variable_state: bool,
}

/// Transformation pipeline settings from config.yaml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Whether the rewrite pipeline is switched on
    #[serde(default)]
    pub enabled: bool,

    /// Path to the base rule profile (YAML)
    #[serde(default)]
    pub profile: Option<PathBuf>,

    /// Path to a mixin overlaid on the profile (YAML)
    #[serde(default)]
    pub mixin: Option<PathBuf>,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    assembly: Option<AssemblyConfig>,
    transform: Option<TransformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

fn default_true() -> bool {
    true
}

fn default_mode() -> String {
    "chat".to_string()
}

impl Default for IncludeConfig {
    fn default() -> Self {
        Self {
            user_avatar: true,
            tool_definitions: true,
            world_book: true,
            mcp: true,
            memory: true,
            variable_state: true,
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            chat_mode: false,
            developer_mode: false,
            max_segments: None,
            summary_only: false,
            debug: false,
            include: IncludeConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            assembly: AssemblyConfig::default(),
            transform: TransformConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and environment.
    ///
    /// Environment variables:
    /// - `LOOM_WORKSPACE`: Override workspace path
    /// - `LOOM_CONFIG`: Path to config file
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`AppConfig::load`], but `workspace` and `config_file` win over
    /// the environment. The config file is read once, from the resolved
    /// location, so nothing leaks in from the current directory.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) =
            workspace.or_else(|| std::env::var("LOOM_WORKSPACE").ok().map(PathBuf::from))
        {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("LOOM_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.loom_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(assembly) = config_file.assembly {
            result.assembly = assembly;
        }

        if let Some(transform) = config_file.transform {
            result.transform = transform;
        }

        tracing::debug!("Merged config file {:?}", path);

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over the environment and file.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .loom directory.
    pub fn loom_dir(&self) -> PathBuf {
        self.workspace.join(".loom")
    }

    /// Directory scanned for rule profiles.
    pub fn profiles_dir(&self) -> PathBuf {
        self.loom_dir().join("profiles")
    }

    /// Resolve a possibly relative path against the workspace root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Validate the assembly and transform settings.
    pub fn validate(&self) -> AppResult<()> {
        if self.assembly.chat_mode && self.assembly.developer_mode {
            tracing::warn!("Both chatMode and developerMode are set; chat ordering wins");
        }

        if self.transform.enabled
            && self.transform.profile.is_none()
            && self.transform.mixin.is_none()
        {
            return Err(AppError::Config(
                "transform.enabled is set but neither transform.profile nor transform.mixin is configured"
                    .to_string(),
            ));
        }

        Ok(())
    }
}
