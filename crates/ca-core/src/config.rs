use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from `~/.cli-agent/config.json`.
///
/// Every section falls back to its defaults, so a partial file only
/// overrides the keys it names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from the default location. When the file is missing the
    /// defaults are written there first.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Config::default();
            cfg.save_to(&path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg = Self::from_json(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `path`, or return defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize config to a pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        self.validate()?;
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Write the config to `path`.
    ///
    /// The new contents go to a sibling temp file which is then renamed into
    /// place. A previous file is kept as `<path>.bak`.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = self.to_json()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let tmp = sibling(path, "tmp");
        std::fs::write(&tmp, text).map_err(|e| ConfigError::Io(e.to_string()))?;
        if path.exists() {
            std::fs::copy(path, sibling(path, "bak")).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        std::fs::rename(&tmp, path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.execution.validate()?;
        self.buffers.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation("logging.level must not be empty".into()));
        }
        Ok(())
    }

    /// Merge a partial update into this config.
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(view) = update.default_view {
            self.ui.default_view = view;
        }
        if let Some(theme) = update.color_theme {
            self.ui.color_theme = theme;
        }
        if let Some(shortcuts) = update.keyboard_shortcuts {
            self.ui.keyboard_shortcuts.apply(shortcuts);
        }
        if let Some(auto_commit) = update.auto_commit {
            self.execution.auto_commit = auto_commit;
        }
        if let Some(provider) = update.provider {
            self.execution.provider = provider;
        }
        if let Some(n) = update.max_concurrent_executions {
            self.execution.max_concurrent_executions = n;
        }
        if let Some(sim) = update.error_simulation {
            self.execution.error_simulation.apply(&sim);
        }
        if let Some(size) = update.output_buffer_size {
            self.buffers.output_lines = size;
        }
    }

    pub fn reset_to_defaults(&mut self) {
        *self = Config::default();
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cli-agent")
            .join("config.json")
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// UI section
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Overview,
    Issues,
    Execution,
    Logs,
    Config,
    Repl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTheme {
    #[default]
    Default,
    Dark,
    Light,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UiConfig {
    #[serde(default)]
    pub default_view: View,
    #[serde(default)]
    pub color_theme: ColorTheme,
    #[serde(default)]
    pub keyboard_shortcuts: KeyboardShortcuts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardShortcuts {
    #[serde(default = "default_toggle_command_palette")]
    pub toggle_command_palette: String,
    #[serde(default = "default_toggle_help")]
    pub toggle_help: String,
    #[serde(default = "default_navigate_up")]
    pub navigate_up: String,
    #[serde(default = "default_navigate_down")]
    pub navigate_down: String,
    #[serde(default = "default_select")]
    pub select: String,
    #[serde(default = "default_back")]
    pub back: String,
}

impl Default for KeyboardShortcuts {
    fn default() -> Self {
        Self {
            toggle_command_palette: default_toggle_command_palette(),
            toggle_help: default_toggle_help(),
            navigate_up: default_navigate_up(),
            navigate_down: default_navigate_down(),
            select: default_select(),
            back: default_back(),
        }
    }
}

impl KeyboardShortcuts {
    pub fn apply(&mut self, update: KeyboardShortcutsUpdate) {
        let KeyboardShortcutsUpdate {
            toggle_command_palette,
            toggle_help,
            navigate_up,
            navigate_down,
            select,
            back,
        } = update;
        if let Some(v) = toggle_command_palette {
            self.toggle_command_palette = v;
        }
        if let Some(v) = toggle_help {
            self.toggle_help = v;
        }
        if let Some(v) = navigate_up {
            self.navigate_up = v;
        }
        if let Some(v) = navigate_down {
            self.navigate_down = v;
        }
        if let Some(v) = select {
            self.select = v;
        }
        if let Some(v) = back {
            self.back = v;
        }
    }
}

fn default_toggle_command_palette() -> String {
    "ctrl+p".into()
}
fn default_toggle_help() -> String {
    "?".into()
}
fn default_navigate_up() -> String {
    "up".into()
}
fn default_navigate_down() -> String {
    "down".into()
}
fn default_select() -> String {
    "enter".into()
}
fn default_back() -> String {
    "escape".into()
}

// ---------------------------------------------------------------------------
// Execution section
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Anthropic,
    Openai,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub auto_commit: bool,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_executions: usize,
    /// Pause between issue progress steps.
    #[serde(default = "default_issue_step_delay_ms")]
    pub issue_step_delay_ms: u64,
    /// Pause between session task progress steps.
    #[serde(default = "default_task_step_delay_ms")]
    pub task_step_delay_ms: u64,
    /// Pause after each task during auto-execution.
    #[serde(default = "default_inter_task_delay_ms")]
    pub inter_task_delay_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub error_simulation: ErrorSimulationConfig,
    /// Fault injection for session tasks. Disabled unless configured.
    #[serde(default)]
    pub task_error_simulation: ErrorSimulationConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            auto_commit: false,
            provider: Provider::default(),
            max_concurrent_executions: default_max_concurrent(),
            issue_step_delay_ms: default_issue_step_delay_ms(),
            task_step_delay_ms: default_task_step_delay_ms(),
            inter_task_delay_ms: default_inter_task_delay_ms(),
            retry: RetryConfig::default(),
            error_simulation: ErrorSimulationConfig::default(),
            task_error_simulation: ErrorSimulationConfig::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_executions == 0 {
            return Err(ConfigError::Validation(
                "execution.max_concurrent_executions must be at least 1".into(),
            ));
        }
        self.error_simulation.validate("execution.error_simulation")?;
        self.task_error_simulation
            .validate("execution.task_error_simulation")?;
        Ok(())
    }
}

fn default_max_concurrent() -> usize {
    1
}
fn default_issue_step_delay_ms() -> u64 {
    100
}
fn default_task_step_delay_ms() -> u64 {
    200
}
fn default_inter_task_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    500
}

/// Synthetic fault injection applied at each progress step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSimulationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_probability")]
    pub probability: f64,
    #[serde(default = "default_min_progress")]
    pub min_progress_before_error: u8,
}

impl Default for ErrorSimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            probability: default_probability(),
            min_progress_before_error: default_min_progress(),
        }
    }
}

impl ErrorSimulationConfig {
    /// Whether a fault fires at `progress` given a uniform draw in `[0, 1)`.
    pub fn should_fail(&self, progress: u8, draw: f64) -> bool {
        self.enabled && draw < self.probability && progress >= self.min_progress_before_error
    }

    /// Merge a partial update. Probability is clamped into `[0, 1]`.
    pub fn apply(&mut self, update: &ErrorSimulationUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(p) = update.probability {
            self.probability = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        }
        if let Some(min) = update.min_progress_before_error {
            self.min_progress_before_error = min.min(100);
        }
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(ConfigError::Validation(format!(
                "{section}.probability must be within [0, 1], got {}",
                self.probability
            )));
        }
        if self.min_progress_before_error > 100 {
            return Err(ConfigError::Validation(format!(
                "{section}.min_progress_before_error must be at most 100"
            )));
        }
        Ok(())
    }
}

fn default_probability() -> f64 {
    0.1
}
fn default_min_progress() -> u8 {
    20
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorSimulationUpdate {
    pub enabled: Option<bool>,
    pub probability: Option<f64>,
    pub min_progress_before_error: Option<u8>,
}

impl ErrorSimulationUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    /// Enabled, always firing once `min_progress` is reached.
    pub fn always_fail(min_progress: u8) -> Self {
        Self {
            enabled: Some(true),
            probability: Some(1.0),
            min_progress_before_error: Some(min_progress),
        }
    }
}

// ---------------------------------------------------------------------------
// Buffers & logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_output_lines")]
    pub output_lines: usize,
    #[serde(default = "default_task_events")]
    pub task_events: usize,
    #[serde(default = "default_repl_outputs")]
    pub repl_outputs: usize,
    #[serde(default = "default_streaming_updates")]
    pub streaming_updates: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            output_lines: default_output_lines(),
            task_events: default_task_events(),
            repl_outputs: default_repl_outputs(),
            streaming_updates: default_streaming_updates(),
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("output_lines", self.output_lines),
            ("task_events", self.task_events),
            ("repl_outputs", self.repl_outputs),
            ("streaming_updates", self.streaming_updates),
        ];
        for (name, size) in sizes {
            if size == 0 {
                return Err(ConfigError::Validation(format!(
                    "buffers.{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

fn default_output_lines() -> usize {
    1000
}
fn default_task_events() -> usize {
    10_000
}
fn default_repl_outputs() -> usize {
    5000
}
fn default_streaming_updates() -> usize {
    10_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily error log. Relative paths resolve against
    /// the working directory.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            log_dir: default_log_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_dir() -> String {
    "logs".into()
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyboardShortcutsUpdate {
    pub toggle_command_palette: Option<String>,
    pub toggle_help: Option<String>,
    pub navigate_up: Option<String>,
    pub navigate_down: Option<String>,
    pub select: Option<String>,
    pub back: Option<String>,
}

/// Partial configuration update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    pub default_view: Option<View>,
    pub color_theme: Option<ColorTheme>,
    pub keyboard_shortcuts: Option<KeyboardShortcutsUpdate>,
    pub auto_commit: Option<bool>,
    pub provider: Option<Provider>,
    pub max_concurrent_executions: Option<usize>,
    pub output_buffer_size: Option<usize>,
    pub error_simulation: Option<ErrorSimulationUpdate>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
