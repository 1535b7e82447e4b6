//! Configuration loading and working-root resolution
//!
//! Bootstrap configuration comes from a single optional TOML file. Values are
//! resolved with the following priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: a warning is logged and compiled
//! defaults are used so the service can always start.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the TOML config file location
pub const CONFIG_ENV_VAR: &str = "LINGUAFLOW_CONFIG";

/// Environment variable overriding the working root
pub const WORK_ROOT_ENV_VAR: &str = "LINGUAFLOW_WORK_ROOT";

/// Valid values for `logging.level`
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional; anything left out falls back to
/// [`CompiledDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Parent directory for per-import working directories
    #[serde(default)]
    pub work_root: Option<PathBuf>,

    /// HTTP bind address
    #[serde(default)]
    pub host: Option<String>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Import pipeline behaviour
    #[serde(default)]
    pub import: ImportConfig,

    /// Cross-origin settings for the browser front end
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Import pipeline configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Skip notes that fail to process instead of aborting the whole import
    #[serde(default)]
    pub skip_failed_notes: bool,

    /// Largest accepted upload, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            skip_failed_notes: false,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CorsConfig {
    /// Origins allowed to call the API from a browser
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:3001".to_string(),
        "http://localhost:3003".to_string(),
    ]
}

/// Compiled defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub work_root: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    /// Defaults for the platform the binary was built for
    pub fn for_current_platform() -> Self {
        Self {
            work_root: std::env::temp_dir().join("linguaflow-import"),
            host: "127.0.0.1".to_string(),
            port: 8100,
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Default TOML location for a module
///
/// `$LINGUAFLOW_CONFIG` wins; otherwise `<config_dir>/linguaflow/<module>.toml`.
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("linguaflow").join(format!("{}.toml", module_name)))
}

/// Load bootstrap configuration
///
/// Missing file → warning + defaults. Unreadable or malformed file → error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using compiled defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    validate_config(&config)?;
    info!("Loaded configuration from {}", path.display());

    Ok(config)
}

/// Check value ranges that serde cannot express
pub fn validate_config(config: &TomlConfig) -> Result<()> {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(Error::InvalidInput(format!(
            "logging.level must be one of {}, got '{}'",
            LOG_LEVELS.join(", "),
            config.logging.level
        )));
    }

    if config.import.max_upload_bytes == 0 {
        return Err(Error::InvalidInput(
            "import.max_upload_bytes must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Working-root resolution
///
/// Priority: CLI argument → `LINGUAFLOW_WORK_ROOT` → TOML `work_root` →
/// compiled default.
pub struct WorkRootResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_work_root: Option<PathBuf>,
}

impl WorkRootResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_work_root: None,
        }
    }

    /// Command-line override (highest priority)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Value from the loaded TOML file
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_work_root = config.work_root.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(module = %self.module_name, "Work root from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(WORK_ROOT_ENV_VAR) {
            if !path.trim().is_empty() {
                debug!(module = %self.module_name, "Work root from {}", WORK_ROOT_ENV_VAR);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_work_root {
            debug!(module = %self.module_name, "Work root from TOML config");
            return path.clone();
        }

        debug!(module = %self.module_name, "Work root from compiled default");
        CompiledDefaults::for_current_platform().work_root
    }
}

/// Values supplied on the command line (or via clap `env` fallbacks)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub work_root: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub work_root: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub skip_failed_notes: bool,
    pub max_upload_bytes: usize,
    pub allowed_origins: Vec<String>,
}

impl ServiceConfig {
    /// Merge command-line overrides, TOML values and compiled defaults
    pub fn resolve(module_name: &str, cli: CliOverrides, toml: TomlConfig) -> Self {
        let defaults = CompiledDefaults::for_current_platform();

        let work_root = WorkRootResolver::new(module_name)
            .with_cli_arg(cli.work_root)
            .with_toml(&toml)
            .resolve();

        Self {
            work_root,
            host: cli.host.or(toml.host).unwrap_or(defaults.host),
            port: cli.port.or(toml.port).unwrap_or(defaults.port),
            log_level: cli.log_level.unwrap_or(toml.logging.level),
            log_file: toml.logging.file.or(defaults.log_file),
            skip_failed_notes: toml.import.skip_failed_notes,
            max_upload_bytes: toml.import.max_upload_bytes,
            allowed_origins: toml.cors.allowed_origins,
        }
    }

    /// `host:port` string for binding the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
