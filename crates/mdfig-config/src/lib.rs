//! Configuration management for mdfig.
//!
//! Parses `mdfig.toml` with serde and discovers it in the current directory
//! or any parent. Values from the command line are applied on top through
//! [`CliSettings`].
//!
//! ```toml
//! [render]
//! kroki_url = "${KROKI_URL:-https://kroki.io}"
//! dpi = 192
//! format = "svg"
//! theme = "default"
//! background = "transparent"
//!
//! [pool]
//! max_sessions = 4
//! render_timeout_secs = 30
//! max_failures_before_retire = 3
//!
//! [cache]
//! max_entries = 500
//!
//! [output]
//! dir = "diagrams"
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `render.kroki_url` supports `${VAR}` (error if unset) and
//! `${VAR:-default}`.

mod expand;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mdfig_render::{
    Background, ImageFormat, PoolConfig, RenderOptions, SizePolicy, Theme, DEFAULT_DPI,
    DEFAULT_MAX_FAILURES_BEFORE_RETIRE, DEFAULT_MAX_SESSIONS, DEFAULT_RENDER_TIMEOUT,
};
use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "mdfig.toml";

/// Public Kroki instance used when nothing else is configured.
const DEFAULT_KROKI_URL: &str = "https://kroki.io";

const MAX_DPI: u32 = 1000;

/// CLI settings that override configuration file values.
///
/// Only `Some` values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    pub kroki_url: Option<String>,
    pub dpi: Option<u32>,
    pub format: Option<String>,
    pub theme: Option<String>,
    pub max_sessions: Option<usize>,
    pub render_timeout_secs: Option<u64>,
    pub output_dir: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub pool: PoolSection,
    pub cache: CacheConfig,
    output: OutputConfigRaw,

    /// Resolved output directory (set after loading).
    #[serde(skip)]
    pub output_dir: PathBuf,
    /// Path to the config file, if one was loaded.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// `[render]` section. Option values are kept as strings until
/// [`Config::render_options`] parses them.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub kroki_url: String,
    pub dpi: u32,
    /// Fixed output size; both must be set together.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: String,
    pub theme: String,
    pub background: String,
    /// HTTP timeout for a single request to the engine.
    pub request_timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            kroki_url: DEFAULT_KROKI_URL.to_owned(),
            dpi: DEFAULT_DPI,
            width: None,
            height: None,
            format: ImageFormat::default().as_str().to_owned(),
            theme: Theme::default().as_str().to_owned(),
            background: Background::default().as_engine_value().to_owned(),
            request_timeout_secs: DEFAULT_RENDER_TIMEOUT.as_secs(),
        }
    }
}

/// `[pool]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub max_sessions: usize,
    pub render_timeout_secs: u64,
    pub max_failures_before_retire: u32,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            render_timeout_secs: DEFAULT_RENDER_TIMEOUT.as_secs(),
            max_failures_before_retire: DEFAULT_MAX_FAILURES_BEFORE_RETIRE,
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached images. Unset or 0 means unbounded.
    pub max_entries: Option<usize>,
}

impl CacheConfig {
    #[must_use]
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.max_entries.and_then(NonZeroUsize::new)
    }
}

/// Raw `[output]` section (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct OutputConfigRaw {
    dir: Option<String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar { field: String, message: String },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn parse_field<T>(
    value: &str,
    field: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ConfigError> {
    parse(value)
        .ok_or_else(|| ConfigError::Validation(format!("{field}: invalid value '{value}'")))
}

impl Config {
    /// Load configuration with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `mdfig.toml` in the current directory and its parents, falling back
    /// to defaults. CLI settings are applied last and the result is
    /// validated.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit `config_path` doesn't exist, parsing or
    /// expansion fails, or the final values are invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let discovered = match config_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Some(path) => Some(path.to_path_buf()),
            None => std::env::current_dir()
                .ok()
                .and_then(|cwd| Self::discover_from(&cwd)),
        };

        let mut config = match discovered {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default_with_cwd(),
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }
        config.validate()?;

        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(kroki_url) = &settings.kroki_url {
            self.render.kroki_url.clone_from(kroki_url);
        }
        if let Some(dpi) = settings.dpi {
            self.render.dpi = dpi;
        }
        if let Some(format) = &settings.format {
            self.render.format.clone_from(format);
        }
        if let Some(theme) = &settings.theme {
            self.render.theme.clone_from(theme);
        }
        if let Some(max_sessions) = settings.max_sessions {
            self.pool.max_sessions = max_sessions;
        }
        if let Some(secs) = settings.render_timeout_secs {
            self.pool.render_timeout_secs = secs;
        }
        if let Some(output_dir) = &settings.output_dir {
            self.output_dir.clone_from(output_dir);
        }
    }

    /// Search for the config file in `start` and its parents.
    fn discover_from(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILENAME))
            .find(|candidate| candidate.is_file())
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            render: RenderConfig::default(),
            pool: PoolSection::default(),
            cache: CacheConfig::default(),
            output: OutputConfigRaw::default(),
            output_dir: base.join("diagrams"),
            config_path: None,
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.render.kroki_url =
            expand::expand_env(&config.render.kroki_url, "render.kroki_url")?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Resolve relative paths against the config file's directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.output_dir = config_dir.join(self.output.dir.as_deref().unwrap_or("diagrams"));
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.render.kroki_url, "render.kroki_url")?;
        require_http_url(&self.render.kroki_url, "render.kroki_url")?;
        if self.render.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "render.request_timeout_secs must be greater than 0".to_owned(),
            ));
        }
        self.render_options()?;
        self.pool_config()?;
        Ok(())
    }

    /// Default render options for every diagram.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for unknown format, theme, or
    /// background values, an out-of-range DPI, or an incomplete fixed size.
    pub fn render_options(&self) -> Result<RenderOptions, ConfigError> {
        let render = &self.render;
        let size = match (render.width, render.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => {
                SizePolicy::Fixed { width, height }
            }
            (None, None) => {
                if render.dpi == 0 || render.dpi > MAX_DPI {
                    return Err(ConfigError::Validation(format!(
                        "render.dpi must be between 1 and {MAX_DPI}"
                    )));
                }
                SizePolicy::Dpi(render.dpi)
            }
            _ => {
                return Err(ConfigError::Validation(
                    "render.width and render.height must both be set and non-zero".to_owned(),
                ));
            }
        };

        Ok(RenderOptions {
            format: parse_field(&render.format, "render.format", ImageFormat::parse)?,
            theme: parse_field(&render.theme, "render.theme", Theme::parse)?,
            size,
            background: parse_field(&render.background, "render.background", Background::parse)?,
        })
    }

    /// Session pool settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the pool settings are invalid.
    pub fn pool_config(&self) -> Result<PoolConfig, ConfigError> {
        let config = PoolConfig {
            max_sessions: self.pool.max_sessions,
            render_timeout: Duration::from_secs(self.pool.render_timeout_secs),
            max_failures_before_retire: self.pool.max_failures_before_retire,
        };
        config
            .validate()
            .map_err(|e| ConfigError::Validation(format!("pool: {e}")))?;
        Ok(config)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.render.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));

        assert_eq!(config.render.kroki_url, "https://kroki.io");
        assert_eq!(config.output_dir, PathBuf::from("/test/diagrams"));
        assert_eq!(config.render_options().unwrap(), RenderOptions::default());
        assert_eq!(config.pool_config().unwrap(), PoolConfig::default());
        assert!(config.cache.capacity().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[render]
kroki_url = "http://localhost:8000"
dpi = 144
format = "png"
theme = "dark"
background = "white"

[pool]
max_sessions = 2
render_timeout_secs = 10
max_failures_before_retire = 5

[cache]
max_entries = 100
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.render_options().unwrap(),
            RenderOptions {
                format: ImageFormat::Png,
                theme: Theme::Dark,
                size: SizePolicy::Dpi(144),
                background: Background::White,
            }
        );
        assert_eq!(
            config.pool_config().unwrap(),
            PoolConfig {
                max_sessions: 2,
                render_timeout: Duration::from_secs(10),
                max_failures_before_retire: 5,
            }
        );
        assert_eq!(config.cache.capacity(), NonZeroUsize::new(100));
    }

    #[test]
    fn test_zero_max_entries_is_unbounded() {
        let config: Config = toml::from_str("[cache]\nmax_entries = 0\n").unwrap();
        assert!(config.cache.capacity().is_none());
    }

    #[test]
    fn test_fixed_size() {
        let config: Config = toml::from_str("[render]\nwidth = 800\nheight = 600\n").unwrap();
        assert_eq!(
            config.render_options().unwrap().size,
            SizePolicy::Fixed {
                width: 800,
                height: 600
            }
        );

        let half: Config = toml::from_str("[render]\nwidth = 800\n").unwrap();
        assert!(half.render_options().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            ("[render]\nkroki_url = \"\"\n", "render.kroki_url"),
            ("[render]\nkroki_url = \"ftp://kroki\"\n", "render.kroki_url"),
            ("[render]\ndpi = 0\n", "render.dpi"),
            ("[render]\ndpi = 5000\n", "render.dpi"),
            ("[render]\nformat = \"gif\"\n", "render.format"),
            ("[render]\ntheme = \"solarized\"\n", "render.theme"),
            ("[pool]\nmax_sessions = 0\n", "max_sessions"),
            ("[pool]\nrender_timeout_secs = 0\n", "render_timeout"),
        ];

        for (toml, field) in cases {
            let config: Config = toml::from_str(toml).unwrap();
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::Validation(_)),
                "expected validation error for {toml:?}, got {err:?}"
            );
            assert!(err.to_string().contains(field), "{err} should mention {field}");
        }
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            kroki_url: Some("http://kroki:8000".to_owned()),
            format: Some("png".to_owned()),
            max_sessions: Some(8),
            output_dir: Some(PathBuf::from("/out")),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.render.kroki_url, "http://kroki:8000");
        assert_eq!(config.render_options().unwrap().format, ImageFormat::Png);
        assert_eq!(config.pool.max_sessions, 8);
        assert_eq!(config.output_dir, PathBuf::from("/out"));
        assert_eq!(config.render.dpi, 192);
    }

    #[test]
    fn test_apply_empty_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.apply_cli_settings(&CliSettings::default());

        assert_eq!(config.render.kroki_url, "https://kroki.io");
        assert_eq!(config.output_dir, PathBuf::from("/test/diagrams"));
    }

    #[test]
    fn test_load_resolves_output_dir_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[output]\ndir = \"build/img\"\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.output_dir, dir.path().join("build/img"));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/mdfig.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_applies_cli_after_file_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[pool]\nmax_sessions = 2\n").unwrap();

        let overrides = CliSettings {
            max_sessions: Some(6),
            ..Default::default()
        };
        let config = Config::load(Some(&path), Some(&overrides)).unwrap();
        assert_eq!(config.pool.max_sessions, 6);

        let invalid = CliSettings {
            theme: Some("neon".to_owned()),
            ..Default::default()
        };
        assert!(Config::load(Some(&path), Some(&invalid)).is_err());
    }

    #[test]
    fn test_load_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[pool\n").unwrap();

        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_expands_kroki_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            "[render]\nkroki_url = \"${MDFIG_TEST_CONFIG_KROKI:-http://fallback:8000}\"\n",
        )
        .unwrap();
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::remove_var("MDFIG_TEST_CONFIG_KROKI");
        }

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.render.kroki_url, "http://fallback:8000");
    }

    #[test]
    fn test_discover_from_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("docs/guide");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "").unwrap();

        assert_eq!(
            Config::discover_from(&nested),
            Some(dir.path().join(CONFIG_FILENAME))
        );
    }

    #[test]
    fn test_discover_prefers_nearest() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("site");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "").unwrap();
        std::fs::write(nested.join(CONFIG_FILENAME), "").unwrap();

        assert_eq!(
            Config::discover_from(&nested),
            Some(nested.join(CONFIG_FILENAME))
        );
    }
}
