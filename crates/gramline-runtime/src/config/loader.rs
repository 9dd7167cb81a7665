//! Layered configuration loading.
//!
//! | Layer | Source |
//! |-------|--------|
//! | 1 | built-in defaults |
//! | 2 | [`ConfigLoader::merge`] |
//! | 3 | `gramline.{profile}.<ext>` |
//! | 4 | `gramline.<ext>` or `config.<ext>` |
//! | 5 | `GRAMLINE_*` environment variables |
//!
//! Later layers win. `<ext>` is `toml` with the default `toml-config`
//! feature and `yaml`/`yml` with `yaml-config`. Files are looked up in the
//! working directory and then in `<config dir>/gramline`; the first
//! directory holding a main file is the only one read.
//!
//! Nested keys in environment variables are separated by `__`:
//!
//! ```text
//! GRAMLINE_BOT__TOKEN=123:abc          bot.token
//! GRAMLINE_POLLING__TIMEOUT_SECS=50    polling.timeout_secs
//! GRAMLINE_LOGGING__LEVEL=debug        logging.level
//! ```
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/gramline.toml")
//!     .load_validated()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::GramlineConfig;
use super::validation::validate_config;

pub const ENV_PREFIX: &str = "GRAMLINE_";

/// Names the active profile when [`ConfigLoader::profile`] is not called.
pub const PROFILE_ENV: &str = "GRAMLINE_PROFILE";

const FILE_STEMS: [&str; 2] = ["gramline", "config"];

// =============================================================================
// Profile
// =============================================================================

/// Selects the `gramline.{profile}.<ext>` overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Case-insensitive; `dev` and `prod` are accepted too.
    pub fn parse(name: &str) -> Self {
        let name = name.to_lowercase();
        match name.as_str() {
            "dev" | "development" => Self::Development,
            "prod" | "production" => Self::Production,
            _ => Self::Custom(name),
        }
    }

    pub fn from_env() -> Self {
        match std::env::var(PROFILE_ENV) {
            Ok(name) => Self::parse(&name),
            Err(_) => Self::default(),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// File formats
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    /// Formats compiled in, in lookup order.
    const ENABLED: &'static [FileFormat] = &[
        #[cfg(feature = "toml-config")]
        FileFormat::Toml,
        #[cfg(feature = "yaml-config")]
        FileFormat::Yaml,
    ];

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ENABLED
            .iter()
            .copied()
            .find(|format| format.extensions().contains(&ext))
    }

    fn layer(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(Yaml::file(path)),
        }
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Builds a [`GramlineConfig`] from defaults, files and the environment.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    explicit_file: Option<PathBuf>,
    read_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Profile from `GRAMLINE_PROFILE`, default search paths, environment on.
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            explicit_file: None,
            read_env: true,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Looks for files in `dir`. Once called, the default directories are
    /// no longer searched.
    pub fn search_path(mut self, dir: impl AsRef<Path>) -> Self {
        self.search_paths.push(dir.as_ref().to_path_buf());
        self
    }

    /// Reads exactly this file instead of searching. It must exist.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.read_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    /// Layers `config` right above the defaults; files and the environment
    /// still override it.
    pub fn merge(mut self, config: GramlineConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads without semantic validation.
    pub fn load(self) -> ConfigResult<GramlineConfig> {
        let profile = self.profile.clone();
        let config: GramlineConfig = self.figment()?.extract()?;
        debug!(
            profile = %profile,
            polling_limit = config.polling.limit,
            log_level = %config.logging.level,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads, then runs [`validate_config`].
    pub fn load_validated(self) -> ConfigResult<GramlineConfig> {
        let config = self.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn figment(mut self) -> ConfigResult<Figment> {
        let overrides = std::mem::take(&mut self.overrides);
        let mut figment =
            Figment::from(Serialized::defaults(GramlineConfig::default())).merge(overrides);

        figment = match &self.explicit_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path.clone()));
                }
                let format = FileFormat::of(path)
                    .ok_or_else(|| ConfigError::UnsupportedFormat { path: path.clone() })?;
                info!(path = %path.display(), "Reading configuration file");
                format.layer(figment, path)
            }
            None => self.searched(figment),
        };

        if self.read_env {
            trace!(prefix = ENV_PREFIX, "Reading environment overrides");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }
        Ok(figment)
    }

    fn directories(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("gramline")))
            .collect()
    }

    /// Layers the profile overlay and main file of the first directory that
    /// has a main file.
    fn searched(&self, mut figment: Figment) -> Figment {
        for dir in self.directories() {
            for format in FileFormat::ENABLED {
                for stem in FILE_STEMS {
                    for ext in format.extensions() {
                        let overlay = dir.join(format!("{stem}.{}.{ext}", self.profile));
                        if overlay.exists() {
                            debug!(path = %overlay.display(), "Reading profile overlay");
                            figment = format.layer(figment, &overlay);
                        }

                        let main = dir.join(format!("{stem}.{ext}"));
                        if main.exists() {
                            info!(path = %main.display(), "Reading configuration file");
                            return format.layer(figment, &main);
                        }
                    }
                }
            }
        }
        warn!("No configuration file found, continuing with defaults");
        figment
    }
}

/// [`ConfigLoader::new`] followed by [`ConfigLoader::load`].
pub fn load_config() -> ConfigResult<GramlineConfig> {
    ConfigLoader::new().load()
}

pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<GramlineConfig> {
    ConfigLoader::new().file(path).load()
}
