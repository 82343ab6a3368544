//! Configuration management for librarian
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Content storage locations
    #[serde(default)]
    pub content: ContentConfig,

    /// Archive index behaviour
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Disk-space cleanup
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Content domain resolution
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Content storage configuration
///
/// Relative directories are resolved against the base directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    #[serde(default = "default_spool_dir")]
    pub spool_dir: String,

    #[serde(default = "default_covers_dir")]
    pub covers_dir: String,

    /// Name of the metadata JSON file inside each zipball
    #[serde(default = "default_metadata_filename")]
    pub metadata: String,
}

/// Archive index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Search ordering; a leading '-' sorts descending
    #[serde(default = "default_search_order")]
    pub search_order: Vec<String>,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

/// Cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Free space that should remain available on the content volume
    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,
}

/// Content domain resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_root_url")]
    pub root_url: String,

    /// Inclusive (start, end) IPv4 range of access-point clients
    #[serde(default = "default_client_ip_range")]
    pub client_ip_range: (String, String),
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for librarian data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,

    /// Path to the first-run setup file
    pub setup_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content: ContentConfig::default(),
            archive: ArchiveConfig::default(),
            cleanup: CleanupConfig::default(),
            resolver: ResolverConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            spool_dir: default_spool_dir(),
            covers_dir: default_covers_dir(),
            metadata: default_metadata_filename(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            search_order: default_search_order(),
            page_size: default_page_size(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            min_free_bytes: default_min_free_bytes(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            root_url: default_root_url(),
            client_ip_range: default_client_ip_range(),
        }
    }
}

impl Config {
    /// Get the default base directory for librarian (~/.librarian)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".librarian")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    fn paths_for(base: PathBuf, config_file: PathBuf) -> PathsConfig {
        PathsConfig {
            config_file,
            db_file: base.join("librarian.db"),
            setup_file: base.join("setup.json"),
            base_dir: base,
        }
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        let config_file = base.join("config.toml");
        self.paths = Self::paths_for(base, config_file);
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = Self::paths_for(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    fn resolve_dir(&self, dir: &str) -> PathBuf {
        let path = Path::new(dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.paths.base_dir.join(path)
        }
    }

    /// Directory holding indexed zipballs
    pub fn content_dir(&self) -> PathBuf {
        self.resolve_dir(&self.content.content_dir)
    }

    /// Directory where downloads are spooled before indexing
    pub fn spool_dir(&self) -> PathBuf {
        self.resolve_dir(&self.content.spool_dir)
    }

    /// Directory of cached cover images
    pub fn covers_dir(&self) -> PathBuf {
        self.resolve_dir(&self.content.covers_dir)
    }

    /// Create the content, spool and covers directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.content_dir(), self.spool_dir(), self.covers_dir()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Check if librarian is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.content.metadata.trim().is_empty() {
            return Err(Error::Config(
                "content.metadata must name a file".to_string(),
            ));
        }

        if self.archive.search_order.is_empty() {
            return Err(Error::Config(
                "archive.search_order must not be empty".to_string(),
            ));
        }

        crate::archive::order_clause(&self.archive.search_order)?;

        if self.archive.page_size == 0 {
            return Err(Error::Config(
                "archive.page_size must be positive".to_string(),
            ));
        }

        url::Url::parse(&self.resolver.root_url)?;

        let (start, end) = &self.resolver.client_ip_range;
        crate::resolver::Ipv4Range::parse(start, end)?;

        Ok(())
    }
}
