// Configuration module for seasonal-streams
// Handles XDG-compliant directory paths and TOML configuration file

use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::jikan::JIKAN_API_BASE;
use crate::services::kitsu::KITSU_API_BASE;
use crate::services::watchmode::WATCHMODE_API_BASE;

const APP_NAME: &str = "seasonal-streams";
const CONFIG_FILENAME: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Server configuration
    pub server: ServerConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// External API endpoints, keys and pacing
    pub sources: SourcesConfig,

    /// Response cache configuration
    pub cache: CacheConfig,

    /// Streaming resolution configuration
    pub resolver: ResolverConfig,

    /// Seasonal enrichment configuration
    pub aggregator: AggregatorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port (default: 8787)
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override data directory (cache database location)
    pub data_dir: Option<PathBuf>,

    /// Override cache directory
    pub cache_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub jikan_base_url: String,
    pub kitsu_base_url: String,
    pub watchmode_base_url: String,

    /// WatchMode API key (optional, enables the secondary streaming source)
    pub watchmode_api_key: Option<String>,

    /// Region passed to WatchMode source lookups (default: US)
    pub watchmode_region: String,

    /// Minimum delay between Jikan requests in ms (default: 1000)
    pub jikan_delay_ms: u64,

    /// Minimum delay between Kitsu requests in ms (default: 500)
    pub kitsu_delay_ms: u64,

    /// Minimum delay between WatchMode requests in ms (default: 1000)
    pub watchmode_delay_ms: u64,

    /// Per-request HTTP timeout in seconds (default: 10)
    pub request_timeout_secs: u64,

    /// Maximum listing pages fetched per season (default: 5)
    pub max_listing_pages: u32,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            jikan_base_url: JIKAN_API_BASE.to_string(),
            kitsu_base_url: KITSU_API_BASE.to_string(),
            watchmode_base_url: WATCHMODE_API_BASE.to_string(),
            watchmode_api_key: None,
            watchmode_region: "US".to_string(),
            jikan_delay_ms: 1000,
            kitsu_delay_ms: 500,
            watchmode_delay_ms: 1000,
            request_timeout_secs: 10,
            max_listing_pages: 5,
        }
    }
}

impl SourcesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Storage engine behind the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown cache backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// "sqlite" (default) or "memory"
    pub backend: CacheBackendKind,

    /// Default entry lifetime in hours (default: 48)
    pub ttl_hours: u64,

    /// Entries written under another version are treated as misses
    pub version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Sqlite,
            ttl_hours: 48,
            version: "1.0.0".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Candidate titles tried per source (default: 6)
    pub max_candidates: usize,

    /// Also search mechanical title variants (default: false)
    /// Multiplies API calls for anime that are not found
    pub expand_variations: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_candidates: 6,
            expand_variations: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Streaming resolutions in flight at once (default: 10)
    pub max_concurrent: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

/// Application paths following XDG Base Directory Specification on Unix
/// On other platforms, falls back to the current directory or platform-specific locations
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for configuration files (config.toml)
    /// XDG: $XDG_CONFIG_HOME/seasonal-streams or ~/.config/seasonal-streams
    pub config_dir: PathBuf,

    /// Directory for persistent data (cache database)
    /// XDG: $XDG_DATA_HOME/seasonal-streams or ~/.local/share/seasonal-streams
    pub data_dir: PathBuf,

    /// Directory for scratch files
    /// XDG: $XDG_CACHE_HOME/seasonal-streams or ~/.cache/seasonal-streams
    pub cache_dir: PathBuf,
}

impl AppPaths {
    /// Create application paths using XDG directories (or fallbacks)
    ///
    /// Priority order:
    /// 1. Environment variables (SEASONAL_STREAMS_CONFIG_DIR, _DATA_DIR, _CACHE_DIR)
    /// 2. Config file overrides
    /// 3. XDG directories (Linux/Unix)
    /// 4. Platform-specific directories (macOS, Windows)
    /// 5. Current directory fallback
    pub fn new(config_overrides: &PathsConfig) -> Self {
        Self {
            config_dir: Self::resolve_dir(
                "SEASONAL_STREAMS_CONFIG_DIR",
                &config_overrides.config_dir,
                dirs::config_dir(),
                None,
            ),
            data_dir: Self::resolve_dir(
                "SEASONAL_STREAMS_DATA_DIR",
                &config_overrides.data_dir,
                dirs::data_dir(),
                None,
            ),
            cache_dir: Self::resolve_dir(
                "SEASONAL_STREAMS_CACHE_DIR",
                &config_overrides.cache_dir,
                dirs::cache_dir(),
                Some("cache"),
            ),
        }
    }

    /// Create application paths using current directory (portable mode)
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config_dir: cwd.clone(),
            data_dir: cwd.clone(),
            cache_dir: cwd.join("cache"),
        }
    }

    fn resolve_dir(
        env_var: &str,
        config_override: &Option<PathBuf>,
        platform_dir: Option<PathBuf>,
        cwd_subdir: Option<&str>,
    ) -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = std::env::var(env_var) {
            return PathBuf::from(path);
        }

        // 2. Check config file override
        if let Some(ref path) = config_override {
            return path.clone();
        }

        // 3. Use XDG/platform dir
        if let Some(dir) = platform_dir {
            return dir.join(APP_NAME);
        }

        // 4. Fallback to current directory
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match cwd_subdir {
            Some(sub) => cwd.join(sub),
            None => cwd,
        }
    }

    /// Get the cache database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("cache.db")
    }

    /// Get the database URL for SQLite
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path().display())
    }

    /// Get the config file path
    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILENAME)
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        Ok(())
    }

    /// Log the configured paths
    pub fn log_paths(&self) {
        tracing::info!("Configuration directory: {}", self.config_dir.display());
        tracing::info!("Data directory: {}", self.data_dir.display());
        tracing::info!("Cache directory: {}", self.cache_dir.display());
        tracing::debug!("Config file: {}", self.config_file_path().display());
        tracing::debug!("Database path: {}", self.database_path().display());
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new(&PathsConfig::default())
    }
}

/// Application configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Application paths
    pub paths: AppPaths,

    /// Server port
    pub port: u16,

    /// Bind address
    pub bind_address: String,

    /// External sources (WatchMode key already resolved from env)
    pub sources: SourcesConfig,

    pub cache: CacheConfig,

    pub resolver: ResolverConfig,

    pub aggregator: AggregatorConfig,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        // Check if we should use portable mode (current directory for everything)
        let portable_mode = std::env::var("SEASONAL_STREAMS_PORTABLE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if portable_mode {
            tracing::info!("Running in portable mode (using current directory)");
            return Self::build(ConfigFile::default(), AppPaths::current_dir());
        }

        // First, determine config directory to find config.toml
        let config_dir = Self::find_config_dir();

        // Try to load config file
        let config_file = Self::load_config_file(&config_dir);

        // Build final configuration with environment overrides
        let paths = AppPaths::new(&config_file.paths);
        Self::build(config_file, paths)
    }

    /// Find the config directory (for locating config.toml)
    fn find_config_dir() -> PathBuf {
        // Environment variable takes priority
        if let Ok(path) = std::env::var("SEASONAL_STREAMS_CONFIG_DIR") {
            return PathBuf::from(path);
        }

        // Then XDG config dir
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }

        // Fallback to current directory
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file
    fn load_config_file(config_dir: &std::path::Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with environment overrides
    fn build(config_file: ConfigFile, paths: AppPaths) -> Self {
        // Port: env > config > default
        let port = Self::env_port().unwrap_or(config_file.server.port);

        // Bind address: env > config > default
        let bind_address =
            Self::env_bind_address().unwrap_or_else(|| config_file.server.bind_address.clone());

        // WatchMode API key: env > config
        let mut sources = config_file.sources;
        sources.watchmode_api_key = std::env::var("WATCHMODE_API_KEY")
            .ok()
            .or(sources.watchmode_api_key)
            .filter(|key| !key.trim().is_empty());

        // Cache backend: env > config
        let mut cache = config_file.cache;
        if let Some(backend) = Self::env_cache_backend() {
            cache.backend = backend;
        }

        Self {
            paths,
            port,
            bind_address,
            sources,
            cache,
            resolver: config_file.resolver,
            aggregator: config_file.aggregator,
        }
    }

    fn env_port() -> Option<u16> {
        std::env::var("SEASONAL_STREAMS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
    }

    fn env_bind_address() -> Option<String> {
        std::env::var("SEASONAL_STREAMS_BIND_ADDRESS").ok()
    }

    fn env_cache_backend() -> Option<CacheBackendKind> {
        let value = std::env::var("SEASONAL_STREAMS_CACHE_BACKEND").ok()?;
        match value.parse() {
            Ok(backend) => Some(backend),
            Err(e) => {
                tracing::warn!("Ignoring SEASONAL_STREAMS_CACHE_BACKEND: {}", e);
                None
            }
        }
    }

    /// Get the database URL, with override from DATABASE_URL env var
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.paths.database_url())
    }

    /// Log configuration status
    pub fn log_config(&self) {
        self.paths.log_paths();
        tracing::info!("Server listening on {}:{}", self.bind_address, self.port);

        if self.sources.watchmode_api_key.is_some() {
            tracing::info!("Streaming sources: Kitsu + WatchMode");
        } else {
            tracing::info!("Streaming sources: Kitsu only");
            tracing::info!(
                "Hint: Add watchmode_api_key to config.toml or set WATCHMODE_API_KEY env var"
            );
        }

        match self.cache.backend {
            CacheBackendKind::Sqlite => tracing::info!("Cache backend: SQLite"),
            CacheBackendKind::Memory => tracing::info!("Cache backend: in-memory (not persisted)"),
        }
        tracing::debug!(
            "Cache TTL: {}h, version {}",
            self.cache.ttl_hours,
            self.cache.version
        );

        if self.resolver.expand_variations {
            tracing::info!("Expanded title variations: ENABLED");
        } else {
            tracing::debug!("Expanded title variations: disabled (fewer API calls)");
        }

        tracing::debug!(
            "Max candidates: {}, max concurrent resolutions: {}",
            self.resolver.max_candidates,
            self.aggregator.max_concurrent
        );
    }
}
