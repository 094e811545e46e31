use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const DEFAULT_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            level: Self::DEFAULT_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.level.clone();
        self.level = self.level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.level.as_str()) {
            eprintln!(
                "Config error: log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::DEFAULT_LEVEL
            );
            self.level = Self::DEFAULT_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

impl DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: "sqlboot.db".to_string(),
        }
    }
}

/// Delay strategy applied between retry attempts of a bootstrap phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BootstrapConfig {
    /// Safety gate: bootstrap does nothing unless this is explicitly true.
    pub auto_bootstrap: bool,
    pub migrations_dir: String,
    pub seeds_dir: String,
    pub lock_id: i64,
    /// A lock claim older than this is presumed abandoned and may be taken over.
    pub lock_ttl_secs: i64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    backoff: String,
}

impl BootstrapConfig {
    const BACKOFFS: [&str; 2] = ["fixed", "exponential"];

    const BACKOFF_FIXED: &str = "fixed";
    const BACKOFF_EXPONENTIAL: &str = "exponential";

    const DEFAULT_LOCK_ID: i64 = 12345;

    pub fn backoff(&self) -> Backoff {
        // The value is normalized by ensure_valid, so anything that isn't
        // "exponential" is treated as fixed rather than panicking
        match self.backoff.as_str() {
            Self::BACKOFF_EXPONENTIAL => Backoff::Exponential,
            _ => Backoff::Fixed,
        }
    }

    pub fn migrations_dir(&self) -> &Path {
        Path::new(&self.migrations_dir)
    }

    pub fn seeds_dir(&self) -> &Path {
        Path::new(&self.seeds_dir)
    }

    fn default() -> Self {
        BootstrapConfig {
            auto_bootstrap: false,
            migrations_dir: "db/migrations".to_string(),
            seeds_dir: "db/seeds".to_string(),
            lock_id: Self::DEFAULT_LOCK_ID,
            lock_ttl_secs: 600,
            max_retries: 3,
            retry_delay_ms: 1000,
            backoff: Self::BACKOFF_FIXED.to_owned(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.backoff.clone();
        self.backoff = self.backoff.trim().to_ascii_lowercase();
        if !Self::BACKOFFS.contains(&self.backoff.as_str()) {
            eprintln!(
                "Config error: backoff of '{}' is invalid - using default of '{}'",
                str_original,
                Self::BACKOFF_FIXED
            );
            self.backoff = Self::BACKOFF_FIXED.to_owned();
        }

        if self.max_retries == 0 {
            eprintln!("Config error: max_retries of 0 is invalid - using 1");
            self.max_retries = 1;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub bootstrap: BootstrapConfig,
}

impl Config {
    /// Loads the configuration from a TOML file, layered over defaults and
    /// under `SQLBOOT_`-prefixed environment variables (section and key are
    /// separated by a double underscore, e.g. `SQLBOOT_BOOTSTRAP__AUTO_BOOTSTRAP`).
    /// A missing file or a file that fails to parse falls back to defaults.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load(config_path: &Path) -> Self {
        let default_config = Config::default_config();

        if !config_path.exists() {
            if let Ok(toml_string) = toml::to_string_pretty(&default_config) {
                if let Err(e) = std::fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("SQLBOOT_").split("__"));

        let mut config: Config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    pub fn default_config() -> Self {
        Config {
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.bootstrap.ensure_valid();
    }
}
