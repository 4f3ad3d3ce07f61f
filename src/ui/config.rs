use crate::debugger::Error;
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::{fs, io};

/// Default number of source lines shown around the current line.
pub const DEFAULT_CONTEXT_LINES: usize = 5;

/// Server connection settings, any unset field falls back to libpq
/// environment variables (`PGHOST`, `PGPORT`, ...) and then to driver defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Connection URL like `postgres://user@host/db`, other fields override its parts.
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub application_name: Option<String>,
}

impl ConnectionConfig {
    /// Fill fields unset in `self` with fields of `other`.
    ///
    /// A url in `self` describes the whole server address, so `other`
    /// contributes only the application name.
    pub fn or(self, other: ConnectionConfig) -> Self {
        if self.url.is_some() {
            return Self {
                application_name: self.application_name.or(other.application_name),
                ..self
            };
        }
        Self {
            url: self.url.or(other.url),
            host: self.host.or(other.host),
            port: self.port.or(other.port),
            user: self.user.or(other.user),
            password: self.password.or(other.password),
            database: self.database.or(other.database),
            application_name: self.application_name.or(other.application_name),
        }
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        let mut options = match &self.url {
            Some(url) => PgConnectOptions::from_str(url)?,
            None => PgConnectOptions::new(),
        };
        if let Some(host) = &self.host {
            options = options.host(host);
        }
        if let Some(port) = self.port {
            options = options.port(port);
        }
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(database) = &self.database {
            options = options.database(database);
        }
        let application_name = self.application_name.as_deref().unwrap_or("pldbg");
        Ok(options.application_name(application_name))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub context_lines: usize,
    /// Print local variables after each step.
    pub show_locals: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            context_lines: DEFAULT_CONTEXT_LINES,
            show_locals: false,
        }
    }
}

/// Content of the configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub connection: ConnectionConfig,
    pub console: ConsoleConfig,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    /// Read a configuration file, a missing file is an empty configuration.
    pub fn load(path: &Path) -> Result<Self, Error> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!(target: "debugger", "no configuration at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Return `~/.config/pldbg/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".config").join("pldbg").join("config.toml"))
}

/// Application user interface config.
#[derive(Debug)]
pub struct UIConfig {
    /// Number of source lines shown around the current line.
    pub context_lines: usize,
    /// Print local variables after each step.
    pub show_locals: bool,
}

impl From<ConsoleConfig> for UIConfig {
    fn from(console: ConsoleConfig) -> Self {
        Self {
            context_lines: console.context_lines,
            show_locals: console.show_locals,
        }
    }
}

/// Read-only ui configuration (set only once, at debugger start).
static CONFIG: OnceLock<UIConfig> = OnceLock::new();

/// Set initial configuration, later calls are ignored.
pub fn set(config: UIConfig) {
    if CONFIG.set(config).is_err() {
        log::warn!(target: "debugger", "ui configuration already set");
    }
}

/// Return application ui config, the default one if not set.
pub fn current() -> &'static UIConfig {
    CONFIG.get_or_init(|| ConsoleConfig::default().into())
}
