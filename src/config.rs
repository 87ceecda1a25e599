use std::net::SocketAddr;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing::trace;

const STORAGED_LISTEN: &str = "STORAGED_LISTEN";
const STORAGED_BACKEND: &str = "STORAGED_BACKEND";
const STORAGED_LOG: &str = "STORAGED_LOG";

/// Process configuration
///
/// Every field can come from the JSON config file, the environment or the
/// command line, in increasing order of precedence.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Address the HTTP API binds to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Connection descriptor of the storage backend (`scheme://location`)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Log level for the crate's own targets
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backend: default_backend(),
            log_level: default_log_level(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 80))
}

fn default_backend() -> String {
    String::from("bolt:///usr/share/storaged.boltdb")
}

fn default_log_level() -> String {
    String::from("info")
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub backend: Option<String>,
    pub log_level: Option<String>,
}

impl Config {
    /// Layer environment and command line values on top of `self`
    ///
    /// `env` looks up a variable by name, normally `std::env::var(..).ok()`.
    pub fn apply(
        mut self,
        env: impl Fn(&str) -> Option<String>,
        overrides: Overrides,
    ) -> anyhow::Result<Self> {
        if let Some(listen) = env(STORAGED_LISTEN) {
            self.listen = listen
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid {STORAGED_LISTEN} '{listen}': {e}"))?;
        }
        if let Some(backend) = env(STORAGED_BACKEND) {
            self.backend = backend;
        }
        if let Some(level) = env(STORAGED_LOG) {
            self.log_level = level;
        }

        if let Some(listen) = overrides.listen {
            self.listen = listen;
        }
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }

        self.level_filter()?;
        Ok(self)
    }

    pub fn level_filter(&self) -> anyhow::Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| anyhow::anyhow!("invalid log level '{}'", self.log_level))
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
