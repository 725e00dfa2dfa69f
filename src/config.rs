//! Startup configuration.
//!
//! Values come from, in order of precedence: command-line flags, their
//! environment variables, an optional YAML file (`--config`), and built-in
//! defaults. The result is validated once and never changes afterwards.

use crate::error::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;
pub const DEFAULT_MAX_CONNS: usize = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

const EXAMPLE: &str = "Example:
  Forward requests round-robin to servers 192.168.0.1 through 192.168.0.8:
    $ fanout http://192.168.0.{1..8}";

#[derive(Parser, Debug, Default)]
#[command(name = "fanout", version, about = "A fan-out reverse proxy", after_help = EXAMPLE)]
pub struct Args {
    /// Backend servers (format: "http://<host>:<port>")
    #[arg(value_name = "HTTP_SERVERS", env = "FANOUT_BACKENDS", value_delimiter = ',')]
    pub backends: Vec<String>,

    /// Address to listen on for incoming connections
    #[arg(long, env = "LISTEN")]
    pub listen: Option<String>,

    /// Port to listen on (all interfaces); overrides --listen
    #[arg(short, long, env = "FANOUT_PORT")]
    pub port: Option<u16>,

    /// Size of each pooled buffer in bytes [0 disables buffer pooling]
    #[arg(long, env = "FANOUT_BUFSIZE")]
    pub bufsize: Option<usize>,

    /// Max number of concurrent connections per server [0 disables limit]
    #[arg(long, env = "FANOUT_MAXCONNS")]
    pub maxconns: Option<usize>,

    /// Redirect requests using the given HTTP code instead of proxying [0 disables redirect]
    #[arg(long, env = "FANOUT_REDIRECT")]
    pub redirect: Option<u16>,

    /// Increase the open file descriptor limit of the process (as in 'ulimit -n') [0 leaves it alone]
    #[arg(long, env = "FANOUT_FDLIMIT")]
    pub fdlimit: Option<u64>,

    /// Seconds to wait for a backend connection to be established
    #[arg(long, env = "FANOUT_CONNECT_TIMEOUT")]
    pub connect_timeout: Option<u64>,

    /// Seconds to wait for a backend's response head once the request is sent [0 waits forever]
    #[arg(long, env = "FANOUT_HEADER_TIMEOUT")]
    pub header_timeout: Option<u64>,

    /// Seconds a request may wait for a free backend slot before failing with 503 [0 waits forever]
    #[arg(long, env = "FANOUT_ADMISSION_TIMEOUT")]
    pub admission_timeout: Option<u64>,

    /// Seconds between releases of idle pooled buffers [0 never releases them]
    #[arg(long, env = "FANOUT_POOL_TRIM")]
    pub pool_trim_interval: Option<u64>,

    /// YAML configuration file
    #[arg(short, long, env = "FANOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print verbose output
    #[arg(short, long, env = "FANOUT_VERBOSE")]
    pub verbose: bool,
}

/// Shape of the optional YAML file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub backends: Vec<String>,
    pub listen: Option<String>,
    pub bufsize: Option<usize>,
    pub maxconns: Option<usize>,
    pub redirect: Option<u16>,
    pub fdlimit: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub header_timeout: Option<u64>,
    pub admission_timeout: Option<u64>,
    pub pool_trim_interval: Option<u64>,
    pub verbose: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// How requests are answered, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Proxy,
    Redirect(u16),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub backends: Vec<String>,
    pub buffer_size: usize,
    pub max_conns_per_backend: usize,
    pub redirect_code: u16,
    pub fd_limit: u64,
    pub connect_timeout: Duration,
    pub header_timeout: Option<Duration>,
    pub admission_timeout: Option<Duration>,
    pub pool_trim_interval: Option<Duration>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN.to_string(),
            backends: Vec::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_conns_per_backend: DEFAULT_MAX_CONNS,
            redirect_code: 0,
            fd_limit: 0,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            header_timeout: None,
            admission_timeout: None,
            pool_trim_interval: None,
            verbose: false,
        }
    }
}

impl Config {
    /// Loads from the process arguments and environment. `--help`,
    /// `--version` and usage errors exit the process, as usual for a CLI.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_parsed(Args::parse())
    }

    /// Loads from an explicit argument list (first item is the program name).
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = Args::try_parse_from(args).map_err(|e| ConfigError::Args(e.to_string()))?;
        Self::from_parsed(args)
    }

    pub fn from_parsed(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };

        let defaults = Config::default();
        let secs = |value: Option<u64>| value.filter(|&s| s > 0).map(Duration::from_secs);

        let listen_addr = match args.port {
            Some(port) => format!("0.0.0.0:{port}"),
            None => args
                .listen
                .or(file.listen)
                .unwrap_or(defaults.listen_addr),
        };

        let backends = if args.backends.is_empty() {
            file.backends
        } else {
            args.backends
        };

        let config = Config {
            listen_addr,
            backends: backends
                .into_iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect(),
            buffer_size: args.bufsize.or(file.bufsize).unwrap_or(defaults.buffer_size),
            max_conns_per_backend: args
                .maxconns
                .or(file.maxconns)
                .unwrap_or(defaults.max_conns_per_backend),
            redirect_code: args.redirect.or(file.redirect).unwrap_or(0),
            fd_limit: args.fdlimit.or(file.fdlimit).unwrap_or(0),
            connect_timeout: args
                .connect_timeout
                .or(file.connect_timeout)
                .map_or(defaults.connect_timeout, Duration::from_secs),
            header_timeout: secs(args.header_timeout.or(file.header_timeout)),
            admission_timeout: secs(args.admission_timeout.or(file.admission_timeout)),
            pool_trim_interval: secs(args.pool_trim_interval.or(file.pool_trim_interval)),
            verbose: args.verbose || file.verbose.unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks everything that would otherwise fail at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        for backend in &self.backends {
            parse_backend_uri(backend)?;
        }

        if self.redirect_code != 0 && !(100..=999).contains(&self.redirect_code) {
            return Err(ConfigError::InvalidRedirectCode(self.redirect_code));
        }

        Ok(())
    }

    pub fn mode(&self) -> Mode {
        match self.redirect_code {
            0 => Mode::Proxy,
            code => Mode::Redirect(code),
        }
    }
}

/// Parses a backend base URI; only absolute `http` URIs with a host qualify.
pub fn parse_backend_uri(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidBackend {
        uri: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" {
        return Err(ConfigError::UnsupportedScheme {
            uri: raw.to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidBackend {
            uri: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}
