use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use sse::RelaySettings;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default base URL of the compute service when `COMPUTE_URL` is not set.
pub const DEFAULT_COMPUTE_URL: &str = "http://localhost:5328";

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The Redis URL used for status channel subscriptions
    #[arg(short, long, env, default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Number of frames buffered per status stream before a slow client applies backpressure
    #[arg(long, env, default_value_t = 64)]
    pub relay_buffer_size: usize,

    /// Close a status stream after this many seconds without a status message (0 disables)
    #[arg(long, env, default_value_t = 0)]
    pub relay_idle_timeout_secs: u64,

    /// Interval in seconds between keep-alive comments on open status streams
    #[arg(long, env, default_value_t = 15)]
    pub sse_keep_alive_secs: u64,

    /// The base URL of the compute service that executes tests
    #[arg(long, env, default_value = DEFAULT_COMPUTE_URL)]
    compute_url: String,

    /// The API key sent as `X-API-Key` on every compute service request
    #[arg(long, env)]
    compute_api_key: Option<String>,

    /// The HS256 secret used to verify session tokens
    #[arg(long, env)]
    session_secret: Option<String>,

    /// The 32-byte key (64 hex characters) used to encrypt stored provider API keys
    #[arg(long, env)]
    api_key_encryption_key: Option<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    /// Defaults plus environment overrides, ignoring the process arguments.
    fn default() -> Self {
        Config::parse_from([env!("CARGO_PKG_NAME")])
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    pub fn set_redis_url(mut self, redis_url: String) -> Self {
        self.redis_url = redis_url;
        self
    }

    /// Returns the compute service base URL without a trailing slash.
    pub fn compute_url(&self) -> &str {
        self.compute_url.trim_end_matches('/')
    }

    pub fn set_compute_url(mut self, compute_url: String) -> Self {
        self.compute_url = compute_url;
        self
    }

    pub fn compute_api_key(&self) -> Option<String> {
        self.compute_api_key.clone()
    }

    pub fn set_compute_api_key(mut self, compute_api_key: String) -> Self {
        self.compute_api_key = Some(compute_api_key);
        self
    }

    pub fn session_secret(&self) -> Option<String> {
        self.session_secret.clone()
    }

    pub fn set_session_secret(mut self, session_secret: String) -> Self {
        self.session_secret = Some(session_secret);
        self
    }

    pub fn api_key_encryption_key(&self) -> Option<String> {
        self.api_key_encryption_key.clone()
    }

    pub fn set_api_key_encryption_key(mut self, key: String) -> Self {
        self.api_key_encryption_key = Some(key);
        self
    }

    pub fn set_relay_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.relay_idle_timeout_secs = secs;
        self
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            buffer_size: self.relay_buffer_size,
            idle_timeout: match self.relay_idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn sse_keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.sse_keep_alive_secs.max(1))
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("promptops_relay").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_disable_the_idle_timeout() {
        let config = parse(&["--relay-idle-timeout-secs", "0"]);
        assert_eq!(config.relay_settings().idle_timeout, None);
    }

    #[test]
    fn idle_timeout_and_buffer_size_map_to_relay_settings() {
        let config = parse(&[
            "--relay-idle-timeout-secs",
            "90",
            "--relay-buffer-size",
            "8",
        ]);
        assert_eq!(
            config.relay_settings(),
            RelaySettings {
                buffer_size: 8,
                idle_timeout: Some(Duration::from_secs(90)),
            }
        );
    }

    #[test]
    fn compute_url_drops_trailing_slash() {
        let config = parse(&["--compute-url", "http://core:5328/"]);
        assert_eq!(config.compute_url(), "http://core:5328");
    }

    #[test]
    fn keep_alive_interval_is_never_zero() {
        let config = parse(&["--sse-keep-alive-secs", "0"]);
        assert_eq!(config.sse_keep_alive_interval(), Duration::from_secs(1));
    }

    #[test]
    fn runtime_env_parses_case_insensitively() {
        assert_eq!("PRODUCTION".parse::<RustEnv>(), Ok(RustEnv::Production));
        assert_eq!("staging".parse::<RustEnv>(), Ok(RustEnv::Staging));
        assert_eq!("qa".parse::<RustEnv>(), Err(RustEnvParseError));

        let config = parse(&["--runtime-env", "production"]);
        assert!(config.is_production());
    }

    #[test]
    fn setters_override_values() {
        let config = parse(&[])
            .set_compute_url("http://127.0.0.1:9999".to_string())
            .set_compute_api_key("key".to_string())
            .set_session_secret("secret".to_string());
        assert_eq!(config.compute_url(), "http://127.0.0.1:9999");
        assert_eq!(config.compute_api_key().as_deref(), Some("key"));
        assert_eq!(config.session_secret().as_deref(), Some("secret"));
    }
}
