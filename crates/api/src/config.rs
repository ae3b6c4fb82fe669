use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderValue;
use speechpace_core::dispatch::{DispatchConfig, FallbackPolicy, ScriptPaths, DEFAULT_INTERPRETERS};

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";
const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 120;
/// Headroom between the worst-case fallback chain and the whole-request timeout.
const REQUEST_TIMEOUT_MARGIN_SECS: u64 = 30;

/// Origins allowed to call the API from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    /// `CORS_ORIGINS=*`. Credentials are not allowed in this mode.
    Any,
    List(Vec<HeaderValue>),
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. Invalid values
/// are logged and replaced by their default rather than aborting start-up.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3001`).
    pub port: u16,
    pub cors_origins: CorsOrigins,
    /// Directory holding `predict.py` and the optional `debug_predict.py`.
    pub scripts_dir: PathBuf,
    /// Interpreter candidates, in the order they are tried.
    pub python_commands: Vec<String>,
    /// Bound on a single interpreter attempt.
    pub script_timeout_secs: u64,
    /// Whether empty or non-JSON script output falls through to the next
    /// interpreter.
    pub retry_on_bad_output: bool,
    /// Whole-request timeout; always above the time every interpreter
    /// candidate may spend timing out.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                                        |
    /// |------------------------|------------------------------------------------|
    /// | `HOST`                 | `0.0.0.0`                                      |
    /// | `PORT`                 | `3001`                                         |
    /// | `CORS_ORIGINS`         | `http://localhost:3000,http://127.0.0.1:3000`  |
    /// | `SCRIPTS_DIR`          | `scripts`                                      |
    /// | `PYTHON_COMMANDS`      | `python3,python,py`                            |
    /// | `SCRIPT_TIMEOUT_SECS`  | `120`                                          |
    /// | `RETRY_ON_BAD_OUTPUT`  | `true`                                         |
    /// | `REQUEST_TIMEOUT_SECS` | candidates x (script timeout + 1) + 30         |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port = parse_or_default(&lookup, "PORT", DEFAULT_PORT);

        let cors_origins = parse_cors_origins(
            lookup("CORS_ORIGINS")
                .as_deref()
                .unwrap_or(DEFAULT_CORS_ORIGINS),
        );

        let scripts_dir = lookup("SCRIPTS_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("scripts"));

        let python_commands = parse_list(lookup("PYTHON_COMMANDS").as_deref())
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_INTERPRETERS.iter().map(|s| s.to_string()).collect());

        let script_timeout_secs = parse_or_default(
            &lookup,
            "SCRIPT_TIMEOUT_SECS",
            DEFAULT_SCRIPT_TIMEOUT_SECS,
        )
        .max(1);

        let retry_on_bad_output = parse_or_default(&lookup, "RETRY_ON_BAD_OUTPUT", true);

        let mut config = Self {
            host,
            port,
            cors_origins,
            scripts_dir,
            python_commands,
            script_timeout_secs,
            retry_on_bad_output,
            request_timeout_secs: 0,
        };
        let floor = config.min_request_timeout_secs();
        config.request_timeout_secs = parse_or_default(
            &lookup,
            "REQUEST_TIMEOUT_SECS",
            (floor - 1).saturating_add(REQUEST_TIMEOUT_MARGIN_SECS),
        )
        .max(floor);
        config
    }

    /// Smallest whole-request timeout that still lets every interpreter
    /// candidate time out and report a JSON error.
    pub fn min_request_timeout_secs(&self) -> u64 {
        self.dispatch_config()
            .max_chain_duration()
            .as_secs()
            .saturating_add(1)
    }

    /// Request timeout applied by the router, never below
    /// [`Self::min_request_timeout_secs`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .max(self.min_request_timeout_secs()),
        )
    }

    /// Dispatcher settings derived from this configuration.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::new(ScriptPaths::from_root(&self.scripts_dir))
            .with_interpreters(self.python_commands.iter().cloned())
            .with_timeout(Duration::from_secs(self.script_timeout_secs))
            .with_policy(FallbackPolicy::from_retry_on_bad_output(
                self.retry_on_bad_output,
            ))
    }
}

fn parse_or_default<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, %default, "Invalid value, using default");
            default
        }),
    }
}

fn parse_list(raw: Option<&str>) -> Option<Vec<String>> {
    raw.map(|s| {
        s.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

fn parse_cors_origins(raw: &str) -> CorsOrigins {
    if raw.trim() == "*" {
        return CorsOrigins::Any;
    }
    let origins = parse_list(Some(raw))
        .unwrap_or_default()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsOrigins::List(origins)
}
