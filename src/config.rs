//! Client configuration: which API to talk to and how patiently.

use std::{env, fmt::Display, str::FromStr, time::Duration};

use crate::{Error, retry::RetryPolicy};

/// Selects the deployment environment.
pub const ENVIRONMENT_VAR: &str = "BUDGETEUR_ENV";
/// The base URL of the API in production.
pub const PRODUCTION_URL_VAR: &str = "BUDGETEUR_PRODUCTION_URL";
/// The base URL of the API during development.
pub const DEVELOPMENT_URL_VAR: &str = "BUDGETEUR_DEVELOPMENT_URL";
/// Overrides the request timeout, in whole seconds.
pub const REQUEST_TIMEOUT_VAR: &str = "BUDGETEUR_REQUEST_TIMEOUT_SECS";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// How long a resolved session is served from the cache.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(5 * 60);
/// The quiet period for free-text search input.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// The deployment environment, which decides the API base URL.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// A deployed build.
    Production,
    /// A local build.
    #[default]
    Development,
}

impl Environment {
    fn base_url_var(self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_URL_VAR,
            Environment::Development => DEVELOPMENT_URL_VAR,
        }
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            other => Err(Error::InvalidEnvironment(other.to_owned())),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => f.write_str("production"),
            Environment::Development => f.write_str("development"),
        }
    }
}

/// The settings shared by everything built on the [crate::ApiClient].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The environment the base URL was chosen for.
    pub environment: Environment,
    /// The API base URL without a trailing slash, e.g. "https://api.example.com".
    pub base_url: String,
    /// How long to wait for a response before giving up.
    pub request_timeout: Duration,
    /// How reads retry transient failures.
    pub retry: RetryPolicy,
    /// How long a resolved session is served from the cache.
    pub session_ttl: Duration,
    /// The quiet period before search text triggers a request, see
    /// [crate::BudgeteurClient::search_input].
    pub search_debounce: Duration,
}

impl ClientConfig {
    /// Create a config for `base_url` with the default settings.
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            environment: Environment::default(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            session_ttl: DEFAULT_SESSION_TTL,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
        }
    }

    /// Load the config from the process environment.
    ///
    /// See [ClientConfig::from_lookup] for the variables read.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load the config from the variables returned by `lookup`.
    ///
    /// - [ENVIRONMENT_VAR] picks "production" or "development" (default).
    /// - [PRODUCTION_URL_VAR] or [DEVELOPMENT_URL_VAR], depending on the
    ///   environment, must hold the API base URL.
    /// - [REQUEST_TIMEOUT_VAR] optionally overrides the request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment name is unknown, the base URL for
    /// the environment is missing, or the timeout is not a whole number of
    /// seconds greater than zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let environment = match lookup(ENVIRONMENT_VAR) {
            Some(name) => name.parse()?,
            None => Environment::default(),
        };

        let url_var = environment.base_url_var();
        let base_url = lookup(url_var)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::MissingBaseUrl(url_var.to_owned()))?;

        let mut config = Self::for_base_url(base_url.trim());
        config.environment = environment;

        if let Some(timeout) = lookup(REQUEST_TIMEOUT_VAR) {
            config.request_timeout = parse_request_timeout(&timeout)?;
        }

        Ok(config)
    }
}

fn parse_request_timeout(timeout: &str) -> Result<Duration, Error> {
    match timeout.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
        _ => {
            tracing::error!("{REQUEST_TIMEOUT_VAR} must be a positive integer, got {timeout:?}");
            Err(Error::InvalidRequestTimeout(timeout.to_owned()))
        }
    }
}

#[cfg(test)]
mod config_tests {
    use std::{collections::HashMap, time::Duration};

    use crate::Error;

    use super::{
        ClientConfig, DEVELOPMENT_URL_VAR, ENVIRONMENT_VAR, Environment, PRODUCTION_URL_VAR,
        REQUEST_TIMEOUT_VAR,
    };

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_development_url() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (DEVELOPMENT_URL_VAR, "http://localhost:8090/"),
            (PRODUCTION_URL_VAR, "https://api.example.com"),
        ]))
        .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.base_url, "http://localhost:8090");
    }

    #[test]
    fn production_selects_production_url() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENVIRONMENT_VAR, "production"),
            (DEVELOPMENT_URL_VAR, "http://localhost:8090"),
            (PRODUCTION_URL_VAR, "https://api.example.com"),
        ]))
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.base_url, "https://api.example.com");
    }

    #[test]
    fn missing_url_for_environment_is_an_error() {
        let result = ClientConfig::from_lookup(lookup_from(&[
            (ENVIRONMENT_VAR, "production"),
            (DEVELOPMENT_URL_VAR, "http://localhost:8090"),
        ]));

        assert_eq!(
            result.unwrap_err(),
            Error::MissingBaseUrl(PRODUCTION_URL_VAR.to_owned())
        );
    }

    #[test]
    fn unknown_environment_is_an_error() {
        let result = ClientConfig::from_lookup(lookup_from(&[(ENVIRONMENT_VAR, "staging")]));

        assert_eq!(
            result.unwrap_err(),
            Error::InvalidEnvironment("staging".to_owned())
        );
    }

    #[test]
    fn reads_request_timeout() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (DEVELOPMENT_URL_VAR, "http://localhost:8090"),
            (REQUEST_TIMEOUT_VAR, "5"),
        ]))
        .unwrap();

        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn malformed_request_timeout_is_an_error() {
        for timeout in ["soon", "-1", "1.5", "0"] {
            let result = ClientConfig::from_lookup(lookup_from(&[
                (DEVELOPMENT_URL_VAR, "http://localhost:8090"),
                (REQUEST_TIMEOUT_VAR, timeout),
            ]));

            assert_eq!(
                result.unwrap_err(),
                Error::InvalidRequestTimeout(timeout.to_owned()),
                "timeout {timeout:?}"
            );
        }
    }
}
