//! [![github]](https://github.com/AnthonyDickson/budgeteur-rs)&ensp;
//!
//! [github]: https://img.shields.io/badge/github-8da0cb?style=for-the-badge&labelColor=555555&logo=github
//!
//! <br>
//!
//! Budgeteur is an app for managing your budget and personal finances.
//!
//! This library is the client side of the transactions REST API: an
//! authenticated HTTP client with CSRF handling, a parameter-keyed query cache
//! with single-flight reads and mutation-driven invalidation, session
//! resolution, and the filter/pagination state that turns UI input into
//! requests.

#![warn(missing_docs)]

use std::sync::Arc;

mod api_client;
mod auth;
mod cache;
mod config;
mod currency;
mod debounce;
pub mod endpoints;
mod guard;
mod logging;
mod retry;
mod session;
mod timestamp;
mod transaction;

#[cfg(test)]
mod test_utils;

pub use api_client::{ApiClient, CSRF_HEADER};
pub use auth::{LogInData, LogInResponse, RegisterData, User};
pub use cache::{QueryCache, QueryKey, QueryState};
pub use config::{ClientConfig, Environment};
pub use currency::{format_currency, format_date, format_signed_amount};
pub use debounce::{DebounceSender, Debounced, channel as debounce_channel};
pub use guard::{
    GateDecision, GuardState, SessionRequirement, decide, redirect_if_signed_in, require_session,
};
pub use logging::{redact_password, setup_logging};
pub use retry::RetryPolicy;
pub use session::{
    AUTH_COOKIE, CSRF_COOKIE, PrivilegedSessionRelay, SessionCookies, SessionRelay,
    SessionResponse, SessionState, UserIdentity,
};
pub use transaction::{
    AmountRange, Category, DEFAULT_PAGE_SIZE, Direction, MutationResponse, NewTransaction,
    PAGE_SIZE_OPTIONS, PageRequest, PageSource, SortOrder, Transaction, TransactionFilters,
    TransactionId, TransactionQueries, TransactionType, TransactionUpdate, TransactionsPage,
    has_more,
};

/// The errors that may occur in the client.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum Error {
    /// The server responded with 401, i.e. there is no logged in user.
    ///
    /// This is the expected answer for anonymous visitors and should not be
    /// reported as a failure.
    #[error("not logged in")]
    Unauthenticated,

    /// The server responded with 403 even after retrying with a fresh CSRF token.
    #[error("{}", .message.as_deref().unwrap_or("the request was forbidden"))]
    Forbidden {
        /// The message from the response body, if any.
        message: Option<String>,
    },

    /// The server responded with a non-success status other than 401 or 403.
    ///
    /// Validation failures on create and update land here, carrying the
    /// server's message verbatim.
    #[error("{}", describe_api_error(.status, .message))]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The message from the response body, if any.
        message: Option<String>,
    },

    /// The request could not be sent or the response could not be received,
    /// e.g. the connection was refused or the request timed out.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("could not decode the response: {0}")]
    InvalidResponse(String),

    /// A transaction amount must be a finite number greater than zero.
    #[error("{0} is not a valid amount, amounts must be greater than zero")]
    InvalidAmount(f64),

    /// A transaction must have a category.
    #[error("category cannot be empty")]
    EmptyCategory,

    /// The email address is not in a valid format.
    #[error("\"{0}\" is not a valid email address")]
    InvalidEmail(String),

    /// A page size must be at least one.
    #[error("page size must be greater than zero")]
    InvalidPageSize,

    /// The environment variable holding the base URL is not set.
    #[error("the environment variable '{0}' must be set")]
    MissingBaseUrl(String),

    /// The base URL could not be parsed.
    #[error("invalid base URL \"{0}\"")]
    InvalidBaseUrl(String),

    /// The request timeout is not a whole number of seconds greater than zero.
    #[error("invalid request timeout \"{0}\", expected a whole number of seconds above zero")]
    InvalidRequestTimeout(String),

    /// The deployment environment name is not one of "production" or "development".
    #[error("unknown environment \"{0}\", expected \"production\" or \"development\"")]
    InvalidEnvironment(String),

    /// The underlying HTTP client could not be built.
    #[error("could not build the HTTP client: {0}")]
    HttpClient(String),
}

fn describe_api_error(status: &u16, message: &Option<String>) -> String {
    match message {
        Some(message) => message.clone(),
        None => format!("the server responded with status {status}"),
    }
}

impl Error {
    /// The HTTP status code behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Unauthenticated => Some(401),
            Error::Forbidden { .. } => Some(403),
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether retrying the same request might succeed.
    ///
    /// Network failures, server errors, timeouts (408) and rate limiting (429)
    /// are transient. Everything else, including 401, is definitive.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// The message the server sent with this error, or `fallback` when there
    /// was none.
    ///
    /// Client side validation errors use their own description.
    pub fn message_or(&self, fallback: &str) -> String {
        match self {
            Error::Forbidden { message } | Error::Api { message, .. } => {
                message.clone().unwrap_or_else(|| fallback.to_owned())
            }
            Error::InvalidAmount(_)
            | Error::EmptyCategory
            | Error::InvalidEmail(_)
            | Error::InvalidPageSize => self.to_string(),
            _ => fallback.to_owned(),
        }
    }
}

/// The client for the Budgeteur REST API.
///
/// Holds the single [ApiClient] for the application lifetime and the caches
/// built on top of it. Construct it once and share it, e.g. behind an [Arc].
#[derive(Debug, Clone)]
pub struct BudgeteurClient {
    config: ClientConfig,
    api: Arc<ApiClient>,
    session: Arc<SessionRelay>,
    transactions: Arc<TransactionQueries>,
}

impl BudgeteurClient {
    /// Create the API client and its caches from `config`.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidBaseUrl] or [Error::HttpClient] if the HTTP
    /// client cannot be set up.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let api = Arc::new(ApiClient::new(&config)?);

        Ok(Self {
            session: Arc::new(SessionRelay::new(api.clone(), &config)),
            transactions: Arc::new(TransactionQueries::new(api.clone(), config.retry)),
            api,
            config,
        })
    }

    /// The configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared, authenticated HTTP client.
    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    /// The cache-backed session relay.
    pub fn session(&self) -> &SessionRelay {
        &self.session
    }

    /// The transaction reads and mutations.
    pub fn transactions(&self) -> &TransactionQueries {
        &self.transactions
    }
}
