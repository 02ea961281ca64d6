//! Resolving who, if anyone, is logged in.
//!
//! There are two ways to ask:
//! - [PrivilegedSessionRelay] forwards the auth cookies of an incoming request
//!   to the API, for deciding on a redirect before anything is rendered.
//! - [SessionRelay] goes through the shared [ApiClient] and caches the answer,
//!   for views that are already on screen.
//!
//! Both answer with a [SessionResponse] and never fail: every error means
//! "no user". A 401 is the normal answer for anonymous visitors and is not
//! logged as an error, other failures are.

use std::sync::{Arc, Mutex};

use axum_extra::extract::CookieJar;
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, CACHE_CONTROL, COOKIE},
};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    api_client::ApiClient,
    cache::{QueryCache, QueryKey},
    config::ClientConfig,
    endpoints,
    retry::RetryPolicy,
};

/// The name of the cookie holding the auth token.
pub const AUTH_COOKIE: &str = "auth_token";
/// The name of the cookie holding the CSRF token.
pub const CSRF_COOKIE: &str = "csrf_token";

/// The logged in user, as reported by the profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// The user's ID.
    #[serde(rename = "user_id")]
    pub id: String,
    /// The user's display name.
    pub name: String,
    /// The user's email address.
    pub email: String,
}

/// The answer to "who is logged in?": `{ "user": {...} }` or `{ "user": null }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    /// The logged in user, or `None` if there is no session.
    #[serde(default)]
    pub user: Option<UserIdentity>,
}

impl SessionResponse {
    /// The response for an anonymous visitor.
    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

/// Where the cache-backed session check is at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// A check is in flight, or there has not been one yet.
    Loading,
    /// The last check finished, with the user if there is one.
    Resolved(Option<UserIdentity>),
}

fn session_key() -> QueryKey {
    QueryKey::new(["session"])
}

/// Resolves the session through the shared [ApiClient] and caches the answer.
#[derive(Debug)]
pub struct SessionRelay {
    api: Arc<ApiClient>,
    cache: QueryCache<Option<UserIdentity>>,
    retry: RetryPolicy,
    state: Mutex<SessionState>,
}

impl SessionRelay {
    /// Create a relay whose answers are cached for `config.session_ttl`.
    pub fn new(api: Arc<ApiClient>, config: &ClientConfig) -> Self {
        Self {
            api,
            cache: QueryCache::with_stale_time(config.session_ttl),
            retry: config.retry,
            state: Mutex::new(SessionState::Loading),
        }
    }

    /// Resolve the session, from the cache if a fresh answer is there.
    pub async fn check(&self) -> SessionResponse {
        let result = self
            .cache
            .fetch(&session_key(), &self.retry, || self.fetch_profile())
            .await;

        let user = match result {
            Ok(user) => user,
            Err(error) => {
                tracing::error!("Failed to resolve the session: {error}");
                None
            }
        };

        self.set_state(SessionState::Resolved(user.clone()));
        SessionResponse { user }
    }

    /// Where the session check is at.
    pub fn state(&self) -> SessionState {
        if self.cache.is_fetching(&session_key()) {
            return SessionState::Loading;
        }

        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or(SessionState::Loading)
    }

    /// Throw away the cached answer and check again, e.g. after logging in.
    pub async fn refetch(&self) -> SessionResponse {
        self.invalidate();
        self.check().await
    }

    /// Mark the cached answer as stale so that the next check asks the server.
    pub fn invalidate(&self) {
        self.cache.invalidate(&session_key());
        self.set_state(SessionState::Loading);
    }

    /// Forget the session, e.g. after logging out.
    pub fn clear(&self) {
        self.cache.clear();
        self.set_state(SessionState::Loading);
    }

    fn set_state(&self, state: SessionState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Fetch the profile, treating 401 as a successful answer of "no user" so
    /// that it is cached and never retried.
    async fn fetch_profile(&self) -> Result<Option<UserIdentity>, Error> {
        match self
            .api
            .get::<SessionResponse>(endpoints::PROFILE, &[])
            .await
        {
            Ok(SessionResponse { user }) => Ok(user),
            Err(Error::Unauthenticated) => {
                tracing::debug!("No active session");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

/// The auth cookies of an incoming request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    auth_token: Option<String>,
    csrf_token: Option<String>,
}

impl SessionCookies {
    /// Use explicit cookie values. Blank values count as missing.
    pub fn new(auth_token: Option<&str>, csrf_token: Option<&str>) -> Self {
        let non_blank = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };

        Self {
            auth_token: non_blank(auth_token),
            csrf_token: non_blank(csrf_token),
        }
    }

    /// Read the cookies from a request's cookie jar.
    pub fn from_jar(jar: &CookieJar) -> Self {
        Self::new(
            jar.get(AUTH_COOKIE).map(|cookie| cookie.value()),
            jar.get(CSRF_COOKIE).map(|cookie| cookie.value()),
        )
    }

    /// Whether there is an auth token to forward.
    pub fn has_auth_token(&self) -> bool {
        self.auth_token.is_some()
    }

    /// The `Cookie` header to forward, or `None` if there is no auth token.
    pub fn cookie_header(&self) -> Option<String> {
        let auth_token = self.auth_token.as_deref()?;

        Some(match self.csrf_token.as_deref() {
            Some(csrf_token) => format!("{AUTH_COOKIE}={auth_token}; {CSRF_COOKIE}={csrf_token}"),
            None => format!("{AUTH_COOKIE}={auth_token}"),
        })
    }
}

/// Resolves the session by forwarding a request's cookies to the profile endpoint.
///
/// It has its own HTTP client without a cookie store, so one visitor's cookies
/// never end up on another visitor's request. Answers are not cached.
#[derive(Debug, Clone)]
pub struct PrivilegedSessionRelay {
    http: Client,
    profile_url: String,
}

impl PrivilegedSessionRelay {
    /// Create a relay for the API at `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [Error::HttpClient] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| Error::HttpClient(error.to_string()))?;

        Ok(Self {
            http,
            profile_url: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                endpoints::PROFILE
            ),
        })
    }

    /// Resolve the session of the visitor with `cookies`.
    ///
    /// Without an auth token there is no session and no request is made.
    pub async fn resolve(&self, cookies: &SessionCookies) -> SessionResponse {
        let Some(cookie_header) = cookies.cookie_header() else {
            tracing::debug!("No auth cookie, skipping session check");
            return SessionResponse::anonymous();
        };

        let response = match self
            .http
            .get(&self.profile_url)
            .header(COOKIE, cookie_header)
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::error!("Session check failed: {error}");
                return SessionResponse::anonymous();
            }
        };

        match response.status() {
            status if status.is_success() => response
                .json::<SessionResponse>()
                .await
                .unwrap_or_else(|error| {
                    tracing::error!("Could not decode the session response: {error}");
                    SessionResponse::anonymous()
                }),
            StatusCode::UNAUTHORIZED => {
                tracing::debug!("Session check returned 401, treating as signed out");
                SessionResponse::anonymous()
            }
            status => {
                tracing::error!("Session check failed with status {status}");
                SessionResponse::anonymous()
            }
        }
    }
}
