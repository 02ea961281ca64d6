//! The authenticated HTTP client shared by every request to the API.
//!
//! Cookies set by the server (the auth and CSRF cookies) are stored and sent
//! back on every request. Mutating requests fetch a fresh CSRF token first and
//! send it in the [CSRF_HEADER] header. A 403 is retried once with a new token.

use reqwest::{
    Client, Method, Response, StatusCode, Url,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Error,
    config::ClientConfig,
    endpoints::{self, CSRF_EXEMPT},
    logging::{log_body, redact_json},
};

/// The header that carries the CSRF token on mutating requests.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// A request that can be sent more than once.
#[derive(Debug, Clone)]
struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CsrfTokenResponse {
    csrf_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// The HTTP client for the Budgeteur API.
///
/// There should be one instance per application, shared by [std::sync::Arc],
/// so that every request uses the same cookie store.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// Build the client for the API at `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidBaseUrl] if the base URL is not an absolute HTTP(S)
    /// URL, or [Error::HttpClient] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let base_url = validate_base_url(&config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| Error::HttpClient(error.to_string()))?;

        Ok(Self { http, base_url })
    }

    /// The base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a GET request to `path` with the query parameters `query` and decode the JSON response.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        self.execute(ApiRequest {
            method: Method::GET,
            path: path.to_owned(),
            query: query
                .iter()
                .map(|(key, value)| ((*key).to_owned(), value.clone()))
                .collect(),
            body: None,
        })
        .await
    }

    /// Send a POST request with `body` encoded as JSON.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode_body(body)?;
        self.execute(ApiRequest::new(Method::POST, path, Some(body)))
            .await
    }

    /// Send a POST request without a body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.execute(ApiRequest::new(Method::POST, path, None)).await
    }

    /// Send a PUT request with `body` encoded as JSON.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode_body(body)?;
        self.execute(ApiRequest::new(Method::PUT, path, Some(body)))
            .await
    }

    /// Send a PATCH request with `body` encoded as JSON.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode_body(body)?;
        self.execute(ApiRequest::new(Method::PATCH, path, Some(body)))
            .await
    }

    /// Send a DELETE request.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.execute(ApiRequest::new(Method::DELETE, path, None))
            .await
    }

    /// Fetch a fresh CSRF token.
    ///
    /// Failing to get a token is not fatal: the failure is logged and `None`
    /// is returned, leaving the server to reject the request that needed it.
    pub async fn fetch_csrf_token(&self) -> Option<String> {
        let request = ApiRequest::new(Method::GET, endpoints::CSRF_TOKEN, None);

        let result = match self.send_once(&request, None).await {
            Ok(response) => decode::<CsrfTokenResponse>(response).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(CsrfTokenResponse { csrf_token }) => Some(csrf_token),
            Err(error) => {
                tracing::warn!("Failed to fetch CSRF token: {error}");
                None
            }
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, Error> {
        let csrf_token = if requires_csrf(&request.method, &request.path) {
            self.fetch_csrf_token().await
        } else {
            None
        };

        let response = self.send_once(&request, csrf_token.as_deref()).await?;

        if response.status() != StatusCode::FORBIDDEN {
            return decode(response).await;
        }

        tracing::debug!(
            "{} {} was forbidden, retrying once with a fresh CSRF token",
            request.method,
            request.path
        );
        let Some(csrf_token) = self.fetch_csrf_token().await else {
            return decode(response).await;
        };

        // The retry is final: a second 403 goes back to the caller.
        let response = self.send_once(&request, Some(&csrf_token)).await?;
        decode(response).await
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        csrf_token: Option<&str>,
    ) -> Result<Response, Error> {
        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!("Sending request: {} {url}", request.method);

        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            log_body("request body", &redact_json(body).to_string());
            builder = builder.json(body);
        }
        if let Some(csrf_token) = csrf_token {
            builder = builder.header(CSRF_HEADER, csrf_token);
        }

        builder.send().await.map_err(|error| {
            tracing::debug!("{} {url} failed: {error}", request.method);
            Error::Network(error.to_string())
        })
    }
}

impl ApiRequest {
    fn new(method: Method, path: &str, body: Option<serde_json::Value>) -> Self {
        Self {
            method,
            path: path.to_owned(),
            query: Vec::new(),
            body,
        }
    }
}

/// Whether a request needs a CSRF token: mutations outside of the auth entry points.
fn requires_csrf(method: &Method, path: &str) -> bool {
    let is_mutation = matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    let is_exempt = CSRF_EXEMPT.iter().any(|exempt| path.contains(exempt));

    is_mutation && !is_exempt
}

fn validate_base_url(base_url: &str) -> Result<String, Error> {
    let url = Url::parse(base_url).map_err(|_| Error::InvalidBaseUrl(base_url.to_owned()))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => {
            Ok(base_url.trim_end_matches('/').to_owned())
        }
        _ => Err(Error::InvalidBaseUrl(base_url.to_owned())),
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, Error> {
    serde_json::to_value(body)
        .map_err(|error| Error::HttpClient(format!("could not encode request body: {error}")))
}

/// Decode a successful response as JSON, or turn an unsuccessful one into an [Error].
///
/// An empty success body decodes as `{}`.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|error| Error::Network(error.to_string()))?;
    log_body(
        &format!("response body ({status})"),
        &String::from_utf8_lossy(&body),
    );

    if !status.is_success() {
        return Err(error_from_body(status, &body));
    }

    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &body
    };

    serde_json::from_slice(body).map_err(|error| Error::InvalidResponse(error.to_string()))
}

fn error_from_body(status: StatusCode, body: &[u8]) -> Error {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .filter(|message| !message.trim().is_empty());

    match status {
        StatusCode::UNAUTHORIZED => Error::Unauthenticated,
        StatusCode::FORBIDDEN => Error::Forbidden { message },
        status => Error::Api {
            status: status.as_u16(),
            message,
        },
    }
}
