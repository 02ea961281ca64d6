//! Logging in, registering and logging out.
//!
//! The server keeps the session in an HTTP-only cookie, so these actions are
//! mostly about keeping the local caches consistent with it: logging in makes
//! the cached session stale, logging out drops every cached answer.

use std::fmt::Debug;

use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{BudgeteurClient, Error, endpoints};

/// The credentials for logging in.
#[derive(Clone, Serialize)]
pub struct LogInData {
    /// The email the user registered with.
    pub email: String,
    /// The plain text password.
    pub password: String,
}

impl Debug for LogInData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogInData")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// The details for creating an account.
#[derive(Clone, Serialize)]
pub struct RegisterData {
    /// The display name.
    pub name: String,
    /// The email to log in with.
    pub email: String,
    /// The plain text password.
    pub password: String,
}

impl Debug for RegisterData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterData")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// An account, as returned when logging in or registering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The user's ID.
    pub id: String,
    /// The user's display name.
    pub name: String,
    /// The user's email address.
    pub email: String,
    /// When the account was created.
    #[serde(with = "crate::timestamp")]
    pub created_at: OffsetDateTime,
    /// When the account was last changed.
    #[serde(with = "crate::timestamp")]
    pub updated_at: OffsetDateTime,
}

/// The body of the log in and register responses.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LogInResponse {
    /// A human readable status message.
    #[serde(default)]
    pub message: Option<String>,
    /// The account, when the server includes it.
    #[serde(default)]
    pub data: Option<User>,
}

impl BudgeteurClient {
    /// Log in with `credentials`. The server sets the auth cookie.
    ///
    /// On success the cached session is marked stale, so the next check
    /// picks up the new user.
    ///
    /// # Errors
    ///
    /// Returns [Error::Unauthenticated] for wrong credentials, or the server's
    /// error for anything else. A response without the user is an
    /// [Error::InvalidResponse].
    pub async fn log_in(&self, credentials: &LogInData) -> Result<User, Error> {
        let response: LogInResponse = self
            .api()
            .post(endpoints::LOG_IN, credentials)
            .await
            .inspect_err(|error| tracing::warn!("Log in failed: {error}"))?;

        self.session().invalidate();

        let user = response.data.ok_or_else(|| {
            Error::InvalidResponse("the log in response did not include the user".to_owned())
        })?;
        tracing::info!("Logged in as {}", user.email);

        Ok(user)
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidEmail] without a request if the email is not a
    /// valid address, otherwise the server's error, e.g. when the email is
    /// already registered.
    pub async fn register(&self, details: &RegisterData) -> Result<LogInResponse, Error> {
        let email = details.email.trim();
        if !EmailAddress::is_valid(email) {
            return Err(Error::InvalidEmail(email.to_owned()));
        }

        let details = RegisterData {
            email: email.to_owned(),
            ..details.clone()
        };

        self.api()
            .post(endpoints::REGISTER, &details)
            .await
            .inspect(|_| tracing::info!("Registered {email}"))
    }

    /// Log out.
    ///
    /// On success the session and every cached transaction are dropped, so
    /// nothing from this user is shown to the next one.
    ///
    /// # Errors
    ///
    /// Returns the server's error. The caches are kept in that case.
    pub async fn log_out(&self) -> Result<(), Error> {
        let _: serde_json::Value = self.api().post_empty(endpoints::LOG_OUT).await?;

        self.session().clear();
        self.transactions().clear_all();
        tracing::info!("Logged out");

        Ok(())
    }
}

#[cfg(test)]
mod auth_tests {
    use axum::http::StatusCode;

    use crate::{
        BudgeteurClient, Error, PageRequest,
        session::SessionState,
        test_utils::{MockApi, spawn_mock_api},
    };

    use super::{LogInData, RegisterData};

    fn client_for(api: &MockApi) -> BudgeteurClient {
        BudgeteurClient::new(api.config()).expect("could not build client")
    }

    fn alice(password: &str) -> LogInData {
        LogInData {
            email: "alice@example.com".to_owned(),
            password: password.to_owned(),
        }
    }

    #[test]
    fn debug_output_hides_passwords() {
        let log_in = format!("{:?}", alice("hunter2"));
        let register = format!(
            "{:?}",
            RegisterData {
                name: "Alice".to_owned(),
                email: "alice@example.com".to_owned(),
                password: "hunter2".to_owned(),
            }
        );

        assert!(!log_in.contains("hunter2"), "got {log_in}");
        assert!(!register.contains("hunter2"), "got {register}");
        assert!(log_in.contains("alice@example.com"));
    }

    #[tokio::test]
    async fn log_in_returns_the_user() {
        let api = spawn_mock_api().await;
        let client = client_for(&api);

        let user = client.log_in(&alice("hunter2")).await.unwrap();

        assert_eq!(user.id, "user-1");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(api.state.csrf_tokens_issued(), 0);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthenticated() {
        let api = spawn_mock_api().await;
        let client = client_for(&api);

        let result = client.log_in(&alice("wrong")).await;

        assert_eq!(result, Err(Error::Unauthenticated));
    }

    #[tokio::test]
    async fn log_in_makes_the_cached_session_stale() {
        let api = spawn_mock_api().await;
        let client = client_for(&api);
        assert_eq!(client.session().check().await.user, None);
        api.state.set_profile_status(StatusCode::OK);

        assert_eq!(client.session().check().await.user, None, "still cached");
        client.log_in(&alice("hunter2")).await.unwrap();

        let session = client.session().check().await;
        assert_eq!(session.user.map(|user| user.name), Some("Alice".to_owned()));
        assert_eq!(api.state.hits("GET /profile"), 2);
    }

    #[tokio::test]
    async fn register_rejects_invalid_email_locally() {
        let api = spawn_mock_api().await;
        let client = client_for(&api);

        let result = client
            .register(&RegisterData {
                name: "Bob".to_owned(),
                email: "not an email".to_owned(),
                password: "hunter2".to_owned(),
            })
            .await;

        assert_eq!(result, Err(Error::InvalidEmail("not an email".to_owned())));
        assert_eq!(api.state.hits("POST /register"), 0);
    }

    #[tokio::test]
    async fn register_surfaces_server_message() {
        let api = spawn_mock_api().await;
        let client = client_for(&api);

        let error = client
            .register(&RegisterData {
                name: "Bob".to_owned(),
                email: crate::test_utils::TAKEN_EMAIL.to_owned(),
                password: "hunter2".to_owned(),
            })
            .await
            .unwrap_err();

        assert_eq!(error.message_or("Registration failed"), "email already registered");
    }

    #[tokio::test]
    async fn register_returns_the_new_account() {
        let api = spawn_mock_api().await;
        let client = client_for(&api);

        let response = client
            .register(&RegisterData {
                name: "Bob".to_owned(),
                email: " bob@example.com ".to_owned(),
                password: "hunter2".to_owned(),
            })
            .await
            .unwrap();

        assert_eq!(
            response.data.map(|user| user.email),
            Some("bob@example.com".to_owned())
        );
    }

    #[tokio::test]
    async fn log_out_clears_every_cache() {
        let api = spawn_mock_api().await;
        api.state.seed_transactions(3);
        api.state.set_profile_status(StatusCode::OK);
        let client = client_for(&api);
        client.session().check().await;
        client.transactions().list(PageRequest::default()).await;

        client.log_out().await.unwrap();

        assert_eq!(client.session().state(), SessionState::Loading);
        assert_eq!(api.state.mutation_csrf_headers(), vec![Some("token-1".to_owned())]);

        client.transactions().list(PageRequest::default()).await;
        assert_eq!(api.state.hits("GET /transactions"), 2);
    }
}
