//! The API endpoint URIs, relative to the configured base URL.
//!
//! For endpoints that take a parameter, e.g., '/transactions/{transaction_id}', use [format_endpoint].

/// The route for resolving the current session from the auth cookie.
pub const PROFILE: &str = "/profile";
/// The route for logging in a user. Sets the auth cookie.
pub const LOG_IN: &str = "/login";
/// The route for creating an account.
pub const REGISTER: &str = "/register";
/// The route for clearing the current session.
pub const LOG_OUT: &str = "/logout";
/// The route for fetching a CSRF token for a subsequent mutation.
pub const CSRF_TOKEN: &str = "/csrf-token";
/// The route for listing transactions a page at a time, and for creating them.
pub const TRANSACTIONS: &str = "/transactions";
/// The route for searching, filtering and sorting transactions.
pub const TRANSACTIONS_QUERY: &str = "/transactions-query/";
/// The route for deleting a transaction.
pub const TRANSACTION: &str = "/transactions/{transaction_id}";
/// The route for fetching and updating a single transaction.
pub const TRANSACTION_V1: &str = "/api/v1/transactions/{transaction_id}";

/// The view that unauthenticated visitors are sent to.
pub const SIGN_IN_VIEW: &str = "/auth/signin";
/// The landing view for logged in users.
pub const DASHBOARD_VIEW: &str = "/dashboard";

/// Paths containing any of these never carry a CSRF token.
pub(crate) const CSRF_EXEMPT: [&str; 3] = [LOG_IN, REGISTER, CSRF_TOKEN];

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/transactions/{transaction_id}', '{transaction_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: &str) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_string();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|end| param_start + end + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}
