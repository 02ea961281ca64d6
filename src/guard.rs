//! Middleware that decides, before a view renders, whether the visitor may see it.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Uri,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use crate::{
    endpoints,
    session::{PrivilegedSessionRelay, SessionCookies, SessionResponse},
};

/// Who a view is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRequirement {
    /// Only logged in users, e.g. the dashboard.
    Authenticated,
    /// Only anonymous visitors, e.g. the sign-in page.
    Anonymous,
}

/// What to do with a request for a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Render the view.
    Proceed,
    /// Send the visitor to this path instead.
    Redirect(&'static str),
}

/// Decide whether a visitor with `session` may see a view with `requirement`.
pub fn decide(requirement: SessionRequirement, session: &SessionResponse) -> GateDecision {
    match (requirement, session.user.is_some()) {
        (SessionRequirement::Authenticated, false) => {
            GateDecision::Redirect(endpoints::SIGN_IN_VIEW)
        }
        (SessionRequirement::Anonymous, true) => GateDecision::Redirect(endpoints::DASHBOARD_VIEW),
        _ => GateDecision::Proceed,
    }
}

/// The state needed by the session middleware.
#[derive(Debug, Clone)]
pub struct GuardState {
    /// Resolves the session from the request's cookies.
    pub relay: Arc<PrivilegedSessionRelay>,
}

/// Middleware that only lets logged in users through.
///
/// Anonymous visitors are redirected to the sign-in view with a `redirect_url`
/// query parameter pointing back at the requested page.
///
/// **Note**: Route handlers can use the function argument
/// `Extension(user): Extension<UserIdentity>` to receive the logged in user.
pub async fn require_session(
    State(state): State<GuardState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session = state.relay.resolve(&SessionCookies::from_jar(&jar)).await;

    match decide(SessionRequirement::Authenticated, &session) {
        GateDecision::Proceed => {
            if let Some(user) = session.user {
                request.extensions_mut().insert(user);
            }
            next.run(request).await
        }
        GateDecision::Redirect(view) => {
            let target = safe_redirect_target(request.uri());
            Redirect::to(&build_redirect_url(view, target.as_deref())).into_response()
        }
    }
}

/// Middleware for views that only make sense when logged out, e.g. sign in.
///
/// Logged in users are sent to the page in the `redirect_url` query parameter
/// if it is a safe local path, otherwise to the dashboard.
pub async fn redirect_if_signed_in(
    State(state): State<GuardState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let session = state.relay.resolve(&SessionCookies::from_jar(&jar)).await;

    match decide(SessionRequirement::Anonymous, &session) {
        GateDecision::Proceed => next.run(request).await,
        GateDecision::Redirect(view) => {
            let target = requested_redirect(request.uri()).unwrap_or_else(|| view.to_owned());
            Redirect::to(&target).into_response()
        }
    }
}

/// Whether `target` is a local path that is not the sign-in view itself.
fn is_safe_redirect_target(target: &str) -> bool {
    if !target.starts_with('/') || target.starts_with("//") {
        return false;
    }

    let path = target.split_once('?').map_or(target, |(path, _)| path);
    path != endpoints::SIGN_IN_VIEW
}

fn safe_redirect_target(uri: &Uri) -> Option<String> {
    let path_and_query = uri.path_and_query()?.as_str();

    is_safe_redirect_target(path_and_query).then(|| path_and_query.to_owned())
}

/// The `redirect_url` query parameter of `uri`, if it is safe to follow.
fn requested_redirect(uri: &Uri) -> Option<String> {
    let params: Vec<(String, String)> = serde_urlencoded::from_str(uri.query()?).ok()?;

    params
        .into_iter()
        .find(|(name, _)| name == "redirect_url")
        .map(|(_, target)| target)
        .filter(|target| is_safe_redirect_target(target))
}

fn build_redirect_url(view: &str, target: Option<&str>) -> String {
    let Some(target) = target else {
        return view.to_owned();
    };

    match serde_urlencoded::to_string([("redirect_url", target)]) {
        Ok(param) => format!("{view}?{param}"),
        Err(error) => {
            tracing::error!("Could not encode redirect URL {target}: {error}");
            view.to_owned()
        }
    }
}
