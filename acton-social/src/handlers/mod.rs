//! HTTP handlers for the social login routes
//!
//! [`router`] mounts everything under the configured base path:
//!
//! | Route                      | Method     | Purpose                              |
//! |----------------------------|------------|--------------------------------------|
//! | `/`                        | GET        | Login gateway, one link per strategy |
//! | `/{strategy}`              | GET        | Redirect to the provider             |
//! | `/finished`                | GET, POST  | Provider callback                    |
//! | `/profile-completion`      | GET, POST  | Finish a suspended registration      |
//!
//! # Example
//!
//! ```rust,no_run
//! use acton_social::{handlers, state::SocialLoginState};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let state = SocialLoginState::new()?;
//! let app = axum::Router::new().merge(handlers::router(state));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

use crate::completion::CompletionOutcome;
use crate::config::CallbackTransport;
use crate::error::SocialLoginError;
use crate::forms::{ProfileCompletionForm, ValidationErrors};
use crate::orchestrator::BACK_URL_KEY;
use crate::session::{Session, SessionLayer};
use crate::state::SocialLoginState;
use crate::strategy::InitiateRequest;
use crate::views;
use axum::{
    extract::{rejection::FormRejection, Path, Query, Request, State},
    http::{header::LOCATION, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use axum_htmx::{HxRedirect, HxRequest};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

/// Session key holding the CSRF state of the pending authorization
pub const OAUTH_STATE_KEY: &str = "oauth2_state";

/// Session key holding the PKCE verifier of the pending authorization
pub const PKCE_VERIFIER_KEY: &str = "oauth2_pkce_verifier";

/// Query parameters accepted by the gateway and initiate routes
#[derive(Debug, Default, Deserialize)]
pub struct BackUrlParams {
    /// Where to return after a successful login
    #[serde(rename = "BackURL")]
    pub back_url: Option<String>,
}

/// Parameters carrying the provider response on `get` and `post` transports
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Base64 encoded response
    pub opauth: Option<String>,
}

/// Build the social login router
///
/// Routes are nested under `base_path` and wrapped in the session layer, and
/// in an HTTP trace layer unless tracing is disabled.
pub fn router(state: SocialLoginState) -> Router {
    let base_path = state.config().base_path.trim_end_matches('/').to_string();
    let sessions = state.sessions();
    let observability = state.observability().clone();

    let routes = Router::new()
        .route("/", get(gateway))
        .route("/finished", get(callback_get).post(callback_post))
        .route(
            "/profile-completion",
            get(completion_form).post(completion_submit),
        )
        .route("/{strategy}", get(initiate))
        .with_state(state);

    let router = if base_path.is_empty() {
        Router::new().merge(routes)
    } else {
        Router::new().nest(&base_path, routes)
    };

    let router = router.layer(SessionLayer::new(sessions));
    if !observability.tracing_enabled {
        return router;
    }

    let service = observability.service_name;
    router.layer(
        TraceLayer::new_for_http().make_span_with(move |request: &Request| {
            tracing::info_span!(
                "social_login",
                service = %service,
                method = %request.method(),
                uri = %request.uri(),
            )
        }),
    )
}

/// GET {base}/ - Login gateway
pub async fn gateway(
    State(state): State<SocialLoginState>,
    session: Session,
    Query(params): Query<BackUrlParams>,
) -> Result<Html<String>, SocialLoginError> {
    let back_url = remember_back_url(&session, params.back_url)?;

    Ok(Html(views::gateway(
        state.strategies(),
        &state.config().base_path,
        back_url.as_deref(),
    )))
}

/// GET {base}/{strategy} - Redirect to the provider's authorization page
///
/// # Errors
///
/// [`SocialLoginError::Strategy`] if the strategy is unknown or cannot build
/// its redirect
pub async fn initiate(
    State(state): State<SocialLoginState>,
    session: Session,
    Path(strategy_key): Path<String>,
    Query(params): Query<BackUrlParams>,
) -> Result<Response, SocialLoginError> {
    let strategy = state.strategies().get(&strategy_key)?;
    remember_back_url(&session, params.back_url)?;

    let target = strategy.initiate(&InitiateRequest {
        callback_url: state.config().callback_url(),
    })?;

    if let Some(csrf_state) = target.state {
        session.set(OAUTH_STATE_KEY, csrf_state)?;
    }
    if let Some(verifier) = target.pkce_verifier {
        session.set(PKCE_VERIFIER_KEY, verifier)?;
    }

    tracing::info!(strategy = %strategy.key(), "Redirecting to provider");
    Ok(found(&target.url))
}

/// GET {base}/finished - Provider callback on the `session` and `get` transports
pub async fn callback_get(
    State(state): State<SocialLoginState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Result<Response, SocialLoginError> {
    let encoded = transport_param(&state, CallbackTransport::Get, params.opauth);
    finish_callback(&state, &session, encoded.as_deref()).await
}

/// POST {base}/finished - Provider callback on the `post` transport
pub async fn callback_post(
    State(state): State<SocialLoginState>,
    session: Session,
    form: Result<Form<CallbackParams>, FormRejection>,
) -> Result<Response, SocialLoginError> {
    let submitted = form.ok().and_then(|Form(params)| params.opauth);
    let encoded = transport_param(&state, CallbackTransport::Post, submitted);
    finish_callback(&state, &session, encoded.as_deref()).await
}

/// GET {base}/profile-completion - Show the completion form
pub async fn completion_form(
    State(state): State<SocialLoginState>,
    session: Session,
) -> Result<Response, SocialLoginError> {
    match state.completion().prepare(&session).await {
        Ok(form) => Ok(Html(views::completion_form(
            &form,
            &ValidationErrors::new(),
            state.orchestrator().completion_path(),
        ))
        .into_response()),
        Err(SocialLoginError::ExpiredOrInvalidSession) => Ok(expired(&state)),
        Err(e) => Err(e),
    }
}

/// POST {base}/profile-completion - Submit the completion form
///
/// HTMX submissions that succeed get an `HX-Redirect`; plain submissions a
/// `302`. Rejected submissions re-render the form with `422`.
pub async fn completion_submit(
    State(state): State<SocialLoginState>,
    session: Session,
    HxRequest(is_htmx): HxRequest,
    Form(form): Form<ProfileCompletionForm>,
) -> Result<Response, SocialLoginError> {
    match state.completion().resume(&session, form).await {
        Ok(CompletionOutcome::Completed(outcome)) => {
            let redirect = outcome.redirect_url();
            tracing::info!(redirect = %redirect, htmx = is_htmx, "Profile completion finished");
            if is_htmx {
                Ok((HxRedirect::from(redirect), StatusCode::OK).into_response())
            } else {
                Ok(found(redirect))
            }
        }
        Ok(CompletionOutcome::Invalid { errors, form }) => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Html(views::completion_form(
                &form,
                &errors,
                state.orchestrator().completion_path(),
            )),
        )
            .into_response()),
        Err(SocialLoginError::ExpiredOrInvalidSession) => Ok(expired(&state)),
        Err(e) => Err(e),
    }
}

async fn finish_callback(
    state: &SocialLoginState,
    session: &Session,
    encoded: Option<&str>,
) -> Result<Response, SocialLoginError> {
    let orchestrator = state.orchestrator();
    let response = orchestrator.read_response(session, encoded);
    let outcome = orchestrator.handle_callback(&response, session).await?;

    tracing::info!(redirect = %outcome.redirect_url(), "Callback finished");
    Ok(found(outcome.redirect_url()))
}

// The request parameter only counts when it arrived on the configured transport
fn transport_param(
    state: &SocialLoginState,
    method: CallbackTransport,
    param: Option<String>,
) -> Option<String> {
    let transport = state.orchestrator().transport();
    if transport == method {
        param
    } else {
        if param.is_some() {
            tracing::warn!(transport = %transport, received = %method, "Ignoring response on wrong transport");
        }
        None
    }
}

/// Store `BackURL` in the session when it is a local path
fn remember_back_url(
    session: &Session,
    back_url: Option<String>,
) -> Result<Option<String>, SocialLoginError> {
    let Some(back_url) = back_url.filter(|url| !url.is_empty()) else {
        return Ok(None);
    };

    if !is_local_path(&back_url) {
        tracing::warn!(back_url = %back_url, "Ignoring non-local BackURL");
        return Ok(None);
    }

    session.set(BACK_URL_KEY, &back_url)?;
    Ok(Some(back_url))
}

/// Whether `url` is a path on this site
///
/// Protocol-relative (`//host`) and backslash forms are rejected since
/// browsers treat them as absolute.
#[must_use]
pub fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains('\\')
}

fn found(url: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, url.to_string())]).into_response()
}

fn expired(state: &SocialLoginState) -> Response {
    let error = SocialLoginError::ExpiredOrInvalidSession;
    tracing::warn!(error = %error, "Profile completion unavailable");
    (
        error.status_code(),
        Html(views::permission_failure(
            &error.user_message(),
            Some(&state.config().base_path),
        )),
    )
        .into_response()
}
