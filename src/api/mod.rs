use crate::{
    identity::IdentityProvider,
    session::SessionCookies,
    storage::Store,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    handler::Handler,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    routing::{any, MethodRouter},
    Extension, Router,
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod error;
pub mod handlers;
pub mod middleware;
mod openapi;

#[cfg(test)]
pub(crate) mod test_support;


pub use openapi::openapi;

use handlers::{auth, health, login, password, profile, root, signup, trade};
use middleware::{fallback, method_filter, require_auth, AllowedMethods, CorsConfig};

pub type SharedIdentity = Arc<dyn IdentityProvider>;
pub type SharedStore = Arc<dyn Store>;

const REQUEST_ID: &str = "x-request-id";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// HTTP layer settings resolved at startup.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub cors: CorsConfig,
    pub cookies: SessionCookies,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors: CorsConfig::default(),
            cookies: SessionCookies::new(false),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        }
    }
}

/// Route accepting only `methods`, answered by `handler`.
fn public<H, T>(handler: H, methods: &[Method], cors: &CorsConfig) -> MethodRouter
where
    H: Handler<T, ()>,
    T: 'static,
{
    any(handler).layer(from_fn_with_state(
        AllowedMethods::new(methods, cors.clone()),
        method_filter,
    ))
}

/// Like [`public`], with the auth gate between the method check and the handler.
fn protected<H, T>(handler: H, methods: &[Method], cors: &CorsConfig) -> MethodRouter
where
    H: Handler<T, ()>,
    T: 'static,
{
    any(handler)
        .layer(from_fn(require_auth))
        .layer(from_fn_with_state(
            AllowedMethods::new(methods, cors.clone()),
            method_filter,
        ))
}

/// Build the application router.
#[must_use]
pub fn router(identity: SharedIdentity, store: SharedStore, config: &ApiConfig) -> Router {
    let cors = &config.cors;
    let get = &[Method::GET];
    let post = &[Method::POST];

    let swagger = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi());
    let docs = Router::from(swagger).route_layer(from_fn_with_state(
        AllowedMethods::new(get, cors.clone()),
        method_filter,
    ));

    Router::new()
        .route("/", public(root::root, get, cors))
        .route("/health", public(health::health, get, cors))
        .route("/signup", public(signup::signup, post, cors))
        .route("/confirmsignup", public(signup::confirm_signup, post, cors))
        .route(
            "/resendConfirmationCode",
            public(signup::resend_confirmation_code, post, cors),
        )
        .route("/login", public(login::login, post, cors))
        .route("/forgotPassword", public(password::forgot_password, post, cors))
        .route(
            "/confirmForgotPassword",
            public(password::confirm_forgot_password, post, cors),
        )
        .route("/auth", protected(auth::whoami, get, cors))
        .route("/profile", protected(profile::profile, get, cors))
        .route("/trade", protected(trade::add_trade, post, cors))
        .merge(docs)
        .fallback(fallback)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.request_timeout,
                ))
                .layer(Extension(identity))
                .layer(Extension(store))
                .layer(Extension(config.cookies.clone()))
                .layer(Extension(config.cors.clone())),
        )
}

/// Start the server
/// # Errors
/// Return error if the listener cannot be bound or the server fails
pub async fn new(
    port: u16,
    store: SharedStore,
    identity: SharedIdentity,
    config: ApiConfig,
) -> Result<()> {
    let app = router(identity, store, &config);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
