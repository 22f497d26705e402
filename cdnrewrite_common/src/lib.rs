//! Rewrites site-relative asset URLs in HTML responses so they are served from a CDN.
//!
//! The rewrite stage is an axum middleware ([`middleware::cdn_rewrite`]) that can wrap any
//! router. [`serve`] wires it in front of a reverse proxy to an upstream origin.

pub mod error;
pub mod gate;
pub mod headers;
pub mod middleware;
pub mod proxy;
pub mod rewriting;
pub mod state;

use std::{future::Future, sync::Arc};

use axum::{extract::DefaultBodyLimit, middleware::from_fn_with_state, Router};
use error::Result;
use reqwest::redirect::Policy;
use scorched::{logf, LogData, LogImportance};
use state::{Config, ProxyState, RewriteState};
use tower_http::trace::TraceLayer;

/// Wrap `router` in the CDN rewrite stage.
pub fn with_cdn_rewrite(router: Router, state: RewriteState) -> Router {
    router.layer(from_fn_with_state(state, middleware::cdn_rewrite))
}

/// The proxy to `config.upstream` with the rewrite stage in front of it.
pub fn app(config: Arc<Config>) -> Result<Router> {
    config.validate()?;

    let client = reqwest::Client::builder()
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .zstd(true)
        .build()?;

    let proxystate = ProxyState {
        config: config.clone(),
        client,
        upstream: proxy::util::parse_origin(&config.upstream)?,
    };

    let rewritestate = RewriteState::new(config.clone())?;

    let proxyrouter = Router::new()
        .fallback(proxy::service::proxy)
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .with_state(Arc::new(proxystate));

    Ok(with_cdn_rewrite(proxyrouter, rewritestate).layer(TraceLayer::new_for_http()))
}

pub async fn serve<F>(config: Arc<Config>, graceful_shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = app(config.clone())?;

    let listener = tokio::net::TcpListener::bind(config.host).await?;
    logf!(
        Info,
        "Listening on {}, forwarding to {}",
        config.host,
        config.upstream
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
