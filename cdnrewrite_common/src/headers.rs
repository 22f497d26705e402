//! Response headers that report what the rewrite stage did.
//!
//! Header names are case-insensitive on the wire and the `http` crate stores them lowercased, so
//! `X-CDN-Assets` reaches the client as `x-cdn-assets`.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::rewriting::{config::RewriteConfig, rewriter::RewriteResult};

pub const X_CDN_MODULE: HeaderName = HeaderName::from_static("x-cdn-module");
pub const X_CDN_REWRITES: HeaderName = HeaderName::from_static("x-cdn-rewrites");
pub const X_CDN_DOMAIN: HeaderName = HeaderName::from_static("x-cdn-domain");
pub const X_CDN_DIR: HeaderName = HeaderName::from_static("x-cdn-dir");
pub const X_CDN_PREFETCH: HeaderName = HeaderName::from_static("x-cdn-prefetch");

const INSTALLED: HeaderValue = HeaderValue::from_static("Installed");
const ACTIVE: HeaderValue = HeaderValue::from_static("Active");
const ENABLED: HeaderValue = HeaderValue::from_static("Enabled");

/// Mark the response as having passed through the rewrite stage.
pub fn mark_installed(headers: &mut HeaderMap) {
    headers.insert(X_CDN_MODULE, INSTALLED);
}

/// Annotate a response the gatekeeper let through. `result` is `None` when the body itself was
/// not eligible for rewriting.
pub fn annotate(headers: &mut HeaderMap, config: &RewriteConfig, result: Option<&RewriteResult>) {
    headers.insert(X_CDN_REWRITES, ENABLED);
    headers.insert(X_CDN_MODULE, ACTIVE);

    if !config.add_debug_headers {
        return;
    }

    insert_value(headers, X_CDN_DOMAIN, &config.cdn_domain);
    insert_value(headers, X_CDN_DIR, &config.normalized_subdirectory());

    let Some(result) = result else {
        return;
    };

    for category in &result.applied_categories {
        match category_header(category) {
            Some(name) => {
                headers.insert(name, ENABLED);
            }
            None => warn!(category = %category, "category name is not a valid header name"),
        }
    }

    if result.prefetch_applied {
        headers.insert(X_CDN_PREFETCH, ENABLED);
    }
}

/// `assets` -> `x-cdn-assets`
pub fn category_header(category: &str) -> Option<HeaderName> {
    HeaderName::from_bytes(format!("x-cdn-{}", category.to_ascii_lowercase()).as_bytes()).ok()
}

fn insert_value(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!(header = %name, value, "skipping header with invalid value"),
    }
}
