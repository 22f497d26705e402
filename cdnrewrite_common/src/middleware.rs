use std::{collections::HashMap, iter};

use axum::{
    body::{Body, Bytes},
    extract::{Query, Request, State},
    http::{
        header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, Method,
    },
    middleware::Next,
    response::Response,
};
use futures_util::{stream, StreamExt};
use scorched::{logf, LogData, LogImportance};
use tracing::debug;

use crate::{
    headers,
    rewriting::rewriter::Rewriter,
    state::{Config, RewriteState},
};

/// The CDN rewrite stage. Runs the inner service, then rewrites and annotates its response when
/// the gatekeeper allows it. Never fails: anything that cannot be rewritten passes through.
pub async fn cdn_rewrite(
    State(state): State<RewriteState>,
    req: Request,
    next: Next,
) -> Response {
    let is_head = req.method() == Method::HEAD;
    let path = req.uri().path().to_owned();
    let query = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();

    let mut response = next.run(req).await;
    headers::mark_installed(response.headers_mut());

    let config = state.rewrite_config();
    let decision = state.gatekeeper.decide(&path, &query, config);
    if !decision.is_allowed() {
        debug!(path = %path, reason = %decision, "CDN rewrite skipped");
        return response;
    }

    if is_head || !is_rewritable(&state.config, response.headers()) {
        headers::annotate(response.headers_mut(), config, None);
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match buffer_body(body, state.config.max_body_size).await {
        Buffered::Complete(bytes) => bytes,
        Buffered::Passthrough(body) => {
            debug!(path = %path, "response body not buffered, passing it through");
            headers::annotate(&mut parts.headers, config, None);
            return Response::from_parts(parts, body);
        }
    };

    let result = match std::str::from_utf8(&bytes) {
        Ok(text) => state.rewriter.rewrite(text),
        Err(_) => {
            debug!(path = %path, "response body is not UTF-8, leaving it alone");
            headers::annotate(&mut parts.headers, config, None);
            return Response::from_parts(parts, Body::from(bytes));
        }
    };

    debug!(
        path = %path,
        categories = ?result.applied_categories,
        prefetch = result.prefetch_applied,
        "CDN rewrite applied"
    );

    headers::annotate(&mut parts.headers, config, Some(&result));
    parts.headers.remove(CONTENT_LENGTH);

    Response::from_parts(parts, Body::from(result.body))
}

enum Buffered {
    Complete(Vec<u8>),
    /// The body as it was, for when it overran the limit or failed mid-read
    Passthrough(Body),
}

/// Collect `body` if it fits in `limit` bytes. Otherwise the chunks read so far are replayed in
/// front of the rest of the stream.
async fn buffer_body(body: Body, limit: usize) -> Buffered {
    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut length = 0;

    while let Some(item) = data.next().await {
        match item {
            Ok(chunk) if length + chunk.len() <= limit => {
                length += chunk.len();
                chunks.push(chunk);
            }
            item => {
                if let Err(e) = &item {
                    logf!(Error, "Error buffering response: {:?}", e);
                }
                let replay = chunks.into_iter().map(Ok).chain(iter::once(item));
                return Buffered::Passthrough(Body::from_stream(stream::iter(replay).chain(data)));
            }
        }
    }

    Buffered::Complete(chunks.concat())
}

/// Only uncompressed bodies of a configured content type, small enough to buffer, are rewritten.
fn is_rewritable(config: &Config, headers: &HeaderMap) -> bool {
    if headers.contains_key(CONTENT_ENCODING) {
        return false;
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !config
        .rewrite_content_types
        .iter()
        .any(|ty| content_type.contains(ty.as_str()))
    {
        return false;
    }

    let declared_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    declared_length.map_or(true, |length| length <= config.max_body_size)
}
