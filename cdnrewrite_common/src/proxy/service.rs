use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    debug_handler,
    extract::State,
    http::{HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
};
use hyper::header::{
    ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, HOST, TRANSFER_ENCODING,
};
use hyper::{HeaderMap, StatusCode};
use scorched::{logf, LogData, LogImportance};

use crate::{error::Result, state::ProxyState};

/// Headers that only make sense for a single hop.
const HOP_BY_HOP: [&str; 6] = [
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    headers.remove(CONNECTION);
    headers.remove(TRANSFER_ENCODING);
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Forward the request to the upstream origin and hand its response back.
///
/// reqwest decompresses upstream bodies, so the encoding and length headers of the upstream
/// response no longer apply and are dropped. Request bodies are capped by the router's
/// `DefaultBodyLimit`, so an oversized upload is answered with `413 Payload Too Large`.
#[debug_handler]
pub async fn proxy(
    State(state): State<Arc<ProxyState>>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
    body_bytes: Bytes,
) -> Result<Response> {
    let forwarded_host = headers.remove(HOST);
    strip_hop_by_hop(&mut headers);
    headers.remove(CONTENT_LENGTH);

    headers
        .insert(HOST, HeaderValue::from_str(&state.upstream.authority())?);

    headers.insert(
        ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, br, deflate, zstd"),
    );

    if let Some(host) = forwarded_host {
        headers.insert("x-forwarded-host", host);
    }

    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.upstream, path);

    let res = match state
        .client
        .request(method, &url)
        .headers(headers)
        .body(body_bytes)
        .send()
        .await
    {
        Ok(res) => res,
        Err(e) => {
            logf!(Error, "Error contacting upstream {}: {:?}", url, e);
            return Ok((StatusCode::BAD_GATEWAY, "Upstream unavailable").into_response());
        }
    };

    let mut headers = res.headers().clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(CONTENT_ENCODING);
    headers.remove(CONTENT_LENGTH);

    let mut response_builder = Response::builder().status(res.status().as_u16());
    if let Some(builder_headers) = response_builder.headers_mut() {
        *builder_headers = headers;
    }

    match response_builder.body(Body::from_stream(res.bytes_stream())) {
        Ok(response) => Ok(response),
        Err(e) => {
            logf!(Error, "Error building response: {:?}", e);
            Ok((StatusCode::INTERNAL_SERVER_ERROR, "Error building response").into_response())
        }
    }
}
