//! Response building and error mapping
//!
//! | Error | Status |
//! | --- | --- |
//! | `Busy` | 429 |
//! | `NotFound` | 404 |
//! | `InvalidInput`, `InvalidOrder` | 400 |
//! | `CapabilityFailure` | 502 |
//! | anything else | 500 |
//!
//! Error bodies are `{"detail": "<message>"}`.

use futures::stream::BoxStream;
use futures::StreamExt;
use porfiry_core::AssemblyError;
use serde::Serialize;
use std::convert::Infallible;
use warp::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::reply::Response;
use warp::{Rejection, Reply};

/// Status code for an assembly error
#[must_use]
pub fn status_for(err: &AssemblyError) -> StatusCode {
    match err {
        AssemblyError::Busy { .. } => StatusCode::TOO_MANY_REQUESTS,
        AssemblyError::NotFound(_) => StatusCode::NOT_FOUND,
        AssemblyError::InvalidInput(_) | AssemblyError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
        AssemblyError::CapabilityFailure(_) => StatusCode::BAD_GATEWAY,
        AssemblyError::Config(_) | AssemblyError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct Detail<'a> {
    detail: &'a str,
}

/// `{"detail": ..}` with `status`
#[must_use]
pub fn detail(status: StatusCode, message: &str) -> Response {
    warp::reply::with_status(warp::reply::json(&Detail { detail: message }), status).into_response()
}

/// Error response for `err`
#[must_use]
pub fn error(err: &AssemblyError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::warn!(error = %err, status = status.as_u16(), "request failed");
    }
    detail(status, &err.to_string())
}

/// JSON body on success, mapped error otherwise
#[must_use]
pub fn json<T: Serialize>(result: Result<T, AssemblyError>) -> Response {
    match result {
        Ok(value) => warp::reply::json(&value).into_response(),
        Err(err) => error(&err),
    }
}

/// Chunked body forwarding `chunks` as they are produced
#[must_use]
pub fn streaming(
    chunks: BoxStream<'static, String>,
    content_type: &'static str,
    headers: &[(&'static str, &'static str)],
) -> Response {
    let mut response = Response::new(Body::wrap_stream(chunks.map(Ok::<_, Infallible>)));
    let map = response.headers_mut();
    map.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    for (name, value) in headers {
        map.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

/// Turn filter rejections into `{"detail"}` responses
///
/// # Errors
/// Never; the error type only satisfies `recover`.
pub async fn recover(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "content length required".to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".to_string())
    } else {
        tracing::warn!(?rejection, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(detail(status, &message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(status_for(&AssemblyError::Busy { capability: "ocr".into() }), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(&AssemblyError::not_found("report")), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AssemblyError::InvalidOrder("dup".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AssemblyError::invalid_input("bad")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AssemblyError::CapabilityFailure("down".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&AssemblyError::Config("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
