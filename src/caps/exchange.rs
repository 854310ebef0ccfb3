//! Helpers for the HTTP exchange handed to capability handlers.

use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

/// Remote address of the client, when the listener recorded one.
///
/// Requests served by [`crate::http::serve`] always carry it; requests built
/// by hand (tests, embedding) may not.
pub fn remote_addr(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// An empty response with the given status that also tells the client not
/// to reuse the connection.
pub fn reject(status: StatusCode) -> Response {
    let mut response = status.into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
