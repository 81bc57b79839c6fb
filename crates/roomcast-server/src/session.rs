//! Session identity from the handshake `Cookie` header.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use roomcast_core::SessionId;
use thiserror::Error;

/// Why a handshake carried no usable session id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// No `Cookie` header was sent.
    #[error("missing Cookie header")]
    MissingCookie,
    /// The `Cookie` header is not visible ASCII.
    #[error("Cookie header is not valid text")]
    InvalidHeader,
    /// The cookie pair has no `=` delimiter.
    #[error("malformed cookie pair")]
    Malformed,
    /// The named cookie is absent.
    #[error("cookie `{0}` not found")]
    CookieNotFound(String),
    /// The session value is empty.
    #[error("empty session id")]
    EmptySession,
}

/// Extract the session id from every `Cookie` header in `headers`.
///
/// Without a cookie name the first pair of the first header is used.
pub fn session_id_from_headers(
    headers: &HeaderMap,
    cookie_name: Option<&str>,
) -> Result<SessionId, HandshakeError> {
    let mut values = headers.get_all(COOKIE).iter().peekable();
    if values.peek().is_none() {
        return Err(HandshakeError::MissingCookie);
    }

    let Some(name) = cookie_name else {
        let first = values.next().ok_or(HandshakeError::MissingCookie)?;
        let header = first.to_str().map_err(|_| HandshakeError::InvalidHeader)?;
        return session_id_from_cookie(header, None);
    };

    for value in values {
        let header = value.to_str().map_err(|_| HandshakeError::InvalidHeader)?;
        match session_id_from_cookie(header, Some(name)) {
            Err(HandshakeError::CookieNotFound(_)) => {}
            other => return other,
        }
    }
    Err(HandshakeError::CookieNotFound(name.to_owned()))
}

/// Extract the session id from one `Cookie` header value.
///
/// The value is whatever follows the first `=` of the chosen pair, trimmed.
/// With `cookie_name` set, the pair whose name matches is chosen; otherwise
/// the first pair is.
pub fn session_id_from_cookie(
    header: &str,
    cookie_name: Option<&str>,
) -> Result<SessionId, HandshakeError> {
    let mut pairs = header.split(';').map(str::trim).filter(|p| !p.is_empty());

    let value = match cookie_name {
        None => {
            let pair = pairs.next().ok_or(HandshakeError::MissingCookie)?;
            let (_, value) = pair.split_once('=').ok_or(HandshakeError::Malformed)?;
            value
        }
        Some(name) => pairs
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value)
            .ok_or_else(|| HandshakeError::CookieNotFound(name.to_owned()))?,
    };

    let value = value.trim().trim_matches('"');
    if value.is_empty() {
        return Err(HandshakeError::EmptySession);
    }
    Ok(SessionId::new(value))
}
