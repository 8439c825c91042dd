use warp::http::HeaderMap;

use crate::constants::{SESSION_COOKIE, SESSION_HEADER};

/// Maximum accepted length of a session identifier
const MAX_SESSION_ID_LEN: usize = 128;

/// Resolves the caller's session identity from request headers.
///
/// Issuing sessions happens upstream; the lobby only reads them.
pub trait SessionProvider: Send + Sync {
    fn identity_from_request(&self, headers: &HeaderMap) -> Option<String>;
}

/// Reads `X-Session-Id`, falling back to the `sessionID` cookie
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderSessionProvider;

impl SessionProvider for HeaderSessionProvider {
    fn identity_from_request(&self, headers: &HeaderMap) -> Option<String> {
        // Priority 1: explicit header
        if let Some(value) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            if let Some(id) = sanitize(value) {
                log::trace!("Session extracted from {} header", SESSION_HEADER);
                return Some(id);
            }
        }

        // Priority 2: session cookie
        for header in headers.get_all("cookie") {
            let Ok(cookies) = header.to_str() else {
                continue;
            };
            for pair in cookies.split(';') {
                if let Some((name, value)) = pair.trim().split_once('=') {
                    if name == SESSION_COOKIE {
                        if let Some(id) = sanitize(value) {
                            log::trace!("Session extracted from {} cookie", SESSION_COOKIE);
                            return Some(id);
                        }
                    }
                }
            }
        }

        None
    }
}

fn sanitize(raw: &str) -> Option<String> {
    let id = raw.trim();
    if id.is_empty() || id.len() > MAX_SESSION_ID_LEN || id.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(id.to_string())
}
