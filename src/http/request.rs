//! Request context extraction.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the caller sends none
//! - Read the calling principal and cache directive from headers
//!
//! # Design Decisions
//! - Absent identity headers mean the anonymous principal; malformed ones are rejected
//! - Only `true` and `1` enable `x-no-cache`

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::datasource::Principal;
use crate::http::response::ErrorBody;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_USER_ID: &str = "x-dispatch-user-id";
pub const X_ORG_ID: &str = "x-dispatch-org-id";
pub const X_LOGIN: &str = "x-dispatch-login";
pub const X_NO_CACHE: &str = "x-no-cache";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestContextError {
    #[error("Invalid {0} header")]
    InvalidHeader(&'static str),
}

impl IntoResponse for RequestContextError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Rejected request context");
        let body = ErrorBody {
            message: self.to_string(),
            error: None,
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Who is calling and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub principal: Principal,
    pub skip_cache: bool,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, RequestContextError> {
        let anonymous = Principal::anonymous();
        let principal = Principal {
            user_id: parse_header(headers, X_USER_ID)?.unwrap_or(anonymous.user_id),
            org_id: parse_header(headers, X_ORG_ID)?.unwrap_or(anonymous.org_id),
            login: header_str(headers, X_LOGIN)?
                .map(str::to_string)
                .unwrap_or(anonymous.login),
        };

        let skip_cache = matches!(header_str(headers, X_NO_CACHE)?, Some("true" | "1"));
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Self {
            principal,
            skip_cache,
            request_id,
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = RequestContextError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, RequestContextError> {
    headers
        .get(name)
        .map(|v| v.to_str().map(str::trim).map_err(|_| RequestContextError::InvalidHeader(name)))
        .transpose()
}

fn parse_header(headers: &HeaderMap, name: &'static str) -> Result<Option<i64>, RequestContextError> {
    header_str(headers, name)?
        .map(|v| v.parse().map_err(|_| RequestContextError::InvalidHeader(name)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_anonymous_when_absent() {
        let ctx = RequestContext::from_headers(&HeaderMap::new()).unwrap();
        assert_eq!(ctx.principal, Principal::anonymous());
        assert!(!ctx.skip_cache);
        assert_eq!(ctx.request_id, None);
    }

    #[test]
    fn test_principal_from_headers() {
        let ctx = RequestContext::from_headers(&headers(&[
            (X_USER_ID, "42"),
            (X_ORG_ID, "3"),
            (X_LOGIN, "ops"),
            (X_NO_CACHE, "1"),
            (X_REQUEST_ID, "req-1"),
        ]))
        .unwrap();
        assert_eq!(ctx.principal.user_id, 42);
        assert_eq!(ctx.principal.org_id, 3);
        assert_eq!(ctx.principal.login, "ops");
        assert!(ctx.skip_cache);
        assert_eq!(ctx.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_malformed_id_rejected() {
        let err = RequestContext::from_headers(&headers(&[(X_USER_ID, "alice")])).unwrap_err();
        assert_eq!(err, RequestContextError::InvalidHeader(X_USER_ID));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_no_cache_values() {
        for (value, expected) in [("true", true), ("1", true), ("false", false), ("yes", false)] {
            let ctx = RequestContext::from_headers(&headers(&[(X_NO_CACHE, value)])).unwrap();
            assert_eq!(ctx.skip_cache, expected, "x-no-cache: {value}");
        }
    }

    #[test]
    fn test_uuid_request_ids_are_unique() {
        let mut maker = UuidRequestId;
        let req = Request::new(());
        let a = maker.make_request_id(&req).unwrap();
        let b = maker.make_request_id(&req).unwrap();
        assert_ne!(a.header_value(), b.header_value());
        assert_eq!(a.header_value().len(), 36);
    }
}
