//! Request extractors that reject with JSON errors.

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use paywall_core::Caller;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::ApiError;

/// Header carrying the already-authenticated caller
pub const USER_ID_HEADER: &str = "x-user-id";

/// JSON body extractor that rejects with [`ApiError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// The caller identity set by the upstream auth layer.
#[derive(Debug, Clone)]
pub struct CallerId(pub Caller);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|user_id| Self(Caller::new(user_id)))
            .ok_or(ApiError::Unauthenticated)
    }
}
