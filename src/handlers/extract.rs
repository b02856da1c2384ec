//! Request extractors whose rejections render as [`ServiceError`] envelopes.
//!
//! axum's own `Json`, `Path` and `Query` reject with plain-text bodies. These
//! wrappers delegate to them and report failures as `validation_failure`.

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::ServiceError;

/// JSON request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

/// Path parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiPath<T>(pub T);

/// Query string parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(path_rejection(rejection)),
        }
    }
}

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ServiceError {
    debug!(status = %rejection.status(), "Rejected request body");
    ServiceError::ValidationError(format!("Invalid request body: {}", rejection.body_text()))
}

fn path_rejection(rejection: PathRejection) -> ServiceError {
    match rejection {
        // The route and the extractor disagree on parameter names.
        PathRejection::MissingPathParams(missing) => ServiceError::InternalError(missing.body_text()),
        other => {
            debug!(status = %other.status(), "Rejected path parameters");
            ServiceError::ValidationError(format!("Invalid path parameter: {}", other.body_text()))
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ServiceError {
    debug!(status = %rejection.status(), "Rejected query string");
    ServiceError::ValidationError(format!("Invalid query string: {}", rejection.body_text()))
}
