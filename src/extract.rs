use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Multipart, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;

fn rejected(kind: &str, detail: String) -> AppError {
    warn!(kind, detail = %detail, "request rejected");
    AppError::invalid_inputs()
}

/// `Path<Uuid>` whose rejection is an `AppError`.
pub struct PathId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|e| rejected("path", e.body_text()))?;
        Ok(Self(id))
    }
}

/// `Json<T>` whose rejection is an `AppError`.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| rejected("json", e.body_text()))?;
        Ok(Self(value))
    }
}

/// `Multipart` whose rejection is an `AppError`.
pub struct MultipartForm(pub Multipart);

#[async_trait]
impl<S> FromRequest<S> for MultipartForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mp = Multipart::from_request(req, state)
            .await
            .map_err(|e| rejected("multipart", e.body_text()))?;
        Ok(Self(mp))
    }
}
