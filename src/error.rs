use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// The record kinds a lookup can miss on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Place,
    /// An owner that exists but has no places.
    Places,
    User,
    Route,
}

impl Resource {
    fn not_found_message(self) -> &'static str {
        match self {
            Resource::Place => "Could not find a place for the provided id.",
            Resource::Places => "Could not find places for the provided user id.",
            Resource::User => "Could not find a user for the provided id.",
            Resource::Route => "Could not find this route.",
        }
    }
}

/// Every failure an operation can end in. Each kind has one fixed HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", .0.not_found_message())]
    NotFound(Resource),

    #[error("{0}")]
    ExternalService(String),

    #[error("{0}")]
    Persistence(String),

    #[error("{0}")]
    ConsistencyViolation(String),

    #[error("Could not identify user, credentials seem to be wrong.")]
    InvalidCredentials,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_inputs() -> Self {
        Self::Validation("Invalid inputs passed, please check your data.".into())
    }

    /// Logs the store failure and hides its details behind `message`.
    pub fn persistence(message: &str, source: StoreError) -> Self {
        error!(error = %source, "{}", message);
        Self::Persistence(message.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ExternalService(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Persistence(_) | AppError::ConsistencyViolation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        }
        (
            status,
            Json(MessageBody {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn each_kind_maps_to_a_fixed_status() {
        assert_eq!(
            AppError::invalid_inputs().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::NotFound(Resource::User).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::ExternalService("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Persistence("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::ConsistencyViolation("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn not_found_names_the_resource() {
        assert!(AppError::NotFound(Resource::Place)
            .to_string()
            .contains("place for the provided id"));
        assert!(AppError::NotFound(Resource::Places)
            .to_string()
            .contains("places for the provided user id"));
        assert_eq!(
            AppError::NotFound(Resource::Route).to_string(),
            "Could not find this route."
        );
    }

    #[test]
    fn persistence_hides_store_details() {
        let err = AppError::persistence(
            "Deleting place failed, please try again.",
            StoreError::Conflict("row 42 vanished".into()),
        );
        assert_eq!(err.to_string(), "Deleting place failed, please try again.");
    }

    #[tokio::test]
    async fn response_body_carries_message() {
        let res = AppError::NotFound(Resource::Place).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json["message"],
            "Could not find a place for the provided id."
        );
    }
}
