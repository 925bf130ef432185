use crate::error::PlatformError;
use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

/// JSON envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }),
    ))
}

pub fn created<T: Serialize>(data: T) -> ApiResult<T> {
    let (_, body) = ok(data)?;
    Ok((StatusCode::CREATED, body))
}

pub struct ApiError(pub PlatformError);

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PlatformError::ValidationError(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(PlatformError::ValidationError(format!(
            "Invalid path: {}",
            rejection.body_text()
        )))
    }
}

/// `axum::Json` whose rejections are answered with the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// `axum::extract::Path` whose rejections are answered with the error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

pub fn status_for(e: &PlatformError) -> StatusCode {
    match e {
        PlatformError::ValidationError(_) => StatusCode::BAD_REQUEST,
        PlatformError::NotFound { .. } => StatusCode::NOT_FOUND,
        PlatformError::Conflict(_) | PlatformError::InsufficientSupply { .. } => {
            StatusCode::CONFLICT
        }
        PlatformError::InvalidState(_) | PlatformError::InsufficientBalance { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PlatformError::Unauthorized(_) | PlatformError::InsufficientApprovals { .. } => {
            StatusCode::FORBIDDEN
        }
        PlatformError::ReservationExpired(_) => StatusCode::GONE,
        PlatformError::WalletFrozen(_) => StatusCode::LOCKED,
        PlatformError::Gateway(_) | PlatformError::Ledger(_) | PlatformError::Http(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if self.0.is_recoverable() {
            self.0.to_string()
        } else {
            error!(error = %self.0, "request failed");
            match status {
                StatusCode::BAD_GATEWAY => "Upstream service unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        };
        let body: ApiResponse<()> = ApiResponse {
            success: false,
            data: None,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_recoverable_errors_map_to_client_statuses() {
        assert_eq!(
            status_for(&PlatformError::not_found("User", "x")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&PlatformError::InsufficientBalance {
                available: dec!(1),
                required: dec!(2)
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&PlatformError::ReservationExpired(Uuid::new_v4())),
            StatusCode::GONE
        );
        assert_eq!(
            status_for(&PlatformError::Gateway("declined".to_string())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let response =
            ApiError(PlatformError::InternalError("disk on fire".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
