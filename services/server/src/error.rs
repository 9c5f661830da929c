use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_protocol::HttpErrorEnvelope;
use std::fmt::Display;

pub type HttpResult<T> = Result<T, AppError>;

/// The error kinds named in spec §7, each with a fixed HTTP mapping.
#[derive(Debug)]
pub enum AppError {
    InvalidInput(String),
    Unauthenticated,
    NotFound(String),
    Gone(String),
    RateLimited,
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::InvalidInput(m) => m.clone(),
            AppError::Unauthenticated => "unauthorized".to_owned(),
            AppError::NotFound(m) => m.clone(),
            AppError::Gone(m) => m.clone(),
            AppError::RateLimited => "Too many requests".to_owned(),
            // Internal details never reach the response body (§7).
            AppError::Internal(_) => "internal error".to_owned(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            tracing::error!(error = %detail, "internal error");
        }
        (
            self.status(),
            Json(HttpErrorEnvelope {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub fn internal_error(err: impl Display) -> AppError {
    AppError::Internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_error_response(response: Response, status: StatusCode, error: &str) {
        assert_eq!(response.status(), status);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: HttpErrorEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.error, error);
    }

    #[tokio::test]
    async fn invalid_input_maps_to_400() {
        let resp = AppError::InvalidInput("bad day_id".to_owned()).into_response();
        assert_error_response(resp, StatusCode::BAD_REQUEST, "bad day_id").await;
    }

    #[tokio::test]
    async fn rate_limited_maps_to_429_with_fixed_message() {
        let resp = AppError::RateLimited.into_response();
        assert_error_response(resp, StatusCode::TOO_MANY_REQUESTS, "Too many requests").await;
    }

    #[tokio::test]
    async fn internal_hides_detail_from_response_body() {
        let resp = AppError::Internal("leaked connection string".to_owned()).into_response();
        assert_error_response(resp, StatusCode::INTERNAL_SERVER_ERROR, "internal error").await;
    }

    #[tokio::test]
    async fn gone_maps_to_410() {
        let resp = AppError::Gone("token already consumed".to_owned()).into_response();
        assert_error_response(resp, StatusCode::GONE, "token already consumed").await;
    }
}
