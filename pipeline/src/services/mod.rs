pub mod invoker;
pub mod pipeline;
pub use invoker::{InvocationPolicy, Invoker};
pub use pipeline::PipelineService;

use crate::api::models::ApiResponse;
use axum::{Json, http::StatusCode, response::IntoResponse};

pub struct AppError(pub common::Error);

impl AppError {
    pub fn bad_request(message: String) -> Self {
        AppError(common::Error::InvalidInput(message))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status_code = match self.0 {
            common::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            common::Error::Forbidden => StatusCode::FORBIDDEN,
            common::Error::NotFound(_) => StatusCode::NOT_FOUND,
            common::Error::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            common::Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ApiResponse::<()>::error(self.0.to_string()));
        (status_code, body).into_response()
    }
}

impl From<common::Error> for AppError {
    fn from(err: common::Error) -> Self {
        AppError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (common::Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (common::Error::Forbidden, StatusCode::FORBIDDEN),
            (common::Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (common::Error::RateLimit, StatusCode::TOO_MANY_REQUESTS),
            (common::Error::Timeout(30), StatusCode::GATEWAY_TIMEOUT),
            (common::Error::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError(err).into_response().status(), expected);
        }
    }
}
