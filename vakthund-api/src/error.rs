use axum::extract::rejection::ExtensionRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The connection's peer address was not available to the handler.
    #[error("{0}")]
    PeerAddress(#[from] ExtensionRejection),

    #[error("failed to render metrics: {0}")]
    Metrics(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
